//! Plugin dependency resolution.
//!
//! Plugins are layered by Kahn's algorithm: a plugin's depth is the length
//! of its longest dependency chain, and the initialization order is
//! ascending depth with ties broken by contribution order. When some
//! plugins can never be layered, the remaining subgraph is split into
//! strongly-connected components and every cyclic component is reported
//! with each member's in-group dependencies.

use indexmap::IndexMap;
use nucleus_core::{ContractError, CycleMember, ErrorKind, PluginId};
use tracing::debug;

use crate::plugin::Plugin;

/// Order `plugins` for initialization.
pub(crate) fn resolve(plugins: Vec<Plugin>) -> Result<Vec<Plugin>, ContractError> {
    let mut index: IndexMap<PluginId, usize> = IndexMap::new();
    for (i, plugin) in plugins.iter().enumerate() {
        if index.insert(plugin.id().clone(), i).is_some() {
            return Err(ErrorKind::DuplicatePluginId {
                plugin: plugin.id().clone(),
            }
            .into());
        }
    }

    // deps[i]: plugins that i depends on. dependents[j]: plugins depending on j.
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(plugins.len());
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    for (i, plugin) in plugins.iter().enumerate() {
        let mut edges = Vec::with_capacity(plugin.dependencies().len());
        for dep in plugin.dependencies() {
            let Some(&j) = index.get(dep) else {
                return Err(ErrorKind::MissingPlugin {
                    requester: plugin.id().clone(),
                    missing: dep.clone(),
                }
                .into());
            };
            edges.push(j);
            dependents[j].push(i);
        }
        deps.push(edges);
    }

    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut level: Vec<usize> = (0..plugins.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(plugins.len());
    while !level.is_empty() {
        level.sort_unstable();
        let mut next = Vec::new();
        for &i in &level {
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    next.push(d);
                }
            }
        }
        order.append(&mut level);
        level = next;
    }

    if order.len() != plugins.len() {
        let groups = cycles(&plugins, &deps, &in_degree);
        return Err(ErrorKind::CircularPluginDependencies { groups }.into());
    }

    debug!(
        order = ?order.iter().map(|&i| plugins[i].id().as_str()).collect::<Vec<_>>(),
        "resolved plugin order"
    );

    let mut slots: Vec<Option<Plugin>> = plugins.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Cyclic strongly-connected components among the plugins Kahn's
/// algorithm could not layer.
fn cycles(plugins: &[Plugin], deps: &[Vec<usize>], in_degree: &[usize]) -> Vec<Vec<CycleMember>> {
    let mut tarjan = Tarjan {
        deps,
        live: in_degree.iter().map(|&d| d > 0).collect(),
        index: vec![None; plugins.len()],
        low: vec![0; plugins.len()],
        on_stack: vec![false; plugins.len()],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in 0..plugins.len() {
        if tarjan.live[v] && tarjan.index[v].is_none() {
            tarjan.visit(v);
        }
    }

    let mut groups: Vec<Vec<usize>> = tarjan
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || deps[c[0]].contains(&c[0]))
        .map(|mut c| {
            c.sort_unstable();
            c
        })
        .collect();
    groups.sort_unstable_by_key(|c| c[0]);

    groups
        .into_iter()
        .map(|group| {
            group
                .iter()
                .map(|&v| CycleMember {
                    plugin: plugins[v].id().clone(),
                    depends_on: deps[v]
                        .iter()
                        .filter(|&&d| group.contains(&d))
                        .map(|&d| plugins[d].id().clone())
                        .collect(),
                })
                .collect()
        })
        .collect()
}

struct Tarjan<'a> {
    deps: &'a [Vec<usize>],
    live: Vec<bool>,
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let deps = self.deps;
        for &w in &deps[v] {
            if !self.live[w] {
                continue;
            }
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(iw) if self.on_stack[w] => {
                    self.low[v] = self.low[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
