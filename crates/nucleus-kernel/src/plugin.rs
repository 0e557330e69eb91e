//! Plugins: the unit of contribution to a simulation.
//!
//! A [`Plugin`] bundles an id, the ids of the plugins it depends on, an
//! initializer, and any number of [`PluginData`] values. Plugins are
//! immutable once built and cheap to clone, so the experiment runner can
//! hand the same plugin set to many worker threads. Scenario variants are
//! derived by turning each data value back into a [`PluginDataBuilder`],
//! mutating the builder, and rebuilding a plugin with
//! [`Plugin::with_data`].

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use nucleus_core::{ActorId, ContractError, DataManagerId, ErrorKind, PluginId};

use crate::actor::Actor;
use crate::data_manager::DataManager;
use crate::kernel::Kernel;

// ── PluginData ─────────────────────────────────────────────────────

/// Immutable data carried by a plugin.
pub trait PluginData: Any + Send + Sync {
    /// A mutable copy of this value.
    fn to_builder(&self) -> Box<dyn PluginDataBuilder>;
}

/// Mutable copy of a [`PluginData`] value.
pub trait PluginDataBuilder: Any + Send {
    /// Freeze the current state into a new data value.
    fn build(&self) -> Arc<dyn PluginData>;
}

// ── Plugin ─────────────────────────────────────────────────────────

type PluginInit = Arc<dyn Fn(&mut PluginContext<'_>) -> Result<(), ContractError> + Send + Sync>;

/// A contribution to a simulation.
#[derive(Clone)]
pub struct Plugin {
    id: PluginId,
    dependencies: Vec<PluginId>,
    init: PluginInit,
    data: Vec<Arc<dyn PluginData>>,
}

impl Plugin {
    /// Start building a plugin.
    pub fn builder(id: impl Into<PluginId>) -> PluginBuilder {
        PluginBuilder {
            id: id.into(),
            dependencies: Vec::new(),
            init: None,
            data: Vec::new(),
        }
    }

    /// The plugin id.
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Ids of the plugins that must initialize first.
    pub fn dependencies(&self) -> &[PluginId] {
        &self.dependencies
    }

    /// Data values in contribution order.
    pub fn data(&self) -> &[Arc<dyn PluginData>] {
        &self.data
    }

    /// A copy of this plugin carrying `data` instead of its own values.
    pub fn with_data(&self, data: Vec<Arc<dyn PluginData>>) -> Plugin {
        Plugin {
            id: self.id.clone(),
            dependencies: self.dependencies.clone(),
            init: Arc::clone(&self.init),
            data,
        }
    }

    pub(crate) fn initialize(&self, ctx: &mut PluginContext<'_>) -> Result<(), ContractError> {
        (self.init)(ctx)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("data", &self.data.len())
            .finish()
    }
}

/// Builder for [`Plugin`].
pub struct PluginBuilder {
    id: PluginId,
    dependencies: Vec<PluginId>,
    init: Option<PluginInit>,
    data: Vec<Arc<dyn PluginData>>,
}

impl PluginBuilder {
    /// Require `dependency` to initialize before this plugin.
    #[must_use]
    pub fn add_dependency(mut self, dependency: impl Into<PluginId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Attach a data value.
    #[must_use]
    pub fn add_plugin_data(mut self, data: impl PluginData) -> Self {
        self.data.push(Arc::new(data));
        self
    }

    /// Set the initializer. Without one the plugin contributes nothing but
    /// its data and ordering constraints.
    #[must_use]
    pub fn set_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut PluginContext<'_>) -> Result<(), ContractError> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Finish the plugin.
    pub fn build(self) -> Plugin {
        Plugin {
            id: self.id,
            dependencies: self.dependencies,
            init: self.init.unwrap_or_else(|| Arc::new(no_op)),
            data: self.data,
        }
    }
}

fn no_op(_: &mut PluginContext<'_>) -> Result<(), ContractError> {
    Ok(())
}

// ── PluginContext ──────────────────────────────────────────────────

/// Registration context passed to a plugin initializer.
pub struct PluginContext<'k> {
    kernel: &'k mut Kernel,
    plugin: &'k Plugin,
}

impl<'k> PluginContext<'k> {
    pub(crate) fn new(kernel: &'k mut Kernel, plugin: &'k Plugin) -> Self {
        Self { kernel, plugin }
    }

    /// Id of the plugin being initialized.
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin.id
    }

    /// Register a data manager.
    ///
    /// At most one data manager per concrete type. Data managers are
    /// initialized in registration order once this plugin's initializer
    /// returns.
    pub fn add_data_manager<T: DataManager>(&mut self, dm: T) -> Result<DataManagerId, ContractError> {
        self.kernel.add_data_manager(dm)
    }

    /// Register an actor. Actors are initialized after every plugin has
    /// initialized.
    pub fn add_actor<T: Actor>(&mut self, actor: T) -> ActorId {
        self.kernel.add_actor(actor)
    }

    /// The data value of type `T` attached to this plugin.
    pub fn get_plugin_data<T: PluginData>(&self) -> Result<&T, ContractError> {
        self.plugin
            .data
            .iter()
            .find_map(|data| {
                let data: &dyn Any = &**data;
                data.downcast_ref::<T>()
            })
            .ok_or_else(|| {
                ErrorKind::UnknownPluginData {
                    type_name: type_name::<T>(),
                }
                .into()
            })
    }
}
