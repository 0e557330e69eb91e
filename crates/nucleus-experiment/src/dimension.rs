//! Experiment dimensions.
//!
//! A [`Dimension`] is one axis of variation. Each level is a function that
//! edits mutable copies of the experiment's plugin data through a
//! [`DimensionContext`] and returns one metadata value per column the
//! dimension declares.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use nucleus_kernel::PluginDataBuilder;

type LevelFn = Arc<dyn Fn(&mut DimensionContext<'_>) -> Vec<String> + Send + Sync>;

/// One axis of scenario variation.
#[derive(Clone)]
pub struct Dimension {
    metadata: Vec<String>,
    levels: Vec<LevelFn>,
}

impl Dimension {
    /// Start building a dimension.
    pub fn builder() -> DimensionBuilder {
        DimensionBuilder {
            metadata: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Metadata column names contributed by this dimension.
    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Number of levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Run level `level` against `ctx`.
    pub(crate) fn apply(&self, level: usize, ctx: &mut DimensionContext<'_>) -> Vec<String> {
        match self.levels.get(level) {
            Some(f) => f(ctx),
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("metadata", &self.metadata)
            .field("levels", &self.levels.len())
            .finish()
    }
}

/// Builder for [`Dimension`].
pub struct DimensionBuilder {
    metadata: Vec<String>,
    levels: Vec<LevelFn>,
}

impl DimensionBuilder {
    /// Declare a metadata column.
    #[must_use]
    pub fn add_metadata(mut self, name: impl Into<String>) -> Self {
        self.metadata.push(name.into());
        self
    }

    /// Add a level. The function must return one value per declared
    /// column, in column order.
    #[must_use]
    pub fn add_level<F>(mut self, level: F) -> Self
    where
        F: Fn(&mut DimensionContext<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        self.levels.push(Arc::new(level));
        self
    }

    /// Finish the dimension. Empty dimensions are rejected when the
    /// experiment is built.
    pub fn build(self) -> Dimension {
        Dimension {
            metadata: self.metadata,
            levels: self.levels,
        }
    }
}

/// Mutable plugin-data copies for one scenario.
pub struct DimensionContext<'a> {
    builders: &'a mut [Box<dyn PluginDataBuilder>],
}

impl<'a> DimensionContext<'a> {
    pub(crate) fn new(builders: &'a mut [Box<dyn PluginDataBuilder>]) -> Self {
        Self { builders }
    }

    /// The first builder of concrete type `B`, across every plugin.
    pub fn get_plugin_data_builder<B: PluginDataBuilder>(&mut self) -> Option<&mut B> {
        self.builders.iter_mut().find_map(|builder| {
            let builder: &mut dyn Any = &mut **builder;
            builder.downcast_mut::<B>()
        })
    }
}
