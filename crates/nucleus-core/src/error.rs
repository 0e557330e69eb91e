//! The contract-violation error type.
//!
//! Every precondition violation in the kernel (bad times, duplicate keys or
//! ids, unresolved or cyclic plugin dependencies, mismatched event labels,
//! repeated execution) surfaces as one [`ContractError`]: an [`ErrorKind`]
//! carrying the structured details of the violation, plus the simulation
//! context it happened in. Formatting is a presentation concern handled by
//! the `Display` impls.

use std::error::Error;
use std::fmt;

use crate::id::{ActorId, DataManagerId, LabelerId, PluginId};
use crate::key::Key;

/// One plugin inside a dependency cycle, with its in-group dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleMember {
    /// The plugin.
    pub plugin: PluginId,
    /// Direct dependencies of `plugin` that belong to the same
    /// strongly-connected group.
    pub depends_on: Vec<PluginId>,
}

/// What went wrong.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    /// A plan was scheduled before the current simulation time.
    PastPlanningTime {
        /// Requested plan time.
        plan_time: f64,
        /// Simulation time at the call.
        current_time: f64,
    },
    /// A plan time was NaN.
    InvalidPlanTime {
        /// The rejected value.
        plan_time: f64,
    },
    /// The calling owner already holds a plan under this key.
    DuplicatePlanKey {
        /// The contested key.
        key: Key,
    },
    /// No live actor has this id.
    UnknownActorId {
        /// The unknown id.
        actor: ActorId,
    },
    /// No data manager of this type is registered.
    UnknownDataManagerType {
        /// Rust type name of the requested data manager.
        type_name: &'static str,
    },
    /// A data manager of this type was already registered.
    DuplicateDataManager {
        /// Rust type name of the data manager.
        type_name: &'static str,
    },
    /// Two contributed plugins share an id.
    DuplicatePluginId {
        /// The duplicated id.
        plugin: PluginId,
    },
    /// A plugin depends on a plugin that was never contributed.
    MissingPlugin {
        /// The plugin declaring the dependency.
        requester: PluginId,
        /// The dependency that could not be resolved.
        missing: PluginId,
    },
    /// The plugin dependency graph contains cycles.
    ///
    /// One entry per strongly-connected group.
    CircularPluginDependencies {
        /// Each cyclic group with its members' in-group dependencies.
        groups: Vec<Vec<CycleMember>>,
    },
    /// The plugin being initialized carries no data of this type.
    UnknownPluginData {
        /// Rust type name of the requested plugin data.
        type_name: &'static str,
    },
    /// A label names a labeler that was never registered.
    UnknownEventLabeler {
        /// The unregistered labeler.
        labeler: LabelerId,
    },
    /// A labeler id was registered twice.
    DuplicateEventLabeler {
        /// The duplicated labeler.
        labeler: LabelerId,
    },
    /// A labeler produced a label that disagrees with the labeled event.
    LabelerMismatch {
        /// The offending labeler.
        labeler: LabelerId,
        /// Which label component disagreed.
        field: &'static str,
    },
    /// `execute()` was called on a simulation that already ran.
    RepeatedExecution,
    /// The configured start time is not finite.
    InvalidStartTime {
        /// The rejected value.
        value: f64,
    },
    /// The configured halt time is not finite or precedes the start time.
    InvalidHaltTime {
        /// The rejected value.
        value: f64,
    },
    /// A failure raised by plugin code.
    Custom {
        /// Human-readable description.
        reason: String,
    },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastPlanningTime {
                plan_time,
                current_time,
            } => write!(
                f,
                "plan time {plan_time} precedes current time {current_time}"
            ),
            Self::InvalidPlanTime { plan_time } => write!(f, "invalid plan time {plan_time}"),
            Self::DuplicatePlanKey { key } => write!(f, "duplicate plan key {key}"),
            Self::UnknownActorId { actor } => write!(f, "unknown actor id {}", actor.0),
            Self::UnknownDataManagerType { type_name } => {
                write!(f, "no data manager of type {type_name}")
            }
            Self::DuplicateDataManager { type_name } => {
                write!(f, "data manager {type_name} registered more than once")
            }
            Self::DuplicatePluginId { plugin } => write!(f, "duplicate plugin id '{plugin}'"),
            Self::MissingPlugin { requester, missing } => write!(
                f,
                "plugin '{requester}' depends on missing plugin '{missing}'"
            ),
            Self::CircularPluginDependencies { groups } => {
                write!(f, "circular plugin dependencies: ")?;
                for (i, group) in groups.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{{")?;
                    for (j, member) in group.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} -> [", member.plugin)?;
                        for (k, dep) in member.depends_on.iter().enumerate() {
                            if k > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{dep}")?;
                        }
                        write!(f, "]")?;
                    }
                    write!(f, "}}")?;
                }
                Ok(())
            }
            Self::UnknownPluginData { type_name } => {
                write!(f, "no plugin data of type {type_name}")
            }
            Self::UnknownEventLabeler { labeler } => {
                write!(f, "unknown event labeler '{labeler}'")
            }
            Self::DuplicateEventLabeler { labeler } => {
                write!(f, "event labeler '{labeler}' registered more than once")
            }
            Self::LabelerMismatch { labeler, field } => {
                write!(f, "labeler '{labeler}' produced a label with mismatched {field}")
            }
            Self::RepeatedExecution => write!(f, "simulation has already been executed"),
            Self::InvalidStartTime { value } => {
                write!(f, "start time must be finite, got {value}")
            }
            Self::InvalidHaltTime { value } => {
                write!(f, "halt time must be finite and not before the start time, got {value}")
            }
            Self::Custom { reason } => write!(f, "{reason}"),
        }
    }
}

/// A violated kernel contract.
///
/// Context fields are filled in by the kernel as the error leaves a unit of
/// work; the innermost context wins.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Simulation time when the violation occurred.
    pub time: Option<f64>,
    /// Focal actor, if an actor was executing.
    pub actor: Option<ActorId>,
    /// Focal data manager, if a data manager was executing.
    pub data_manager: Option<DataManagerId>,
    /// Plugin being initialized, if any.
    pub plugin: Option<PluginId>,
}

impl ContractError {
    /// Create an error with no context attached.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            time: None,
            actor: None,
            data_manager: None,
            plugin: None,
        }
    }

    /// Shorthand for an [`ErrorKind::Custom`] error.
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Custom {
            reason: reason.into(),
        })
    }

    /// Attach the simulation time unless one is already recorded.
    #[must_use]
    pub fn with_time(mut self, time: f64) -> Self {
        self.time.get_or_insert(time);
        self
    }

    /// Attach the focal actor unless one is already recorded.
    #[must_use]
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor.get_or_insert(actor);
        self
    }

    /// Attach the focal data manager unless one is already recorded.
    #[must_use]
    pub fn with_data_manager(mut self, data_manager: DataManagerId) -> Self {
        self.data_manager.get_or_insert(data_manager);
        self
    }

    /// Attach the plugin being initialized unless one is already recorded.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginId) -> Self {
        self.plugin.get_or_insert(plugin);
        self
    }
}

impl From<ErrorKind> for ContractError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(t) = self.time {
            write!(f, " (time {t})")?;
        }
        if let Some(a) = self.actor {
            write!(f, " ({a})")?;
        }
        if let Some(d) = self.data_manager {
            write!(f, " ({d})")?;
        }
        if let Some(p) = &self.plugin {
            write!(f, " (plugin '{p}')")?;
        }
        Ok(())
    }
}

impl Error for ContractError {}
