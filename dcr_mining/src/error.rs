//! Errors of the DCR core (execution, mining, reduction and comparison)
use thiserror::Error;

/// Errors that can occur while working with [`DcrGraph`](crate::DcrGraph)s and event logs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DcrError {
    /// Execution was attempted on an activity that is not enabled in the current marking
    #[error("Activity '{activity}' is not enabled")]
    NotEnabled {
        /// Identifier of the activity
        activity: String,
    },
    /// A log or graph references an identifier outside of the declared activities
    #[error("Unknown activity '{activity}'")]
    UnknownActivity {
        /// Identifier of the activity
        activity: String,
    },
    /// An activity identifier is used twice within the same graph (including nested graphs)
    #[error("Activity '{activity}' already exists in the graph")]
    DuplicateActivity {
        /// Identifier of the activity
        activity: String,
    },
    /// Input data violates the expected structure
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    /// A reduced graph does not accept the same behavior as the original graph
    #[error("Soundness violation after trace {trace:?}: {details}")]
    SoundnessViolation {
        /// Shortest executed trace after which both graphs diverge
        trace: Vec<String>,
        /// Description of the divergence
        details: String,
    },
    /// The redundancy fixpoint did not terminate within the configured number of rule applications
    #[error("Redundancy removal did not reach a fixpoint within {limit} iterations")]
    IterationLimitExceeded {
        /// Configured iteration limit
        limit: usize,
    },
}

impl DcrError {
    pub(crate) fn unknown<S: Into<String>>(activity: S) -> Self {
        Self::UnknownActivity {
            activity: activity.into(),
        }
    }
}
