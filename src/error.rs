//! Error taxonomy for the aggregation engine
//!
//! The two schedulers react differently to the same error kinds: fork/join
//! fails the whole run, batch dispatch turns per-task failures into dropped
//! subtrees. See [`crate::parallel`] for the propagation rules.

use std::time::Duration;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced while scheduling or evaluating work items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The root item or a run parameter is unusable, detected before scheduling
    InvalidInput(String),
    /// `split` or `evaluate` failed for a work item
    Evaluation {
        /// Debug rendering of the failing item
        item: String,
        /// Underlying failure message
        message: String,
    },
    /// A batch dispatch task did not report within its deadline
    Timeout(Duration),
    /// User code panicked inside a task
    Panicked(String),
    /// The worker pool refused a submission
    Rejected(String),
    /// A sibling subtree failed first and this one was skipped
    Aborted,
}

impl EngineError {
    /// Build an [`EngineError::Evaluation`] for an item
    pub fn evaluation(item: impl std::fmt::Debug, message: impl std::fmt::Display) -> Self {
        EngineError::Evaluation {
            item: format!("{item:?}"),
            message: message.to_string(),
        }
    }

    /// Whether the error degrades a batch dispatch run instead of ending it
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            EngineError::Evaluation { .. } | EngineError::Timeout(_) | EngineError::Panicked(_)
        )
    }

    /// Render a panic payload caught by `catch_unwind`
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        EngineError::Panicked(message)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EngineError::Evaluation { item, message } => {
                write!(f, "Evaluation failed for {}: {}", item, message)
            }
            EngineError::Timeout(limit) => {
                write!(f, "Task did not finish within {} ms", limit.as_millis())
            }
            EngineError::Panicked(msg) => write!(f, "Task panicked: {}", msg),
            EngineError::Rejected(msg) => write!(f, "Worker pool rejected task: {}", msg),
            EngineError::Aborted => write!(f, "Task skipped after an earlier failure"),
        }
    }
}

impl std::error::Error for EngineError {}
