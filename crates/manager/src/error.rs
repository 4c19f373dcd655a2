//! Error types for the manager layer
//!
//! Journal and persister failures are fatal for the plan and propagate
//! inline. Contract violations (deleting a protected resource outside a
//! replacement, rebasing after mutations, handing a step without its
//! required states) are programmer errors and panic instead of returning
//! here. Collect-only child failures in a combined manager never surface
//! through this type at the call site; they accumulate on the manager.

use thiserror::Error;
use tidemark_journal::JournalError;

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Errors returned by snapshot managers.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The journal rejected an append, rebase, or close.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// Several fanned-out child managers failed in one operation.
    #[error("{} child manager error(s): {}", .0.len(), format_errors(.0))]
    Aggregate(Vec<ManagerError>),

    /// A routed step's project has no backend mapping.
    #[error("no backend mapped for project `{project}`")]
    UnroutableProject {
        /// The project component of the step's URN.
        project: String,
    },

    /// A project mapped to a backend stack with no registered manager.
    #[error("no child manager for backend stack `{stack}`")]
    UnknownBackend {
        /// The unmatched backend-stack identifier.
        stack: String,
    },
}

impl ManagerError {
    /// Collapse a list of errors: one error stays itself, several become an
    /// [`ManagerError::Aggregate`].
    ///
    /// # Panics
    ///
    /// Panics when called with an empty list.
    pub fn aggregate(mut errors: Vec<ManagerError>) -> ManagerError {
        match errors.len() {
            0 => panic!("aggregate requires at least one error"),
            1 => errors.remove(0),
            _ => ManagerError::Aggregate(errors),
        }
    }
}

fn format_errors(errors: &[ManagerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
