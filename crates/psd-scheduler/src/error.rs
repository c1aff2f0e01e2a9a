//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Two jobs were registered under the same name.
    #[error("job already exists: {0}")]
    JobExists(String),

    /// Invalid job configuration that slipped past the loader.
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    /// The job's command could not be started.
    #[error("failed to spawn job '{job}': {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// The job's process tree could not be signalled.
    #[error("failed to terminate job '{job}': {source}")]
    Terminate {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// A recurrence rule produced a date that does not exist.
    #[error("job '{job}': cannot compute next occurrence: {reason}")]
    Recurrence { job: String, reason: String },
}
