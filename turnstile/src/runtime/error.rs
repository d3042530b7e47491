use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// A work item tried to start a scheduler while one was already running
    /// on this thread.
    #[error("a turnstile scheduler is already running on this thread")]
    AlreadyRunning,

    /// The run stopped after `limit` rounds with `active` tasks left. The
    /// tasks are kept and a later run resumes them.
    #[error("round limit of {limit} reached with {active} tasks still active")]
    RoundLimitExceeded { limit: u64, active: usize },
}
