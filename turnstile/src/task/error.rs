use crate::task::Id;
use parking_lot::Mutex;
use std::any::Any;

/// Why a task did not produce a value.
#[derive(thiserror::Error, Debug)]
pub enum JoinError {
    /// The task was aborted before its work item completed.
    #[error("task {0} was cancelled")]
    Cancelled(Id),

    /// The work item panicked and the scheduler isolated the failure.
    #[error("task {id} panicked: {message}")]
    Panic {
        id: Id,
        message: String,
        // Behind a mutex so the error is `Sync` and converts into
        // `anyhow::Error`.
        payload: Mutex<Box<dyn Any + Send + 'static>>,
    },
}

impl JoinError {
    pub(crate) fn cancelled(id: Id) -> Self {
        JoinError::Cancelled(id)
    }

    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = panic_payload_as_str(&*payload)
            .unwrap_or("unknown")
            .to_string();

        JoinError::Panic {
            id,
            message,
            payload: Mutex::new(payload),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JoinError::Cancelled(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, JoinError::Panic { .. })
    }

    /// Returns the id of the task that failed.
    pub fn id(&self) -> Id {
        match self {
            JoinError::Cancelled(id) => *id,
            JoinError::Panic { id, .. } => *id,
        }
    }

    /// Consumes the error, returning the object with which the task panicked.
    ///
    /// # Panics
    ///
    /// Panics if the error does not represent the underlying task terminating
    /// with a panic. Use `is_panic` to check the error reason or `try_into_panic`
    /// for a variant that does not panic.
    #[track_caller]
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        match self.try_into_panic() {
            Ok(payload) => payload,
            Err(err) => panic!("`JoinError` reason is not a panic: {err}"),
        }
    }

    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, JoinError> {
        match self {
            JoinError::Panic { payload, .. } => Ok(payload.into_inner()),
            err => Err(err),
        }
    }
}

/// Panic payloads are almost always a `&'static str` or a `String`.
pub(crate) fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(s);
    }

    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    None
}
