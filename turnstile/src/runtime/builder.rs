use crate::runtime::Scheduler;
use anyhow::{Result, anyhow};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What happens when a work item panics.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The panic aborts the whole run and resumes on the caller of
    /// `run_to_completion`.
    #[default]
    Propagate,

    /// Only the offending task is aborted. It is removed at the end of the
    /// round, its `JoinHandle` yields a panic `JoinError` and every other
    /// task keeps running.
    Isolate,
}

fn default_name() -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("turnstile-{}", id)
}

/// Configures and creates a [`Scheduler`].
///
/// ```ignore
/// let mut scheduler = Builder::new()
///     .name("worker")
///     .failure_policy(FailurePolicy::Isolate)
///     .max_rounds(1_000)
///     .try_build()?;
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    /// Used in log events. Defaults to "turnstile-{N}".
    name: Option<String>,

    failure_policy: FailurePolicy,

    /// Upper bound on the rounds of one `run_to_completion` call. Unbounded by
    /// default: a work item that never completes keeps the run going forever.
    max_rounds: Option<u64>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, val: impl Into<String>) -> Self {
        self.name = Some(val.into());
        self
    }

    pub fn failure_policy(mut self, val: FailurePolicy) -> Self {
        self.failure_policy = val;
        self
    }

    /// # Panics
    ///
    /// This function will panic if 0 is passed as an argument.
    #[track_caller]
    pub fn max_rounds(mut self, val: u64) -> Self {
        assert!(val > 0, "max_rounds must be greater than 0");
        self.max_rounds = Some(val);
        self
    }

    /// Creates the configured `Scheduler`.
    pub fn try_build(self) -> Result<Scheduler> {
        let cfg = RuntimeConfig::try_from(self)?;
        Ok(Scheduler::with_config(cfg))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) name: String,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) max_rounds: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            name: default_name(),
            failure_policy: FailurePolicy::default(),
            max_rounds: None,
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("scheduler name cannot be empty"));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            name: builder.name.unwrap_or_else(default_name),
            failure_policy: builder.failure_policy,
            max_rounds: builder.max_rounds,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
