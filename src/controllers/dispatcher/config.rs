use std::str::FromStr;
use std::time::Duration;

pub const ENV_NAME: &str = "OWNER_DISPATCH_NAME";
pub const ENV_MAX_PENDING: &str = "OWNER_DISPATCH_MAX_PENDING";
pub const ENV_SLOW_CALL_MS: &str = "OWNER_DISPATCH_SLOW_CALL_MS";
pub const ENV_ASYNC_FAILURES: &str = "OWNER_DISPATCH_ASYNC_FAILURES";

const DEFAULT_SLOW_CALL_WARNING: Duration = Duration::from_millis(250);
const DEFAULT_ASYNC_FAILURE_CAPACITY: usize = 32;

/// Tunables for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Label attached to every log event of this dispatcher.
    pub name: String,
    /// Upper bound on queued calls. `None` leaves the queue unbounded.
    pub max_pending: Option<usize>,
    /// Owner-thread calls running longer than this are logged as slow.
    pub slow_call_warning: Option<Duration>,
    /// How many failed asynchronous calls are kept for inspection.
    pub async_failure_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "owner".to_string(),
            max_pending: None,
            slow_call_warning: Some(DEFAULT_SLOW_CALL_WARNING),
            async_failure_capacity: DEFAULT_ASYNC_FAILURE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_pending(mut self, max_pending: Option<usize>) -> Self {
        self.max_pending = max_pending;
        self
    }

    #[must_use]
    pub fn with_slow_call_warning(mut self, threshold: Option<Duration>) -> Self {
        self.slow_call_warning = threshold;
        self
    }

    #[must_use]
    pub fn with_async_failure_capacity(mut self, capacity: usize) -> Self {
        self.async_failure_capacity = capacity;
        self
    }

    /// Reads overrides from the `OWNER_DISPATCH_*` environment variables.
    ///
    /// Unset or unparsable variables keep their default. A slow-call
    /// threshold of `0` disables the warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let slow_call_warning = match lookup_parsed::<u64>(&lookup, ENV_SLOW_CALL_MS) {
            Some(0) => None,
            Some(millis) => Some(Duration::from_millis(millis)),
            None => defaults.slow_call_warning,
        };

        Self {
            name: lookup(ENV_NAME)
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.name),
            max_pending: lookup_parsed(&lookup, ENV_MAX_PENDING).or(defaults.max_pending),
            slow_call_warning,
            async_failure_capacity: lookup_parsed(&lookup, ENV_ASYNC_FAILURES)
                .unwrap_or(defaults.async_failure_capacity),
        }
    }
}

fn lookup_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
