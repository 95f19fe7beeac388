//! Monotonic operation counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_core::Status;

use crate::contract::STORAGE_KIND;

/// Environment variable holding an optional prefix for every counter
/// identifier.
pub const METRICS_PREFIX_ENV: &str = "DAL_METRICS_PREFIX";

/// Trailing label of every counter identifier.
const COUNTER_LABEL: &str = "counter";

/// A named, strictly monotonic counter.
#[derive(Debug)]
pub struct Counter {
    name: String,
    value: AtomicU64,
}

impl Counter {
    /// Creates a counter, prefixing its identifier with the value of
    /// [`METRICS_PREFIX_ENV`] when set.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_env_prefix(METRICS_PREFIX_ENV, name)
    }

    /// Creates a counter whose identifier is prefixed by the value of the
    /// given environment variable when set.
    pub fn with_env_prefix(env_var: &str, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();

        let name = match std::env::var(env_var) {
            Ok(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
            _ => name,
        };

        Arc::new(Self {
            name,
            value: AtomicU64::new(0),
        })
    }

    /// Increments the counter, returning the new value.
    pub fn inc(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the current value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Returns the counter identifier.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The fixed counter set of one storage: success and failed counters per
/// operation, plus ping and instantiation failures.
#[derive(Debug)]
pub struct OperationCounters {
    counted: Arc<Counter>,
    counted_failed: Arc<Counter>,
    created: Arc<Counter>,
    created_failed: Arc<Counter>,
    deleted: Arc<Counter>,
    deleted_failed: Arc<Counter>,
    listed: Arc<Counter>,
    listed_failed: Arc<Counter>,
    retrieved: Arc<Counter>,
    retrieved_failed: Arc<Counter>,
    updated: Arc<Counter>,
    updated_failed: Arc<Counter>,
    ping_failed: Arc<Counter>,
    instantiation_failed: Arc<Counter>,
}

fn success_name(storage: &str, status: Status) -> String {
    format!("{STORAGE_KIND}.{storage}.{status}.{COUNTER_LABEL}")
}

fn failed_name(storage: &str, status: &str) -> String {
    format!("{STORAGE_KIND}.{storage}.{status}.{}.{COUNTER_LABEL}", Status::Failed)
}

impl OperationCounters {
    /// Builds the full counter set for the named storage.
    pub fn new(storage: &str) -> Self {
        Self {
            counted: Counter::new(success_name(storage, Status::Counted)),
            counted_failed: Counter::new(failed_name(storage, Status::Counted.as_ref())),
            created: Counter::new(success_name(storage, Status::Created)),
            created_failed: Counter::new(failed_name(storage, Status::Created.as_ref())),
            deleted: Counter::new(success_name(storage, Status::Deleted)),
            deleted_failed: Counter::new(failed_name(storage, Status::Deleted.as_ref())),
            listed: Counter::new(success_name(storage, Status::Listed)),
            listed_failed: Counter::new(failed_name(storage, Status::Listed.as_ref())),
            retrieved: Counter::new(success_name(storage, Status::Retrieved)),
            retrieved_failed: Counter::new(failed_name(storage, Status::Retrieved.as_ref())),
            updated: Counter::new(success_name(storage, Status::Updated)),
            updated_failed: Counter::new(failed_name(storage, Status::Updated.as_ref())),
            ping_failed: Counter::new(failed_name(storage, "ping")),
            instantiation_failed: Counter::new(failed_name(storage, "instantiation")),
        }
    }

    pub fn counted(&self) -> &Counter {
        &self.counted
    }

    pub fn counted_failed(&self) -> &Counter {
        &self.counted_failed
    }

    pub fn created(&self) -> &Counter {
        &self.created
    }

    pub fn created_failed(&self) -> &Counter {
        &self.created_failed
    }

    pub fn deleted(&self) -> &Counter {
        &self.deleted
    }

    pub fn deleted_failed(&self) -> &Counter {
        &self.deleted_failed
    }

    pub fn listed(&self) -> &Counter {
        &self.listed
    }

    pub fn listed_failed(&self) -> &Counter {
        &self.listed_failed
    }

    pub fn retrieved(&self) -> &Counter {
        &self.retrieved
    }

    pub fn retrieved_failed(&self) -> &Counter {
        &self.retrieved_failed
    }

    pub fn updated(&self) -> &Counter {
        &self.updated
    }

    pub fn updated_failed(&self) -> &Counter {
        &self.updated_failed
    }

    pub fn ping_failed(&self) -> &Counter {
        &self.ping_failed
    }

    pub fn instantiation_failed(&self) -> &Counter {
        &self.instantiation_failed
    }

    /// Returns the success counter matching a terminal status.
    pub(crate) fn success_for(&self, status: Status) -> &Counter {
        match status {
            Status::Counted => &self.counted,
            Status::Created => &self.created,
            Status::Deleted => &self.deleted,
            Status::Listed => &self.listed,
            Status::Retrieved => &self.retrieved,
            Status::Updated => &self.updated,
            Status::Initialized | Status::Failed => &self.instantiation_failed,
        }
    }

    /// Returns the failed counter matching a terminal status.
    pub(crate) fn failed_for(&self, status: Status) -> &Counter {
        match status {
            Status::Counted => &self.counted_failed,
            Status::Created => &self.created_failed,
            Status::Deleted => &self.deleted_failed,
            Status::Listed => &self.listed_failed,
            Status::Retrieved => &self.retrieved_failed,
            Status::Updated => &self.updated_failed,
            Status::Initialized | Status::Failed => &self.instantiation_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic() {
        let counter = Counter::new("storage.test.counted.counter");
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.inc(), 2);
        assert_eq!(counter.value(), 2);
    }

    #[test]
    fn test_counter_identifiers() {
        let counters = OperationCounters::new("memory");
        assert_eq!(counters.counted().name(), "storage.memory.counted.counter");
        assert_eq!(
            counters.counted_failed().name(),
            "storage.memory.counted.failed.counter"
        );
        assert_eq!(
            counters.retrieved().name(),
            "storage.memory.retreived.counter"
        );
        assert_eq!(
            counters.ping_failed().name(),
            "storage.memory.ping.failed.counter"
        );
        assert_eq!(
            counters.instantiation_failed().name(),
            "storage.memory.instantiation.failed.counter"
        );
    }

    #[test]
    fn test_status_counter_mapping() {
        let counters = OperationCounters::new("memory");
        assert_eq!(
            counters.success_for(Status::Updated).name(),
            counters.updated().name()
        );
        assert_eq!(
            counters.failed_for(Status::Listed).name(),
            counters.listed_failed().name()
        );
    }
}
