//! The composable substrate every adapter embeds.

use strata_core::{Error, Result, Status};
use tracing::Span;

use crate::contract::STORAGE_KIND;
use crate::observability::{operation_span, trace_error, OperationCounters, OperationLogger};

/// Shared state of one storage: validated name, tagged logger, and the
/// fixed counter set. Constructed once per configured backend and shared
/// across all operations.
#[derive(Debug)]
pub struct StorageBase {
    name: String,
    logger: OperationLogger,
    counters: OperationCounters,
}

impl StorageBase {
    /// Builds and validates the base. The name must be lowercase and
    /// non-empty; violations are traced against the instantiation
    /// counter.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let logger = OperationLogger::new(STORAGE_KIND, name.clone());
        let counters = OperationCounters::new(&name);

        let base = Self {
            name,
            logger,
            counters,
        };

        if base.name.is_empty() || base.name != base.name.to_lowercase() {
            return Err(trace_error(
                Error::validation(format!(
                    "storage name {:?} must be lowercase and non-empty",
                    base.name
                )),
                &base.logger,
                Some(base.counters.instantiation_failed()),
            ));
        }

        base.logger.debug_status(Status::Initialized, "");

        Ok(base)
    }

    /// Returns the storage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tagged logger.
    pub fn logger(&self) -> &OperationLogger {
        &self.logger
    }

    /// Returns the counter set.
    pub fn counters(&self) -> &OperationCounters {
        &self.counters
    }

    /// Starts the span bracketing one operation.
    pub fn operation_span(&self, status: Status) -> Span {
        operation_span(STORAGE_KIND, &self.name, status)
    }

    /// Rejects an empty id, recording the failure against the operation's
    /// failed counter.
    pub fn require_id(&self, id: &str, status: Status) -> Result<()> {
        if id.is_empty() {
            return Err(trace_error(
                Error::required("id"),
                &self.logger,
                Some(self.counters.failed_for(status)),
            ));
        }

        Ok(())
    }

    /// Records a failure: logs it, increments the operation's failed
    /// counter, and hands the error back for the caller's return.
    pub fn failure(&self, status: Status, err: Error) -> Error {
        trace_error(err, &self.logger, Some(self.counters.failed_for(status)))
    }

    /// Records a ping failure during construction.
    pub fn ping_failure(&self, err: Error) -> Error {
        trace_error(err, &self.logger, Some(self.counters.ping_failed()))
    }

    /// Records an instantiation failure during construction.
    pub fn instantiation_failure(&self, err: Error) -> Error {
        trace_error(
            err,
            &self.logger,
            Some(self.counters.instantiation_failed()),
        )
    }

    /// Records a successful operation: one debug line keyed by the
    /// terminal status, then the success counter.
    pub fn completed(&self, status: Status, target: &str) {
        self.logger.debug_status(status, target);
        self.counters.success_for(status).inc();
    }
}

/// Resolves the effective target: the per-call name when non-empty, else
/// the static fallback, else a missing-target error. Total before any
/// native call.
pub fn resolve_target(name: &str, fallback: &str) -> Result<String> {
    if !name.is_empty() {
        return Ok(name.to_owned());
    }

    if !fallback.is_empty() {
        return Ok(fallback.to_owned());
    }

    Err(Error::required("target name"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_name() {
        assert!(StorageBase::new("memory").is_ok());
        assert!(StorageBase::new("").is_err());
        assert!(StorageBase::new("Memory").is_err());
    }

    #[test]
    fn test_require_id_increments_failed_counter() {
        let base = StorageBase::new("memory").unwrap();

        let err = base.require_id("", Status::Updated).unwrap_err();

        assert!(err.is_required());
        assert_eq!(base.counters().updated_failed().value(), 1);
        assert_eq!(base.counters().updated().value(), 0);

        base.require_id("u-1", Status::Updated).unwrap();
        assert_eq!(base.counters().updated_failed().value(), 1);
    }

    #[test]
    fn test_completed_increments_success_counter() {
        let base = StorageBase::new("memory").unwrap();

        base.completed(Status::Counted, "api");

        assert_eq!(base.counters().counted().value(), 1);
        assert_eq!(base.counters().counted_failed().value(), 0);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("api", "").unwrap(), "api");
        assert_eq!(resolve_target("", "fallback").unwrap(), "fallback");
        assert_eq!(resolve_target("api", "fallback").unwrap(), "api");

        let err = resolve_target("", "").unwrap_err();
        assert!(err.is_required());
        assert_eq!(err.to_string(), "target name is required");
    }
}
