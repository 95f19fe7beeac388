//! Span and error-recording helpers.

use strata_core::{Error, Status};
use tracing::Span;

use super::Counter;

/// Tracing target for operation lifecycle events.
pub const TRACING_TARGET_OPERATIONS: &str = "strata_dal::operations";

/// A logger tagged with the storage kind and name.
///
/// Routes through `tracing`; the tags travel as structured fields on every
/// event so log lines correlate with the surrounding operation span.
#[derive(Debug, Clone)]
pub struct OperationLogger {
    kind: &'static str,
    name: String,
}

impl OperationLogger {
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Returns the storage name tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emits the one debug line of a successful operation, keyed by its
    /// terminal status.
    pub fn debug_status(&self, status: Status, target: &str) {
        tracing::debug!(
            target: TRACING_TARGET_OPERATIONS,
            kind = self.kind,
            storage = %self.name,
            status = %status,
            target = %target,
            "{status}"
        );
    }

    /// Emits an error event tagged with the storage identity.
    pub fn error(&self, err: &Error) {
        tracing::error!(
            target: TRACING_TARGET_OPERATIONS,
            kind = self.kind,
            storage = %self.name,
            error = %err,
            "Operation failed"
        );
    }
}

/// Starts the span bracketing one operation.
///
/// The span is entered via `Instrument` on the operation future and ends
/// when it is dropped, so a cancelled operation still closes its span.
pub fn operation_span(kind: &'static str, name: &str, status: Status) -> Span {
    tracing::info_span!(
        target: TRACING_TARGET_OPERATIONS,
        "storage_operation",
        kind,
        storage = %name,
        status = %status,
    )
}

/// Single choke point for failure recording: logs the error with the
/// storage tags, increments the failed counter (None-safe), and returns
/// the error untouched.
pub fn trace_error(err: Error, logger: &OperationLogger, counter: Option<&Counter>) -> Error {
    logger.error(&err);

    if let Some(counter) = counter {
        counter.inc();
    }

    err
}

#[cfg(test)]
mod tests {
    use strata_core::ErrorKind;

    use super::*;

    #[test]
    fn test_trace_error_increments_and_returns() {
        let logger = OperationLogger::new("storage", "memory");
        let counter = Counter::new("storage.memory.counted.failed.counter");

        let err = trace_error(Error::not_found(), &logger, Some(&counter));

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn test_trace_error_without_counter() {
        let logger = OperationLogger::new("storage", "memory");
        let err = trace_error(Error::required("id"), &logger, None);
        assert!(err.is_required());
    }
}
