//! Observability surface: monotonic counters, tagged operation logger,
//! and span helpers.

mod counter;
mod trace;

pub use counter::{Counter, OperationCounters, METRICS_PREFIX_ENV};
pub use trace::{operation_span, trace_error, OperationLogger, TRACING_TARGET_OPERATIONS};
