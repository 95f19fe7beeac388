//! Error type definitions shared by all storage adapters.

use thiserror::Error as ThisError;

/// Type alias for boxed dynamic errors that can cross thread boundaries.
///
/// Used as the source slot of [`Error`], wrapping whatever a native driver
/// returned while keeping `Send + Sync` bounds.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors a data access operation can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mandatory input was empty (id, target, hook function).
    Required,
    /// A driver call failed; wraps the underlying driver error.
    FailedTo,
    /// The backend signalled a missing record.
    NotFound,
    /// Construction-time validation failed.
    Validation,
    /// The native client could not be reached.
    Connection,
    /// The operation or probe exceeded its deadline.
    Timeout,
    /// Several concurrent child operations failed.
    Aggregate,
}

/// A structured error for data access operations.
///
/// Carries a kind, an optional human message, an optional stable code
/// (e.g. `ERR_REQUIRED_PRE_HOOK`), the wrapped driver error, and, for
/// aggregates, the child errors.
#[derive(Debug, ThisError)]
#[error("{}", render(kind, message, code, related))]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    code: Option<&'static str>,
    #[source]
    source: Option<BoxedError>,
    related: Vec<Error>,
}

fn render(
    kind: &ErrorKind,
    message: &Option<String>,
    code: &Option<&'static str>,
    related: &[Error],
) -> String {
    let body = match kind {
        ErrorKind::Required => match message {
            Some(m) => format!("{m} is required"),
            None => "required value is missing".to_owned(),
        },
        ErrorKind::FailedTo => match message {
            Some(m) => format!("failed to {m}"),
            None => "operation failed".to_owned(),
        },
        ErrorKind::NotFound => match message {
            Some(m) => format!("not found: {m}"),
            None => "not found".to_owned(),
        },
        ErrorKind::Validation => match message {
            Some(m) => format!("validation failed: {m}"),
            None => "validation failed".to_owned(),
        },
        ErrorKind::Connection => match message {
            Some(m) => format!("connection failed: {m}"),
            None => "connection failed".to_owned(),
        },
        ErrorKind::Timeout => match message {
            Some(m) => format!("timed out: {m}"),
            None => "timed out".to_owned(),
        },
        ErrorKind::Aggregate => format!("{} operation(s) failed", related.len()),
    };

    match code {
        Some(code) => format!("{code}: {body}"),
        None => body,
    }
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            code: None,
            source: None,
            related: Vec::new(),
        }
    }

    /// Creates a required-input error. `what` names the missing input.
    pub fn required(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Required).with_message(what)
    }

    /// Creates a failed-to error. `what` names the operation that failed.
    pub fn failed_to(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::FailedTo).with_message(what.to_string())
    }

    /// Creates a not-found error (HTTP 404 kind).
    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation).with_message(message)
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection).with_message(message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout).with_message(message)
    }

    /// Creates an aggregate error from the failures of concurrent children.
    pub fn aggregate(errors: Vec<Error>) -> Self {
        let mut err = Self::new(ErrorKind::Aggregate);
        err.related = errors;
        err
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a stable error code to this error.
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the stable error code, if any.
    pub fn code(&self) -> Option<&'static str> {
        self.code
    }

    /// Returns the message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the child errors of an aggregate.
    pub fn related(&self) -> &[Error] {
        &self.related
    }

    /// Returns true if the backend reported a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    /// Returns true if a mandatory input was missing.
    pub fn is_required(&self) -> bool {
        matches!(self.kind, ErrorKind::Required)
    }

    /// Returns true if this wraps several child failures.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, ErrorKind::Aggregate)
    }

    /// Maps the error kind to the closest HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::NotFound => 404,
            ErrorKind::Required | ErrorKind::Validation => 400,
            ErrorKind::Timeout => 408,
            ErrorKind::FailedTo
            | ErrorKind::Connection
            | ErrorKind::Aggregate => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_display() {
        let err = Error::required("id");
        assert_eq!(err.kind(), ErrorKind::Required);
        assert_eq!(err.to_string(), "id is required");
    }

    #[test]
    fn test_failed_to_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::failed_to("count").with_source(io);
        assert_eq!(err.to_string(), "failed to count");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_code_prefixes_display() {
        let err = Error::required("pre-hook function").with_code("ERR_REQUIRED_PRE_HOOK");
        assert_eq!(
            err.to_string(),
            "ERR_REQUIRED_PRE_HOOK: pre-hook function is required"
        );
        assert_eq!(err.code(), Some("ERR_REQUIRED_PRE_HOOK"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_found().status_code(), 404);
        assert_eq!(Error::required("id").status_code(), 400);
        assert_eq!(Error::validation("bad").status_code(), 400);
        assert_eq!(Error::timeout("ping").status_code(), 408);
        assert_eq!(Error::failed_to("list").status_code(), 500);
    }

    #[test]
    fn test_aggregate_keeps_children() {
        let err = Error::aggregate(vec![Error::not_found(), Error::required("id")]);
        assert!(err.is_aggregate());
        assert_eq!(err.related().len(), 2);
        assert_eq!(err.to_string(), "2 operation(s) failed");
    }

    #[test]
    fn test_classification() {
        assert!(Error::not_found().is_not_found());
        assert!(!Error::not_found().is_required());
        assert!(Error::required("target name").is_required());
    }
}
