//! MongoDB adapter configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// MongoDB storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MongodbConfig {
    /// Connection string, e.g. `mongodb://127.0.0.1:27017`.
    #[validate(length(min = 1))]
    pub uri: String,
    /// Logical database. Overridable per call with `with_database`.
    #[validate(length(min = 1))]
    pub database: String,
    /// Static target collection. When empty, the per-operation target
    /// argument is mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub target: Option<String>,
}

impl MongodbConfig {
    /// Creates a configuration for the given connection string and
    /// database.
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[test]
    fn test_validation() {
        assert!(MongodbConfig::new("mongodb://127.0.0.1:27017", "api")
            .validate()
            .is_ok());
        assert!(MongodbConfig::new("", "api").validate().is_err());
        assert!(MongodbConfig::new("mongodb://127.0.0.1:27017", "")
            .validate()
            .is_err());
    }
}
