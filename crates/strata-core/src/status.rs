//! Operation and status vocabulary.
//!
//! Status strings are terminal states used for log lines and metric
//! identifiers. `Retrieved` keeps its historical `retreived` spelling so
//! counter identifiers stay stable for existing dashboards.

use strum::{AsRefStr, Display};

/// The name of a data access operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Count,
    Create,
    Delete,
    List,
    Retrieve,
    Update,
}

/// Terminal status of an operation or lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Counted,
    Created,
    Deleted,
    Listed,
    #[strum(serialize = "retreived")]
    Retrieved,
    Updated,
    Initialized,
    Failed,
}

impl Status {
    /// Returns the operation this terminal status belongs to, where one
    /// exists.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Counted => Some(Operation::Count),
            Self::Created => Some(Operation::Create),
            Self::Deleted => Some(Operation::Delete),
            Self::Listed => Some(Operation::List),
            Self::Retrieved => Some(Operation::Retrieve),
            Self::Updated => Some(Operation::Update),
            Self::Initialized | Self::Failed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_strings() {
        assert_eq!(Operation::Count.to_string(), "count");
        assert_eq!(Operation::Retrieve.to_string(), "retrieve");
        assert_eq!(Operation::Update.as_ref(), "update");
    }

    #[test]
    fn test_status_strings_keep_historical_spelling() {
        assert_eq!(Status::Counted.to_string(), "counted");
        assert_eq!(Status::Retrieved.to_string(), "retreived");
        assert_eq!(Status::Failed.as_ref(), "failed");
    }

    #[test]
    fn test_status_maps_back_to_operation() {
        assert_eq!(Status::Listed.operation(), Some(Operation::List));
        assert_eq!(Status::Initialized.operation(), None);
    }
}
