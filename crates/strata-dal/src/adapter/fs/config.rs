//! Filesystem adapter configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Filesystem storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FsConfig {
    /// Static target path. When empty, the per-operation target argument
    /// is mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub target: Option<String>,
}
