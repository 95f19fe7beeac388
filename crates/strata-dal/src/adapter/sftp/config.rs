//! SFTP adapter configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// SFTP storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SftpConfig {
    /// Endpoint, e.g. `ssh://127.0.0.1:22`.
    #[validate(length(min = 1))]
    pub endpoint: String,
    /// User to authenticate as.
    #[validate(length(min = 1))]
    pub user: String,
    /// Path to the private key; agent authentication applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Known-hosts checking strategy (`strict`, `accept-new`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_strategy: Option<String>,
    /// Remote root directory mounted as the operator root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Static target path. When empty, the per-operation target argument
    /// is mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub target: Option<String>,
}

impl SftpConfig {
    /// Creates a configuration for the given endpoint and user.
    pub fn new(endpoint: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user: user.into(),
            ..Self::default()
        }
    }
}
