//! Elasticsearch adapter configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Elasticsearch storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. `http://127.0.0.1:9200`.
    #[validate(length(min = 1))]
    pub url: String,
    /// Basic-auth user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Static target index. When empty, the per-operation target
    /// argument (or the dynamic index function) is mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub index: Option<String>,
    /// Response failure reasons containing any of these substrings are
    /// treated as no-ops instead of errors (e.g. "already exists" on
    /// index creation).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_substrings: Vec<String>,
}

impl ElasticsearchConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
