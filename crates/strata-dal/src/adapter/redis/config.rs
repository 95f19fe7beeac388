//! Redis adapter configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How Count enumerates matching keys.
///
/// `Keys` issues a single blocking `KEYS` command; on large keyspaces it
/// stalls the server. `Scan` walks the keyspace cursor-based and is the
/// default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStrategy {
    #[default]
    Scan,
    Keys,
}

/// Redis storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    #[validate(length(min = 1))]
    pub url: String,
    /// Key enumeration strategy for Count.
    #[serde(default)]
    pub count_strategy: CountStrategy,
}

impl RedisConfig {
    /// Creates a configuration for the given URL with defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            count_strategy: CountStrategy::default(),
        }
    }
}
