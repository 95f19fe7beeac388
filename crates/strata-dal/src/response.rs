//! Response envelopes shared by key-oriented adapter families.

use serde::{Deserialize, Serialize};

/// List response of adapters that enumerate keys rather than values
/// (key/value stores, filesystems, object stores).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListKeys {
    pub keys: Vec<String>,
}

/// List response of the in-memory adapter: the stored values under an
/// `items` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItems<T> {
    pub items: Vec<T>,
}
