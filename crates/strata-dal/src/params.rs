//! Parameter types for the six storage operations.
//!
//! Each operation takes its own parameter type with defaults via
//! `Default`/`new()`. Backend-specific payloads travel through the open
//! [`AnyParam`] slot; adapters pattern-match on the variants they
//! recognise and ignore the rest.

use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Returns the lowercase string form (`asc`/`desc`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One key of a stable multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl SortField {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Backend-specific parameter payload.
///
/// A single open slot instead of a bag of optional fields. Unknown
/// variants are ignored by adapters that do not recognise them.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyParam {
    /// Search backends: track the true total hit count.
    TrackTotalHits(bool),
    /// Document backends: structured list filter.
    Filter(serde_json::Map<String, Value>),
    /// Filesystem backends: create parent directories for missing paths.
    CreateIfMissing(bool),
    /// Object-store backends: raw body bytes instead of the marshalled
    /// value.
    RawBytes(Bytes),
    /// Escape hatch for anything else.
    Custom(Value),
}

/// Parameters for Count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Count {
    /// Backend-native filter expression (SQL statement, JSON filter, key
    /// or glob pattern).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Projection selector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Stable multi-key sort.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    /// Pagination offset; zero means unset.
    #[serde(default)]
    pub offset: u64,
    /// Pagination limit; zero means unset.
    #[serde(default)]
    pub limit: u64,
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl Count {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters for Create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Create {
    /// Time-to-live; only meaningful for cache/kv backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl Create {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters for Retrieve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retrieve {
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl Retrieve {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters for Update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Update {
    /// Time-to-live; only meaningful for cache/kv backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters for Delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delete {
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl Delete {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters for List.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct List {
    /// Backend-native filter expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Projection selector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Stable multi-key sort.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    /// Pagination offset; zero means unset.
    #[serde(default)]
    pub offset: u64,
    /// Pagination limit; zero means unset.
    #[serde(default)]
    pub limit: u64,
    /// Routing key, for search backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Total-count back-channel, populated by search backends that report
    /// the true total alongside a page of hits.
    #[serde(skip)]
    pub count: Option<Arc<AtomicI64>>,
    /// Open backend-specific slot.
    #[serde(skip)]
    pub any: Option<AnyParam>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }
}
