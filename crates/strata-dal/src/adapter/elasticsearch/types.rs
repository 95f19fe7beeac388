//! Elasticsearch wire types.

use serde::Deserialize;
use serde_json::Value;

/// Search response envelope.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
}

/// The hits section of a search response.
#[derive(Debug, Deserialize)]
pub struct Hits {
    pub total: Total,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// The true total, available when the query tracks it.
#[derive(Debug, Deserialize)]
pub struct Total {
    pub value: i64,
}

/// One search hit.
#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source")]
    pub source: Value,
}

/// Document GET response.
#[derive(Debug, Deserialize)]
pub struct GetResponse {
    pub found: bool,
    #[serde(rename = "_source")]
    pub source: Option<Value>,
}

/// Failure response envelope.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// The error section of a failure response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub reason: Option<String>,
}
