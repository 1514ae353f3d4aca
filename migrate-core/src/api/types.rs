use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One listing row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Payload inserted for every migrated file.
///
/// There is no `id` field: the table assigns one on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub title: String,
    pub content: String,
    pub title_prefix: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    /// Milliseconds since the Unix epoch
    pub updated_at: i64,
    pub device_id: String,
}

impl MigrationRecord {
    /// Number of title characters kept in `title_prefix`
    pub const TITLE_PREFIX_LEN: usize = 5;

    pub fn title_prefix_of(title: &str) -> String {
        title
            .chars()
            .take(Self::TITLE_PREFIX_LEN)
            .collect::<String>()
            .to_uppercase()
    }
}

/// Record as returned by the store after an insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: serde_json::Value,
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

/// Query parameters for list requests
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListParams {
    pub select: Option<String>,
    pub order: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.select = Some(fields.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Error body returned by the REST layer
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
}
