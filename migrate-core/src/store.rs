//! The record store capability the migration engine talks to

use async_trait::async_trait;

use crate::api::{MigrationRecord, Result, Row, StoredRecord};

/// A table-oriented store that assigns identifiers on insert
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert one record.
    ///
    /// `Ok(None)` means the store accepted the request but returned no
    /// row, so the insert cannot be confirmed.
    async fn insert(&self, table: &str, record: &MigrationRecord) -> Result<Option<StoredRecord>>;

    /// Fetch rows `offset..offset + limit` of `table`, selecting the
    /// comma separated `fields`. A page shorter than `limit` is the last.
    async fn list(&self, table: &str, fields: &str, offset: usize, limit: usize) -> Result<Vec<Row>>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<S> {
    async fn insert(&self, table: &str, record: &MigrationRecord) -> Result<Option<StoredRecord>> {
        (**self).insert(table, record).await
    }

    async fn list(&self, table: &str, fields: &str, offset: usize, limit: usize) -> Result<Vec<Row>> {
        (**self).list(table, fields, offset, limit).await
    }
}
