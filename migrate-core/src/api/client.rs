use super::{error::*, records::RecordOperations, types::*};
use crate::store::RemoteStore;
use async_trait::async_trait;
use reqwest::ClientBuilder;
use std::time::Duration;
use tracing::debug;

/// Client for a PostgREST-style record store (e.g. a Supabase project)
pub struct RestStoreClient {
    /// Insert and list operations against `/rest/v1`
    pub records: RecordOperations,

    /// Base URL of the project
    base_url: String,
}

impl RestStoreClient {
    /// Create a new client with default HTTP settings
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        RestStoreClientBuilder::new(base_url, api_key)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
    }

    /// Create a new client with custom HTTP client configuration
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)?;

        let records = RecordOperations::new(http_client, base_url.clone(), api_key.into());

        Ok(Self { records, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RemoteStore for RestStoreClient {
    async fn insert(&self, table: &str, record: &MigrationRecord) -> Result<Option<StoredRecord>> {
        debug!("Inserting '{}' into {}", record.title, table);
        self.records.insert(table, record).await
    }

    async fn list(&self, table: &str, fields: &str, offset: usize, limit: usize) -> Result<Vec<Row>> {
        debug!("Listing {} rows {}..{}", table, offset, offset + limit);
        let params = ListParams::new()
            .select(fields)
            .order("id.asc")
            .offset(offset)
            .limit(limit);
        self.records.list(table, &params).await
    }
}

// Builder pattern for client configuration
pub struct RestStoreClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl RestStoreClientBuilder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: None,
            connect_timeout: None,
            user_agent: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<RestStoreClient> {
        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(connect_timeout) = self.connect_timeout {
            client_builder = client_builder.connect_timeout(connect_timeout);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| concat!("blog-migrate/", env!("CARGO_PKG_VERSION")).to_string());
        client_builder = client_builder.user_agent(user_agent);

        let http_client = client_builder.build().map_err(StoreError::Network)?;

        RestStoreClient::with_client(self.base_url, self.api_key, http_client)
    }
}
