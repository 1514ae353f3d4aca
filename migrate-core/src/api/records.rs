use super::{error::*, types::*};
use backoff::{future::retry, ExponentialBackoff};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker the REST gateway puts in bodies rejected for a bad key
const INVALID_API_KEY: &str = "Invalid API key";

pub struct RecordOperations {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RecordOperations {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// List rows from a table
    pub async fn list(&self, table: &str, params: &ListParams) -> Result<Vec<Row>> {
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| StoreError::Unknown(format!("Failed to encode query: {}", e)))?;

        let operation = || async {
            let url = format!("{}?{}", self.table_url(table), query);
            let request = self.authorized(self.client.get(&url));

            let response = request.send().await?;
            self.handle_response(table, response).await
        };

        self.retry_operation(operation, StoreError::is_retryable).await
    }

    /// Insert one row and return what the table stored
    pub async fn insert(&self, table: &str, record: &MigrationRecord) -> Result<Option<StoredRecord>> {
        let operation = || async {
            let request = self
                .authorized(self.client.post(self.table_url(table)))
                .header("Prefer", "return=representation")
                .json(record);

            let response = request.send().await?;
            let rows: Vec<StoredRecord> = self.handle_response(table, response).await?;
            Ok(rows.into_iter().next())
        };

        self.retry_operation(operation, StoreError::is_safe_to_resend).await
    }

    // Helper methods

    async fn handle_response<T: DeserializeOwned>(&self, table: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(serde_json::from_str("[]")?);
            }
            Ok(serde_json::from_str(&text)?)
        } else {
            let error = self.parse_error_response(table, response).await;
            Err(error)
        }
    }

    async fn parse_error_response(&self, table: &str, response: reqwest::Response) -> StoreError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let error_text = response.text().await.unwrap_or_default();

        classify_error(status, retry_after, table, &error_text)
    }

    async fn retry_operation<F, Fut, T>(&self, operation: F, should_retry: fn(&StoreError) -> bool) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        retry(backoff, || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(error) => {
                    if should_retry(&error) {
                        warn!("Retryable error occurred: {}", error);
                        match error.retry_after() {
                            Some(secs) => Err(backoff::Error::retry_after(error, Duration::from_secs(secs))),
                            None => Err(backoff::Error::transient(error)),
                        }
                    } else {
                        debug!("Non-retryable error: {}", error);
                        Err(backoff::Error::permanent(error))
                    }
                }
            }
        })
        .await
    }
}

/// Map a failed response onto the store error taxonomy
pub(crate) fn classify_error(
    status: StatusCode,
    retry_after: Option<u64>,
    table: &str,
    error_text: &str,
) -> StoreError {
    let parsed = serde_json::from_str::<ErrorResponse>(error_text).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| error_text.to_string());

    if error_text.contains(INVALID_API_KEY) {
        return StoreError::Authentication(message);
    }

    match status {
        StatusCode::UNAUTHORIZED => StoreError::Authentication(message),
        StatusCode::FORBIDDEN => StoreError::Authorization(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(table.to_string()),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimit { retry_after },
        status if status.is_client_error() => {
            if parsed.is_some() {
                StoreError::Validation(message)
            } else {
                StoreError::Server {
                    status: status.as_u16(),
                    message,
                }
            }
        }
        status if status.is_server_error() => StoreError::Server {
            status: status.as_u16(),
            message,
        },
        _ => StoreError::Unknown(message),
    }
}
