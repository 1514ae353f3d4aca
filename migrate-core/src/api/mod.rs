//! REST record store client module
//!
//! Thin wrapper over a PostgREST-style API (`/rest/v1/<table>`) with
//! key-based authentication, insert/list operations, and retry with
//! exponential backoff.

pub mod client;
pub mod error;
pub mod records;
pub mod types;

// Re-export main types for convenience
pub use client::{RestStoreClient, RestStoreClientBuilder};
pub use error::{Result, StoreError};
pub use records::RecordOperations;
pub use types::*;
