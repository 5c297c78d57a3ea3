//! Billing backend client.
//!
//! The aggregator talks to the backend only through [`ApiClient`]. The
//! production implementation is [`HttpClient`], an explicit object carrying
//! its own interceptor chain for credentials and 401 handling.

pub mod credentials;
pub mod error;
pub mod http;
pub mod middleware;

use async_trait::async_trait;
use serde_json::Value;

pub use credentials::{CredentialStore, FileCredentials, MemoryCredentials};
pub use error::ClientError;
pub use http::{HttpClient, HttpClientConfig};
pub use middleware::{BearerAuth, UnauthorizedRedirect};

/// Dispatches read requests against the backend.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// GET `path` with the given query parameters and return the JSON body.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ClientError>;
}
