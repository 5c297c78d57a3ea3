//! Request and response interceptors.
//!
//! Interceptors run in the order they were registered on the
//! [`HttpClient`](super::HttpClient). Request interceptors can decorate the
//! outgoing request; response interceptors observe the status before the
//! client decides whether the request succeeded.

use super::credentials::CredentialStore;
use reqwest::{RequestBuilder, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decorates an outgoing request.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Observes the status of every response.
pub trait ResponseInterceptor: Send + Sync {
    fn on_status(&self, status: StatusCode);
}

/// Attaches `Authorization: Bearer <token>` when a token is stored.
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestInterceptor for BearerAuth {
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
        match self.store.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Callback invoked when the backend rejects the stored credential.
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

/// On 401, clears stored credentials and hands control to a login boundary.
pub struct UnauthorizedRedirect {
    store: Arc<dyn CredentialStore>,
    on_unauthorized: UnauthorizedCallback,
}

impl UnauthorizedRedirect {
    pub fn new(store: Arc<dyn CredentialStore>, on_unauthorized: UnauthorizedCallback) -> Self {
        Self {
            store,
            on_unauthorized,
        }
    }
}

impl ResponseInterceptor for UnauthorizedRedirect {
    fn on_status(&self, status: StatusCode) {
        if status != StatusCode::UNAUTHORIZED {
            return;
        }

        debug!("Backend returned 401, clearing stored credentials");
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored credentials: {}", e);
        }
        (self.on_unauthorized)();
    }
}
