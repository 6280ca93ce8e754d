//! HTTP implementation of the remote cart service.
//!
//! Uses `reqwest` with a bearer credential read from the auth session on
//! every call, so a token refresh or sign-out takes effect immediately.
//! Timeouts belong to the transport; the engine imposes none of its own.

use std::sync::Arc;

use async_trait::async_trait;
use cart_sync_core::{Cart, ProductId};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::{CartService, ClientError};
use crate::auth::AuthSession;
use crate::config::CartApiConfig;
use crate::normalize::normalize_list;

// =============================================================================
// HttpCartClient
// =============================================================================

/// Client for the remote cart service.
///
/// Cheaply cloneable; clones share the connection pool.
#[derive(Clone)]
pub struct HttpCartClient {
    inner: Arc<HttpCartClientInner>,
}

struct HttpCartClientInner {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<dyn AuthSession>,
}

impl HttpCartClient {
    /// Create a new cart service client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CartApiConfig, session: Arc<dyn AuthSession>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCartClientInner {
                client,
                base_url: config.base_url.clone(),
                session,
            }),
        })
    }

    /// Resolve an endpoint path against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ClientError::Parse(format!("Invalid endpoint {path}: {e}")))
    }

    /// Path for an id-scoped operation, with the id percent-encoded.
    fn item_path(action: &str, id: &ProductId) -> String {
        format!("cart/{action}/{}", urlencoding::encode(id.as_str()))
    }

    /// Execute a request and return the response body.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<String, ClientError> {
        let token = self
            .inner
            .session
            .bearer_token()
            .ok_or(ClientError::Unauthenticated)?;
        let url = self.endpoint(path)?;

        let mut request = self
            .inner
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ClientError::RateLimited(retry_after));
        }

        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Cart service returned non-success status"
            );
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: response_text.chars().take(200).collect(),
            });
        }

        Ok(response_text)
    }
}

#[async_trait]
impl CartService for HttpCartClient {
    #[instrument(skip(self))]
    async fn view(&self) -> Result<Cart, ClientError> {
        let body = self.execute(Method::GET, "cart/view", None).await?;
        if body.trim().is_empty() {
            return Ok(Cart::new());
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse cart view response"
            );
            ClientError::Parse(e.to_string())
        })?;

        let cart: Cart = normalize_list(value).into_iter().collect();
        debug!(lines = cart.len(), "Fetched server cart");
        Ok(cart)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn add(&self, id: &ProductId) -> Result<(), ClientError> {
        let body = json!({ "productId": id.as_str(), "quantity": 1 });
        self.execute(Method::POST, "cart/add", Some(body)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn increase(&self, id: &ProductId) -> Result<(), ClientError> {
        self.execute(Method::PUT, &Self::item_path("increase", id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn decrease(&self, id: &ProductId) -> Result<(), ClientError> {
        self.execute(Method::PUT, &Self::item_path("decrease", id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn remove(&self, id: &ProductId) -> Result<(), ClientError> {
        self.execute(Method::DELETE, &Self::item_path("remove", id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), ClientError> {
        self.execute(Method::DELETE, "cart/clear", None).await?;
        Ok(())
    }
}
