//! Signed HTTP access to the chat server.
//!
//! Every call is gated by the generic rate limiter, carries the security
//! headers and the session cookie, and resolves to an [`ApiResponse`]; no
//! expected failure escapes as an error or panic.

pub mod cookies;
pub mod transport;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::constants::{headers, limit_keys, DEVICE_ID_HEADER_LEN};
use crate::security::{RateLimiter, RequestSigner};

pub use cookies::SessionCookie;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError};

pub const RATE_LIMITED_STATUS: u16 = 429;
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Uniform result of every API call. `status` is 0 when no HTTP exchange
/// completed.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub status: u16,
}

impl<T> ApiResponse<T> {
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.error.is_none()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == RATE_LIMITED_STATUS
    }

    /// Successful payload, or the server's message, or `fallback`.
    pub fn into_result(self, fallback: &str) -> Result<T, String> {
        if self.is_success() {
            if let Some(data) = self.data {
                return Ok(data);
            }
        }
        Err(self.error.unwrap_or_else(|| fallback.to_string()))
    }
}

pub struct ApiClient {
    base_url: String,
    app_version: String,
    verbose_errors: bool,
    transport: Arc<dyn HttpTransport>,
    signer: RequestSigner,
    limiter: Arc<RateLimiter>,
    cookie: Arc<SessionCookie>,
    clock: Arc<dyn Clock>,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        signer: RequestSigner,
        limiter: Arc<RateLimiter>,
        cookie: Arc<SessionCookie>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_version: config.app_version.clone(),
            verbose_errors: config.verbose_errors,
            transport,
            signer,
            limiter,
            cookie,
            clock,
        }
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request(Method::Get, path, &[], None).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ApiResponse<T> {
        self.request(Method::Get, path, query, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResponse<T> {
        match serde_json::to_string(body) {
            Ok(json) => self.request(Method::Post, path, &[], Some(json)).await,
            Err(e) => self.unexpected(&e.to_string()),
        }
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResponse<T> {
        match serde_json::to_string(body) {
            Ok(json) => self.request(Method::Put, path, &[], Some(json)).await,
            Err(e) => self.unexpected(&e.to_string()),
        }
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request(Method::Delete, path, &[], None).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> ApiResponse<T> {
        let call = self.dispatch(method, path, query, body);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(%method, path, "request panicked");
                ApiResponse::failure(0, UNEXPECTED_ERROR_MESSAGE)
            }
        }
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> ApiResponse<T> {
        if !self.limiter.can_attempt(limit_keys::API) {
            tracing::warn!(%method, path, "api rate limit hit, request not sent");
            return ApiResponse::failure(RATE_LIMITED_STATUS, RATE_LIMITED_MESSAGE);
        }
        self.limiter.record_attempt(limit_keys::API);

        let url = match self.build_url(path, query) {
            Ok(url) => url,
            Err(e) => return self.unexpected(&e),
        };
        let signed_path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        // Taken before the Cookie header is read
        let cookie_epoch = self.cookie.epoch();
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: self.security_headers(method, &signed_path),
            body,
        };

        tracing::debug!(%method, path = %signed_path, "api request");
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%method, path = %signed_path, "transport failure: {}", e);
                let message = if self.verbose_errors {
                    e.to_string()
                } else {
                    NETWORK_ERROR_MESSAGE.to_string()
                };
                return ApiResponse::failure(0, message);
            }
        };

        self.cookie
            .absorb(cookie_epoch, response.header_values(headers::SET_COOKIE));

        let status = response.status;
        let parsed: Option<Value> = if response.body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&response.body).ok()
        };

        if (200..300).contains(&status) {
            let data = parsed.and_then(|value| match serde_json::from_value::<T>(value) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::debug!(path = %signed_path, "response body did not match: {}", e);
                    None
                }
            });
            ApiResponse {
                data,
                error: None,
                status,
            }
        } else {
            let error = parsed
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| format!("Request failed with status {}", status));
            tracing::debug!(path = %signed_path, status, "api error response");
            ApiResponse::failure(status, error)
        }
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, String> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&joined).map_err(|e| format!("invalid url {}: {}", joined, e))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn security_headers(&self, method: Method, signed_path: &str) -> Vec<(String, String)> {
        let timestamp = self.clock.now_millis();
        let signature = self.signer.sign(method.as_str(), signed_path, timestamp);
        let device_id = self.signer.fingerprint().header_value(DEVICE_ID_HEADER_LEN);

        let mut out = vec![
            (headers::CONTENT_TYPE.to_string(), headers::JSON.to_string()),
            (headers::ACCEPT.to_string(), headers::JSON.to_string()),
            (headers::REQUEST_TIME.to_string(), timestamp.to_string()),
            (headers::REQUEST_SIGNATURE.to_string(), signature),
            (headers::DEVICE_ID.to_string(), device_id),
            (headers::APP_VERSION.to_string(), self.app_version.clone()),
        ];
        if let Some(cookie) = self.cookie.get() {
            out.push((headers::COOKIE.to_string(), cookie));
        }
        out
    }

    fn unexpected<T>(&self, detail: &str) -> ApiResponse<T> {
        tracing::error!("unexpected api failure: {}", detail);
        if self.verbose_errors {
            ApiResponse::failure(0, detail.to_string())
        } else {
            ApiResponse::failure(0, UNEXPECTED_ERROR_MESSAGE)
        }
    }
}

fn error_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}
