//! Scripted transport and a pre-wired component graph for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;

use crate::api::{ApiClient, HttpRequest, HttpResponse, HttpTransport, Method, SessionCookie, TransportError};
use crate::clock::ManualClock;
use crate::config::{ClientConfig, RateLimitPolicy};
use crate::secure_storage::{MemoryBackend, SecureStore};
use crate::security::{DeviceFingerprint, Digester, PlatformInfo, RateLimiter, RequestSigner, Sha256Digester};

pub const TEST_NOW: u64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Delayed(Duration, HttpResponse),
    Fail(String),
    Panic,
}

pub fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".into(), "application/json".into())],
        body: body.to_string(),
    }
}

/// Transport answering from a per-route script. Queued answers are consumed
/// in order; the last one repeats. Unscripted routes answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, method: Method, path: &str, response: HttpResponse) {
        self.push(method, path, Scripted::Respond(response));
    }

    pub fn respond_json(&self, method: Method, path: &str, status: u16, body: &str) {
        self.respond(method, path, json_response(status, body));
    }

    pub fn respond_after(&self, method: Method, path: &str, delay: Duration, response: HttpResponse) {
        self.push(method, path, Scripted::Delayed(delay, response));
    }

    pub fn fail_with(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, Scripted::Fail(message.to_string()));
    }

    pub fn panic_on(&self, method: Method, path: &str) {
        self.push(method, path, Scripted::Panic);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn count_for(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && path_of(&r.url) == path)
            .count()
    }

    fn next(&self, method: Method, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn path_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let path = path_of(&request.url);
        self.requests.lock().push(request);

        match self.next(method, &path) {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Scripted::Fail(message)) => Err(TransportError::Network(message)),
            Some(Scripted::Panic) => panic!("scripted panic for {} {}", method, path),
            None => Ok(json_response(404, r#"{"error":"Not found"}"#)),
        }
    }
}

/// Component graph wired the way `HuddleCore` wires it, over mocks.
pub struct Harness {
    pub config: ClientConfig,
    pub transport: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
    pub backend: MemoryBackend,
    pub store: Arc<SecureStore>,
    pub cookie: Arc<SessionCookie>,
    pub auth_limiter: Arc<RateLimiter>,
    pub api: Arc<ApiClient>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ClientConfig {
            verbose_errors: false,
            api_rate_limit: RateLimitPolicy::new(1_000, 1_000),
            ..ClientConfig::default()
        })
    }

    pub fn with_verbose_errors(verbose: bool) -> Self {
        Self::build(ClientConfig {
            verbose_errors: verbose,
            api_rate_limit: RateLimitPolicy::new(1_000, 1_000),
            ..ClientConfig::default()
        })
    }

    pub fn with_api_limit(policy: RateLimitPolicy) -> Self {
        Self::build(ClientConfig {
            verbose_errors: false,
            api_rate_limit: policy,
            ..ClientConfig::default()
        })
    }

    pub fn build(config: ClientConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(TEST_NOW));
        let backend = MemoryBackend::new();
        let digester: Arc<dyn Digester> = Arc::new(Sha256Digester);
        let store = Arc::new(SecureStore::new(
            Box::new(backend.clone()),
            Some(digester.clone()),
            clock.clone(),
        ));
        let cookie = Arc::new(SessionCookie::new(store.clone(), clock.clone()));
        let auth_limiter = Arc::new(RateLimiter::new(config.auth_rate_limit, clock.clone()));
        let api_limiter = Arc::new(RateLimiter::new(config.api_rate_limit, clock.clone()));
        let api = Arc::new(ApiClient::new(
            &config,
            transport.clone(),
            test_signer(clock.clone()),
            api_limiter,
            cookie.clone(),
            clock.clone(),
        ));

        Self {
            config,
            transport,
            clock,
            backend,
            store,
            cookie,
            auth_limiter,
            api,
        }
    }

    /// A signer identical to the one inside `api`.
    pub fn signer_for_tests(&self) -> RequestSigner {
        test_signer(self.clock.clone())
    }
}

fn test_signer(clock: Arc<ManualClock>) -> RequestSigner {
    let digester: Arc<dyn Digester> = Arc::new(Sha256Digester);
    let fingerprint = DeviceFingerprint::new(
        PlatformInfo::new("test-os", "1.0"),
        "huddle-test",
        Some(digester.clone()),
        clock,
    );
    RequestSigner::new(Arc::new(fingerprint), Some(digester))
}
