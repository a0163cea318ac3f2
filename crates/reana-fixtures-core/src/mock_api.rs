//! Fake API clients for platform components.
//!
//! A [`MockApiClient`] never touches the network: every request is recorded
//! and answered with a canned `(response, http_response)` pair, optionally
//! overridden per URL pattern.
//!
//! # Example
//!
//! ```ignore
//! let factory = make_mock_api_client(Component::WorkflowController);
//! let client = factory.client();
//!
//! let (body, http) = client.request("GET", "/workflows", Value::Null);
//! assert_eq!(http.status_code, 200);
//! client.assert_called("*/workflows");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Raw bytes returned by the default HTTP response.
pub const SAMPLE_DOWNLOADED_DATA: &[u8] = b"Sample downloaded data";

/// Platform components that expose an HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Server,
    WorkflowController,
    JobController,
}

impl Component {
    /// Component name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "reana-server",
            Self::WorkflowController => "reana-workflow-controller",
            Self::JobController => "reana-job-controller",
        }
    }

    /// Environment variable that overrides the component URL.
    pub fn url_env(&self) -> &'static str {
        match self {
            Self::Server => "REANA_SERVER_URL",
            Self::WorkflowController => "REANA_WORKFLOW_CONTROLLER_URL",
            Self::JobController => "REANA_JOB_CONTROLLER_URL",
        }
    }

    /// In-cluster URL of the component.
    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Server => "http://reana-server",
            Self::WorkflowController => "http://reana-workflow-controller",
            Self::JobController => "http://reana-job-controller",
        }
    }

    /// URL from the environment, falling back to the in-cluster default.
    pub fn base_url(&self) -> String {
        std::env::var(self.url_env()).unwrap_or_else(|_| self.default_url().to_string())
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The HTTP half of a mocked round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHttpResponse {
    /// Status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub raw_bytes: Vec<u8>,
}

impl MockHttpResponse {
    /// Response with a status code and no body.
    pub fn with_status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            raw_bytes: Vec::new(),
        }
    }
}

impl Default for MockHttpResponse {
    fn default() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            raw_bytes: SAMPLE_DOWNLOADED_DATA.to_vec(),
        }
    }
}

/// A request made through a mock client.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Full request URL.
    pub url: String,
    /// Request body or parameters.
    pub body: Value,
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> (Value, MockHttpResponse) + Send + Sync>;

struct MockHandler {
    pattern: String,
    handler: Handler,
}

/// Mock API client for one component.
#[derive(Clone)]
pub struct MockApiClient {
    component: Component,
    base_url: String,
    response: Value,
    http_response: MockHttpResponse,
    mocks: Arc<RwLock<Vec<MockHandler>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl MockApiClient {
    fn new(component: Component, response: Value, http_response: MockHttpResponse) -> Self {
        Self {
            component,
            base_url: component.base_url(),
            response,
            http_response,
            mocks: Arc::new(RwLock::new(Vec::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The component this client stands in for.
    pub fn component(&self) -> Component {
        self.component
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Answer requests matching `pattern` with `handler` instead of the
    /// default response. The first matching handler wins.
    pub fn mock<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&RecordedRequest) -> (Value, MockHttpResponse) + Send + Sync + 'static,
    {
        self.mocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockHandler {
                pattern: pattern.to_string(),
                handler: Arc::new(handler),
            });
    }

    /// Perform a request.
    pub fn request(&self, method: &str, path: &str, body: Value) -> (Value, MockHttpResponse) {
        let request = RecordedRequest {
            method: method.to_uppercase(),
            path: path.to_string(),
            url: format!("{}{}", self.base_url.trim_end_matches('/'), path),
            body,
        };
        tracing::debug!(component = %self.component, method = %request.method, url = %request.url, "Mock API request");

        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let mocks = self.mocks.read().unwrap_or_else(PoisonError::into_inner);
        for mock in mocks.iter() {
            if matches_pattern(&request.url, &mock.pattern)
                || matches_pattern(&request.path, &mock.pattern)
            {
                return (mock.handler)(&request);
            }
        }

        (self.response.clone(), self.http_response.clone())
    }

    /// Get recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get requests whose URL or path matches a pattern.
    pub fn requests_to(&self, pattern: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| matches_pattern(&r.url, pattern) || matches_pattern(&r.path, pattern))
            .collect()
    }

    /// Clear recorded requests.
    pub fn clear_requests(&self) {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // =========================================================================
    // VERIFICATION METHODS
    // =========================================================================

    /// Assert that a URL pattern was called.
    pub fn assert_called(&self, pattern: &str) {
        let matching = self.requests_to(pattern).len();
        assert!(
            matching > 0,
            "Expected {} call matching '{}', but none found. Recorded requests: {:?}",
            self.component,
            pattern,
            self.requests().iter().map(|r| r.url.clone()).collect::<Vec<_>>()
        );
    }

    /// Assert that a URL pattern was called a specific number of times.
    pub fn assert_called_times(&self, pattern: &str, expected: usize) {
        let matching = self.requests_to(pattern).len();
        assert_eq!(
            matching, expected,
            "Expected {} {} calls matching '{}', but found {}",
            expected, self.component, pattern, matching
        );
    }

    /// Assert that a URL pattern was not called.
    pub fn assert_not_called(&self, pattern: &str) {
        let matching = self.requests_to(pattern).len();
        assert_eq!(
            matching, 0,
            "Expected no {} calls matching '{}', but found {}",
            self.component, pattern, matching
        );
    }

    /// Assert that a request was made with a matching body.
    pub fn assert_called_with_body<F>(&self, pattern: &str, predicate: F)
    where
        F: Fn(&Value) -> bool,
    {
        let found = self.requests_to(pattern).iter().any(|r| predicate(&r.body));
        assert!(
            found,
            "Expected {} call matching '{}' with matching body, but none found",
            self.component, pattern
        );
    }
}

/// Builds mock clients for one component.
#[derive(Debug, Clone)]
pub struct MockApiClientFactory {
    component: Component,
    response: Value,
    http_response: MockHttpResponse,
}

impl MockApiClientFactory {
    /// Factory with the default response `{}` and a 200 HTTP response.
    pub fn new(component: Component) -> Self {
        Self {
            component,
            response: Value::Object(Default::default()),
            http_response: MockHttpResponse::default(),
        }
    }

    /// Client answering with the default response.
    pub fn client(&self) -> MockApiClient {
        MockApiClient::new(self.component, self.response.clone(), self.http_response.clone())
    }

    /// Client answering with the given response pair.
    pub fn client_with(&self, response: Value, http_response: MockHttpResponse) -> MockApiClient {
        MockApiClient::new(self.component, response, http_response)
    }
}

/// Create a factory of mock API clients for `component`.
pub fn make_mock_api_client(component: Component) -> MockApiClientFactory {
    MockApiClientFactory::new(component)
}

/// Glob match where `*` matches any run of characters.
fn matches_pattern(url: &str, pattern: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('*').collect();
    if pattern_parts.len() == 1 {
        return url == pattern;
    }

    let mut remaining = url;
    for (i, part) in pattern_parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            if !remaining.starts_with(part) {
                return false;
            }
            remaining = &remaining[part.len()..];
        } else if i == pattern_parts.len() - 1 {
            if !remaining.ends_with(part) {
                return false;
            }
        } else if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_round_trip() {
        let client = make_mock_api_client(Component::Server).client();
        let (response, http) = client.request("get", "/api/ping", Value::Null);

        assert_eq!(response, json!({}));
        assert_eq!(http.status_code, 200);
        assert_eq!(http.raw_bytes, SAMPLE_DOWNLOADED_DATA);
    }

    #[test]
    fn test_custom_response() {
        let factory = make_mock_api_client(Component::WorkflowController);
        let client = factory.client_with(
            json!({"workflow_id": "1234"}),
            MockHttpResponse::with_status(201),
        );

        let (response, http) = client.request("POST", "/workflows", json!({"name": "w"}));
        assert_eq!(response["workflow_id"], "1234");
        assert_eq!(http.status_code, 201);
        assert!(http.raw_bytes.is_empty());
    }

    #[test]
    fn test_pattern_override() {
        let client = make_mock_api_client(Component::JobController).client();
        client.mock("*/jobs/*", |_| (json!({"status": "finished"}), MockHttpResponse::default()));

        let (job, _) = client.request("GET", "/jobs/42", Value::Null);
        let (other, _) = client.request("GET", "/apispec", Value::Null);

        assert_eq!(job["status"], "finished");
        assert_eq!(other, json!({}));
    }

    #[test]
    fn test_request_recording() {
        let client = make_mock_api_client(Component::Server).client();
        client.request("post", "/api/workflows", json!({"name": "test"}));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body["name"], "test");
        assert!(requests[0].url.ends_with("/api/workflows"));

        client.assert_called("*/api/workflows");
        client.assert_called_times("/api/*", 1);
        client.assert_not_called("*/api/users");
        client.assert_called_with_body("*/workflows", |b| b["name"] == "test");

        client.clear_requests();
        assert!(client.requests().is_empty());
    }

    #[test]
    fn test_clients_share_nothing() {
        let factory = make_mock_api_client(Component::Server);
        let first = factory.client();
        let second = factory.client();

        first.request("GET", "/a", Value::Null);
        assert_eq!(first.requests().len(), 1);
        assert!(second.requests().is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("http://reana-server/api", "http://reana-server/api"));
        assert!(matches_pattern("http://reana-server/api/users", "http://reana-server/*"));
        assert!(matches_pattern("http://x/v2/users", "http://x/*/users"));
        assert!(!matches_pattern("http://other/users", "http://reana-server/*"));
    }

    #[test]
    #[should_panic(expected = "Expected no")]
    fn test_assert_not_called_fails() {
        let client = make_mock_api_client(Component::Server).client();
        client.request("GET", "/api/ping", Value::Null);
        client.assert_not_called("*/ping");
    }
}
