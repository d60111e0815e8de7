//! HTTP Transport
//!
//! Form-POST transport used by the token endpoint client.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{NetworkError, OAuth2Error, ProtocolError};

/// Response size cap.
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Form content type.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP POST request.
#[derive(Clone)]
pub struct HttpRequest {
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body. Carries credentials; never logged.
    pub body: String,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Form-encoded POST.
    pub fn form(url: impl Into<String>, body: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        Self {
            url: url.into(),
            headers,
            body,
            timeout: None,
        }
    }

    /// Override the transport timeout for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &format_args!("[{} bytes]", self.body.len()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a POST request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error>;
}

/// Default reqwest-based HTTP transport.
///
/// TLS certificate validation stays enabled; redirects are never followed.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> Result<Self, OAuth2Error> {
        Self::with_options(Duration::from_secs(30), MAX_RESPONSE_SIZE)
    }

    /// Create transport with custom options.
    pub fn with_options(timeout: Duration, max_response_size: usize) -> Result<Self, OAuth2Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                OAuth2Error::Network(NetworkError::ClientBuild {
                    message: e.to_string(),
                })
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = self.client.post(&request.url);
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        let response = req_builder
            .body(request.body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OAuth2Error::Network(NetworkError::Timeout { timeout })
                } else {
                    OAuth2Error::Network(NetworkError::ConnectionFailed {
                        message: e.to_string(),
                    })
                }
            })?;

        let status = response.status().as_u16();

        if (300..400).contains(&status) {
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            return Err(OAuth2Error::Protocol(ProtocolError::UnexpectedRedirect {
                location,
            }));
        }

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_lowercase(), v.to_string());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(OAuth2Error::Protocol(ProtocolError::ResponseTooLarge {
                    size: len as usize,
                }));
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                OAuth2Error::Network(NetworkError::Timeout { timeout })
            } else {
                OAuth2Error::Protocol(ProtocolError::InvalidResponse {
                    message: e.to_string(),
                })
            }
        })?;

        if body.len() > self.max_response_size {
            return Err(OAuth2Error::Protocol(ProtocolError::ResponseTooLarge {
                size: body.len(),
            }));
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Mock HTTP transport for testing.
///
/// Queued responses are returned in FIFO order.
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, NetworkError>>>,
    request_history: Mutex<Vec<HttpRequest>>,
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response(&self, status: u16, body: serde_json::Value) -> &Self {
        self.queue_response(HttpResponse {
            status,
            headers: [("content-type".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: body.to_string(),
        })
    }

    /// Queue a transport failure.
    pub fn queue_network_error(&self, error: NetworkError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.request_history.lock().unwrap().clone()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.request_history.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error> {
        self.request_history.lock().unwrap().push(request);

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(OAuth2Error::Network(error)),
            None => Err(OAuth2Error::Network(NetworkError::ConnectionFailed {
                message: "No mock response available".to_string(),
            })),
        }
    }
}

/// Create production HTTP transport.
pub fn create_transport(timeout: Option<Duration>) -> Result<ReqwestHttpTransport, OAuth2Error> {
    match timeout {
        Some(t) => ReqwestHttpTransport::with_options(t, MAX_RESPONSE_SIZE),
        None => ReqwestHttpTransport::new(),
    }
}

/// Create mock HTTP transport for testing.
pub fn create_mock_transport() -> MockHttpTransport {
    MockHttpTransport::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_mock_transport_fifo() {
        let transport = MockHttpTransport::new();
        transport
            .queue_json_response(200, serde_json::json!({"n": 1}))
            .queue_json_response(400, serde_json::json!({"n": 2}));

        let first = transport
            .send(HttpRequest::form("https://example.com/token", "a=1".into()))
            .await
            .unwrap();
        let second = transport
            .send(HttpRequest::form("https://example.com/token", "a=2".into()))
            .await
            .unwrap();

        assert!(first.is_success());
        assert_eq!(second.status, 400);
        assert_eq!(transport.get_requests().len(), 2);
        assert_eq!(transport.get_last_request().unwrap().body, "a=2");
    }

    #[test]
    fn test_request_debug_hides_body() {
        let request = HttpRequest::form("https://example.com", "client_secret=shh".into());
        assert!(!format!("{:?}", request).contains("shh"));
    }

    #[tokio::test]
    async fn test_reqwest_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestHttpTransport::new().unwrap();
        let response = transport
            .send(HttpRequest::form(format!("{}/token", server.uri()), "a=b".into()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.contains("ok"));
    }

    #[tokio::test]
    async fn test_reqwest_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "https://evil.example/token"),
            )
            .mount(&server)
            .await;

        let transport = ReqwestHttpTransport::new().unwrap();
        let result = transport
            .send(HttpRequest::form(server.uri(), String::new()))
            .await;

        assert!(matches!(
            result,
            Err(OAuth2Error::Protocol(ProtocolError::UnexpectedRedirect { location })) if location == "https://evil.example/token"
        ));
    }

    #[tokio::test]
    async fn test_reqwest_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = ReqwestHttpTransport::new().unwrap();
        let result = transport
            .send(
                HttpRequest::form(server.uri(), String::new())
                    .with_timeout(Duration::from_millis(50)),
            )
            .await;

        assert!(matches!(
            result,
            Err(OAuth2Error::Network(NetworkError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reqwest_response_size_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let transport = ReqwestHttpTransport::with_options(Duration::from_secs(5), 16).unwrap();
        let result = transport
            .send(HttpRequest::form(server.uri(), String::new()))
            .await;

        assert!(matches!(
            result,
            Err(OAuth2Error::Protocol(ProtocolError::ResponseTooLarge { .. }))
        ));
    }
}
