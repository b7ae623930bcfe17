use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const MAX_HEADER_NAME_LENGTH: usize = 256;
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;
pub const MAX_HEADERS_COUNT: usize = 100;

/// Substrings that identify a connectivity failure in a platform error message.
const OFFLINE_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "offline",
    "connection",
    "unreachable",
    "failed to fetch",
    "no internet",
];

/// Heuristic used when the shell reports a failure only as free text.
#[must_use]
pub fn looks_offline(message: &str) -> bool {
    let lower = message.to_lowercase();
    OFFLINE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, HttpError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(HttpError::InvalidUrl {
                url: String::new(),
                reason: "URL cannot be empty".to_string(),
            });
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(&url),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }

        let parsed = Url::parse(url.trim()).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(&url),
            reason: e.to_string(),
        })?;
        Self::from_parsed(&parsed)
    }

    fn from_parsed(parsed: &Url) -> Result<Self, HttpError> {
        let scheme = parsed.scheme().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(parsed.as_str()),
                reason: format!("invalid scheme '{scheme}', only 'http' and 'https' are allowed"),
            });
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl {
                url: Self::truncate_url(parsed.as_str()),
                reason: "URL must have a host".to_string(),
            })?
            .to_lowercase();

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(parsed.as_str()),
                reason: "credentials in URL are not allowed".to_string(),
            });
        }

        Ok(Self {
            url: parsed.to_string(),
            host,
        })
    }

    /// Appends an API path to this base. Path segments are percent-encoded,
    /// so an id can never escape its segment.
    pub fn join_segments(&self, segments: &[&str]) -> Result<Self, HttpError> {
        let mut parsed = Url::parse(&self.url).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(&self.url),
            reason: e.to_string(),
        })?;
        {
            let mut path = parsed.path_segments_mut().map_err(|()| HttpError::InvalidUrl {
                url: Self::truncate_url(&self.url),
                reason: "URL cannot be a base".to_string(),
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Self::from_parsed(&parsed)
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn truncate_url(url: &str) -> String {
        if url.len() <= 100 {
            url.to_string()
        } else {
            let mut end = 100;
            while !url.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &url[..end])
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HttpHeaders {
    headers: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        if self.headers.len() >= MAX_HEADERS_COUNT {
            return Err(HttpError::InvalidHeader {
                name: String::new(),
                reason: format!("more than {MAX_HEADERS_COUNT} headers"),
            });
        }

        let name = name.into();
        let value = value.into();
        Self::validate_header_name(&name)?;
        Self::validate_header_value(&name, &value)?;

        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn validate_header_name(name: &str) -> Result<(), HttpError> {
        if name.is_empty() || name.len() > MAX_HEADER_NAME_LENGTH {
            return Err(HttpError::InvalidHeader {
                name: name.chars().take(50).collect(),
                reason: "header name is empty or too long".to_string(),
            });
        }
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(HttpError::InvalidHeader {
                name: name.to_string(),
                reason: format!("invalid character '{c}' in header name"),
            });
        }
        Ok(())
    }

    fn validate_header_value(name: &str, value: &str) -> Result<(), HttpError> {
        if value.len() > MAX_HEADER_VALUE_LENGTH {
            return Err(HttpError::InvalidHeader {
                name: name.to_string(),
                reason: format!("value exceeds {MAX_HEADER_VALUE_LENGTH} bytes"),
            });
        }
        if value.chars().any(|c| matches!(c, '\r' | '\n' | '\0')) {
            return Err(HttpError::InvalidHeader {
                name: name.to_string(),
                reason: "value contains CR, LF, or NUL".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub fn has_request_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Patch)
    }
}

/// A fully validated request, ready for the shell to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    method: HttpMethod,
    url: ValidatedUrl,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
    timeout_ms: u64,
    request_id: String,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: ValidatedUrl) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut headers = HttpHeaders::new();
        // Generated ids are always valid header values.
        let _ = headers.insert("X-Request-Id", request_id.clone());
        Self {
            method,
            url,
            headers,
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_id,
        }
    }

    pub fn get(url: ValidatedUrl) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: ValidatedUrl) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn patch(url: ValidatedUrl) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, HttpError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, HttpError> {
        if !self.method.has_request_body() {
            return Err(HttpError::InvalidRequest {
                reason: format!("{} requests cannot have a body", self.method.as_str()),
            });
        }
        let body = serde_json::to_vec(value).map_err(|e| HttpError::Serialization {
            message: e.to_string(),
        })?;
        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(HttpError::InvalidRequest {
                reason: format!("body of {} bytes exceeds {MAX_REQUEST_BODY_SIZE}", body.len()),
            });
        }
        self.headers.insert("Content-Type", "application/json")?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, HttpError> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 || ms > MAX_TIMEOUT_MS {
            return Err(HttpError::InvalidRequest {
                reason: format!("timeout must be between 1 and {MAX_TIMEOUT_MS}ms"),
            });
        }
        self.timeout_ms = ms;
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("serialization error: {message}")]
    Serialization { message: String },
    #[error("DNS resolution failed for {host}: {message}")]
    DnsError { host: String, message: String },
    #[error("connection failed to {host}: {message}")]
    ConnectionError { host: String, message: String },
    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },
    #[error("request cancelled")]
    Cancelled { request_id: String },
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },
    /// Anything the platform could only describe in words.
    #[error("platform error: {message}")]
    Platform { message: String },
}

impl HttpError {
    /// Connectivity failure, as opposed to the server refusing the request.
    pub fn is_offline(&self) -> bool {
        match self {
            HttpError::Timeout { .. }
            | HttpError::ConnectionError { .. }
            | HttpError::DnsError { .. }
            | HttpError::Cancelled { .. } => true,
            HttpError::Platform { message } => looks_offline(message),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.is_offline() && !matches!(self, HttpError::Cancelled { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            HttpError::Timeout { request_id, .. }
            | HttpError::Cancelled { request_id }
            | HttpError::InvalidResponse { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: HttpHeaders,
    body: Vec<u8>,
    request_id: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HttpHeaders, body: Vec<u8>, request_id: String) -> Self {
        Self {
            status,
            headers,
            body,
            request_id,
        }
    }

    /// Convenience for shells and tests that already hold a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value, request_id: impl Into<String>) -> Self {
        let mut headers = HttpHeaders::new();
        let _ = headers.insert("Content-Type", "application/json");
        Self::new(
            status,
            headers,
            serde_json::to_vec(body).unwrap_or_default(),
            request_id.into(),
        )
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::InvalidResponse {
            reason: format!("failed to parse JSON: {e}"),
            request_id: self.request_id.clone(),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// The shell's HTTP client. The core builds and validates requests; the shell
/// owns the socket and reports back a response or a classified failure.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResult;
}
