//! HTTP transport seam.
//!
//! The fetcher only ever issues conditional GETs, so the trait is a single method. The
//! production implementation uses `reqwest`'s blocking client; tests substitute a double
//! that counts calls (see `test_utils::CountingTransport`).

use crate::core::LoomError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

/// A GET request with extra headers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, headers and a streaming body.
///
/// Header names are stored lowercase.
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Box::new(body),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Something that can perform a GET.
///
/// Implementations must not decode `Content-Encoding`; the fetcher does that itself.
pub trait HttpTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking `reqwest` transport with a per-request timeout.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oldloom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| LoomError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(|err| LoomError::Network {
            url: request.url.clone(),
            reason: err.to_string(),
        })?;

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        Ok(HttpResponse {
            status: response.status().as_u16(),
            headers,
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("https://example.invalid").header("If-None-Match", "\"x\"");
        assert_eq!(request.header_value("if-none-match"), Some("\"x\""));

        let response = HttpResponse::new(200, std::io::empty()).with_header("ETag", "\"y\"");
        assert_eq!(response.header("etag"), Some("\"y\""));
        assert!(response.is_success());
    }
}
