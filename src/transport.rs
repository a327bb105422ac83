//! HTTP transport seam.
//!
//! The dispatcher shapes a [`TransportRequest`] and hands it to a
//! [`Transport`]. The default implementation sends it with a blocking
//! `reqwest` client; tests and embedders can plug in their own.

use crate::client::create_rest_client;
use crate::error::Result;
use crate::method::Verb;
use parking_lot::RwLock;
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque security policy forwarded verbatim to the transport
pub type SecurityManager = Arc<dyn Any + Send + Sync>;

/// A fully shaped request, ready to go on the wire
#[derive(Clone)]
pub struct TransportRequest {
    pub verb: Verb,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
    pub validates_secure_certificate: Option<bool>,
    pub security_manager: Option<SecurityManager>,
}

impl TransportRequest {
    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("verb", &self.verb)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("validates_secure_certificate", &self.validates_secure_certificate)
            .field("security_manager", &self.security_manager.is_some())
            .finish()
    }
}

/// A successful exchange
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A failed exchange: either an error status or no response at all
#[derive(Debug, Clone)]
pub struct TransportFailure {
    /// HTTP status, absent when the request never got a response
    pub status: Option<u16>,
    /// Raw response text, empty when there was none
    pub body: String,
    pub message: String,
}

/// Executes requests on behalf of the dispatcher
pub trait Transport: Send + Sync {
    fn execute(&self, request: &TransportRequest) -> std::result::Result<TransportResponse, TransportFailure>;

    /// Drop cookies held for `url`, for transports that keep any
    fn clear_cookies(&self, _url: &str) {}
}

/// Cookie store that can be emptied, shared by both transport clients
#[derive(Default)]
pub struct CookieJar {
    inner: RwLock<Jar>,
}

impl CookieJar {
    /// Forget every stored cookie
    pub fn clear(&self) {
        *self.inner.write() = Jar::default();
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.inner.read().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.read().cookies(url)
    }
}

/// Blocking `reqwest` transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    /// Used when certificate validation is turned off
    insecure: Client,
    cookies: Arc<CookieJar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let cookies = Arc::new(CookieJar::default());
        Ok(ReqwestTransport {
            client: create_rest_client(true, cookies.clone())?,
            insecure: create_rest_client(false, cookies.clone())?,
            cookies,
        })
    }

    fn client_for(&self, request: &TransportRequest) -> &Client {
        match request.validates_secure_certificate {
            Some(false) => &self.insecure,
            _ => &self.client,
        }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &TransportRequest) -> std::result::Result<TransportResponse, TransportFailure> {
        let mut builder = self
            .client_for(request)
            .request(request.verb.to_reqwest(), request.url.as_str())
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| TransportFailure {
            status: e.status().map(|s| s.as_u16()),
            body: String::new(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().map_err(|e| TransportFailure {
            status: Some(status.as_u16()),
            body: String::new(),
            message: e.to_string(),
        })?;

        if status.is_client_error() || status.is_server_error() {
            return Err(TransportFailure {
                status: Some(status.as_u16()),
                body,
                message: format!("HTTP error {}", status),
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }

    /// The jar is not partitioned by site, so every cookie is dropped
    fn clear_cookies(&self, _url: &str) {
        self.cookies.clear();
    }
}
