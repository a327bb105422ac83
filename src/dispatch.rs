//! Request dispatch.
//!
//! A [`Dispatcher`] executes one HTTP request per call and resolves exactly
//! one outcome through the callbacks it was given:
//!
//! 1. the URL is made absolute with the configured base URL,
//! 2. global headers are applied, then per-call headers on top,
//! 3. a before-send (or, for POST, before-post) hook may rewrite the body,
//! 4. the body is serialized as JSON or form data and sent,
//! 5. the response is parsed leniently and routed to the success callback,
//!    or the failure is routed through the error-handler chain together with
//!    a [`Retry`] handle.

use crate::callback::{ignore_load, BodyHook, LoadHook, OnError, OnLoad};
use crate::client::Config;
use crate::error::{RestError, Result};
use crate::headers::{BodyEncoding, HeaderRegistry};
use crate::method::Verb;
use crate::response::parse_lenient;
use crate::transport::{SecurityManager, Transport, TransportFailure, TransportRequest};
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span, warn};
use url::form_urlencoded;
use uuid::Uuid;

lazy_static! {
    /// A scheme followed by `://` at the very start of a URL
    static ref ABSOLUTE_URL: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap();
}

/// Everything needed to issue one request
#[derive(Clone)]
pub struct RequestContext {
    /// Stable across retries of the same request
    pub id: Uuid,
    /// Absolute, or relative to the configured base URL
    pub url: String,
    pub verb: Verb,
    pub body: Option<Value>,
    /// Per-call headers, applied over the global ones
    pub headers: HeaderRegistry,
    pub timeout: Option<Duration>,
    pub before_send: Option<BodyHook>,
    pub before_post: Option<BodyHook>,
}

impl RequestContext {
    pub fn new(verb: Verb, url: impl Into<String>) -> Self {
        RequestContext {
            id: Uuid::new_v4(),
            url: url.into(),
            verb,
            body: None,
            headers: HeaderRegistry::new(),
            timeout: None,
            before_send: None,
            before_post: None,
        }
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_headers(mut self, headers: HeaderRegistry) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hooks(mut self, before_send: Option<BodyHook>, before_post: Option<BodyHook>) -> Self {
        self.before_send = before_send;
        self.before_post = before_post;
        self
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("verb", &self.verb)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// How a physical send ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The success path ran
    Loaded,
    /// The error path ran
    Failed,
    /// A before-send hook has not released the request yet
    Held,
}

/// Record of one dispatched request
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: Uuid,
    pub verb: Verb,
    /// Absolute URL the request was sent to
    pub url: String,
    pub status: Option<u16>,
    pub outcome: Outcome,
}

/// Re-issues a failed request with the same callbacks.
///
/// Handed to error callbacks. There is no limit on how many times it can be
/// used; backoff is up to the caller.
#[derive(Clone)]
pub struct Retry {
    dispatcher: Arc<Dispatcher>,
    ctx: RequestContext,
    on_load: Option<OnLoad>,
    on_error: Option<OnError>,
}

impl Retry {
    pub fn send(&self) -> Result<Exchange> {
        if self.dispatcher.debug {
            debug!(id = %self.ctx.id, url = %self.ctx.url, "retrying");
        }
        self.dispatcher
            .dispatch(self.ctx.clone(), self.on_load.clone(), self.on_error.clone())
    }

    /// URL of the request as given to the dispatcher
    pub fn url(&self) -> &str {
        &self.ctx.url
    }

    pub fn request_id(&self) -> Uuid {
        self.ctx.id
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

/// Continuation handed to before-send hooks.
///
/// Nothing is sent until [`send`](Proceed::send) is called. Dropping it
/// without sending abandons the request.
pub struct Proceed {
    dispatcher: Arc<Dispatcher>,
    prepared: Prepared,
    on_load: Option<OnLoad>,
    on_error: Option<OnError>,
    slot: Arc<Mutex<Option<Result<Exchange>>>>,
}

impl Proceed {
    /// Send the request with `body`
    pub fn send(self, body: Option<Value>) {
        let Proceed {
            dispatcher,
            mut prepared,
            on_load,
            on_error,
            slot,
        } = self;

        prepared.body = body;
        let result = dispatcher.transmit(prepared, on_load, on_error);

        // the dispatcher dropped its end once the hook returned
        if Arc::strong_count(&slot) == 1 {
            if let Err(ref e) = result {
                warn!(error = %e, "held request failed after dispatch returned");
            }
            return;
        }
        *slot.lock() = Some(result);
    }

    /// Absolute URL the request will be sent to
    pub fn url(&self) -> &str {
        &self.prepared.url
    }
}

/// A request with headers and options resolved, waiting for its body
#[derive(Clone)]
struct Prepared {
    ctx: RequestContext,
    url: String,
    headers: Vec<(String, String)>,
    encoding: BodyEncoding,
    timeout: Duration,
    body: Option<Value>,
}

/// Executes requests against a [`Transport`] using instance-wide settings
pub struct Dispatcher {
    base_url: Option<String>,
    timeout: Duration,
    debug: bool,
    errors_as_objects: bool,
    validates_secure_certificate: Option<bool>,
    security_manager: Option<SecurityManager>,
    on_load: Option<LoadHook>,
    on_error: Option<OnError>,
    before_send: Option<BodyHook>,
    before_post: Option<BodyHook>,
    headers: RwLock<HeaderRegistry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Dispatcher {
            base_url: config.base_url.clone(),
            timeout: config.effective_timeout(),
            debug: config.debug,
            errors_as_objects: config.errors_as_objects,
            validates_secure_certificate: config.validates_secure_certificate,
            security_manager: config.security_manager.clone(),
            on_load: config.on_load.clone(),
            on_error: config.on_error.clone(),
            before_send: config.before_send.clone(),
            before_post: config.before_post.clone(),
            headers: RwLock::new(config.request_headers.clone()),
            transport,
        }
    }

    /// Global headers, shared with the owning client
    pub fn headers(&self) -> &RwLock<HeaderRegistry> {
        &self.headers
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Prefix `url` with the base URL unless it starts with a scheme
    pub fn absolute_url(&self, url: &str) -> String {
        match self.base_url {
            Some(ref base) if !ABSOLUTE_URL.is_match(url) => format!("{base}{url}"),
            _ => url.to_string(),
        }
    }

    /// Error handler used when a call brings none: the configured one, else
    /// the success callback
    pub fn fallback_error_handler(&self, on_load: Option<&OnLoad>) -> Option<OnError> {
        if let Some(ref handler) = self.on_error {
            return Some(handler.clone());
        }
        on_load.map(|on_load| {
            let on_load = on_load.clone();
            Arc::new(move |value: Value, _retry: Retry| on_load(value)) as OnError
        })
    }

    /// Issue a request.
    ///
    /// Returns once the outcome callbacks have run, or once a before-send
    /// hook returned without releasing the request. Fails only when the
    /// request errors and no handler is available.
    pub fn dispatch(
        self: &Arc<Self>,
        ctx: RequestContext,
        on_load: Option<OnLoad>,
        on_error: Option<OnError>,
    ) -> Result<Exchange> {
        let span = debug_span!("request", id = %ctx.id, verb = %ctx.verb);
        let _guard = span.enter();

        let url = self.absolute_url(&ctx.url);
        if self.debug {
            debug!(url = %url, "dispatching");
            if let Some(ref body) = ctx.body {
                debug!(body = %body, "params");
            }
        }

        // computed header values may touch the registry themselves
        let global = self.headers.read().clone();
        let (headers, encoding) = global.merge(&ctx.headers);
        let prepared = Prepared {
            url,
            headers,
            encoding,
            timeout: ctx.timeout.unwrap_or(self.timeout),
            body: ctx.body.clone(),
            ctx,
        };

        let Some(hook) = self.body_hook(&prepared.ctx) else {
            return self.transmit(prepared, on_load, on_error);
        };

        let slot = Arc::new(Mutex::new(None));
        let body = prepared.body.clone();
        let held = Exchange {
            id: prepared.ctx.id,
            verb: prepared.ctx.verb,
            url: prepared.url.clone(),
            status: None,
            outcome: Outcome::Held,
        };
        let proceed = Proceed {
            dispatcher: self.clone(),
            prepared,
            on_load,
            on_error,
            slot: slot.clone(),
        };
        hook(body, proceed);

        let result = slot.lock().take();
        result.unwrap_or(Ok(held))
    }

    /// Call-level hooks win over configured ones; before-post only runs for POST
    fn body_hook(&self, ctx: &RequestContext) -> Option<BodyHook> {
        let post = |hook: &Option<BodyHook>| match ctx.verb {
            Verb::Post => hook.clone(),
            _ => None,
        };
        post(&ctx.before_post)
            .or_else(|| ctx.before_send.clone())
            .or_else(|| post(&self.before_post))
            .or_else(|| self.before_send.clone())
    }

    fn transmit(
        self: &Arc<Self>,
        prepared: Prepared,
        on_load: Option<OnLoad>,
        on_error: Option<OnError>,
    ) -> Result<Exchange> {
        let body = match prepared.body {
            Some(ref body) if prepared.ctx.verb.has_body() && !body.is_null() => {
                Some(encode_body(body, prepared.encoding)?)
            }
            _ => None,
        };

        let mut headers = prepared.headers.clone();
        if body.is_some() && !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-type")) {
            headers.push((
                "Content-Type".to_string(),
                prepared.encoding.content_type().to_string(),
            ));
        }

        let request = TransportRequest {
            verb: prepared.ctx.verb,
            url: prepared.url.clone(),
            headers,
            body,
            timeout: prepared.timeout,
            validates_secure_certificate: self.validates_secure_certificate,
            security_manager: self.security_manager.clone(),
        };

        let mut exchange = Exchange {
            id: prepared.ctx.id,
            verb: prepared.ctx.verb,
            url: prepared.url.clone(),
            status: None,
            outcome: Outcome::Loaded,
        };

        match self.transport.execute(&request) {
            Ok(response) => {
                if self.debug {
                    debug!(status = response.status, "loaded");
                }
                exchange.status = Some(response.status);
                self.loaded(parse_lenient(&response.body), on_load);
            }
            Err(failure) => {
                if self.debug {
                    debug!(status = ?failure.status, message = %failure.message, "failed");
                }
                exchange.status = failure.status;
                exchange.outcome = Outcome::Failed;
                self.failed(prepared, failure, on_load, on_error)?;
            }
        }

        Ok(exchange)
    }

    fn loaded(&self, value: Value, on_load: Option<OnLoad>) {
        match (&self.on_load, on_load) {
            (Some(hook), on_load) => hook(value, on_load.unwrap_or_else(ignore_load)),
            (None, Some(on_load)) => on_load(value),
            (None, None) => {}
        }
    }

    fn failed(
        self: &Arc<Self>,
        prepared: Prepared,
        failure: TransportFailure,
        on_load: Option<OnLoad>,
        on_error: Option<OnError>,
    ) -> Result<()> {
        let content = parse_lenient(&failure.body);
        let error = if self.errors_as_objects {
            json!({
                "error": failure.message,
                "code": failure.status,
                "url": prepared.url,
                "content": content,
            })
        } else {
            content
        };

        let handler = on_error
            .clone()
            .or_else(|| self.fallback_error_handler(on_load.as_ref()));
        let Some(handler) = handler else {
            return Err(RestError::NoErrorHandler { url: prepared.url });
        };

        let retry = Retry {
            dispatcher: self.clone(),
            ctx: prepared.ctx,
            on_load,
            on_error,
        };
        handler(error, retry);
        Ok(())
    }
}

/// Serialize a body: form bodies are url-encoded from objects (other values
/// are sent as their text), everything else as JSON text
fn encode_body(body: &Value, encoding: BodyEncoding) -> Result<String> {
    match (encoding, body) {
        (BodyEncoding::Form, Value::Object(map)) => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in map {
                match value {
                    Value::String(s) => serializer.append_pair(key, s),
                    other => serializer.append_pair(key, &other.to_string()),
                };
            }
            Ok(serializer.finish())
        }
        (BodyEncoding::Form, Value::String(s)) => Ok(s.clone()),
        (BodyEncoding::Form, other) => Ok(other.to_string()),
        (BodyEncoding::Json, value) => Ok(serde_json::to_string(value)?),
    }
}
