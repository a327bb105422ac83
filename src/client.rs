use crate::callback::{BodyHook, LoadHook, OnError};
use crate::deferred::DeferredFactory;
use crate::error::Result;
use crate::headers::{HeaderRegistry, HeaderValue};
use crate::method::MethodDescriptor;
use crate::model::ModelDescriptor;
use crate::transport::{CookieJar, SecurityManager};
use reqwest::blocking::{Client, ClientBuilder};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied when neither the call nor the configuration sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Create the HTTP client used by the default transport
pub fn create_rest_client(validates_secure_certificate: bool, cookies: Arc<CookieJar>) -> Result<Client> {
    let client = ClientBuilder::new()
        .cookie_provider(cookies)
        .pool_max_idle_per_host(50)
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(!validates_secure_certificate)
        .build()?;
    Ok(client)
}

/// Configuration for a REST client instance
///
/// The declarative part (URLs, flags, headers, methods, models) can be loaded
/// from JSON with [`Config::from_json`]; hooks are attached in code.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Prefix for relative method URLs
    #[serde(alias = "url")]
    pub base_url: Option<String>,
    /// Request timeout, in milliseconds when loaded from JSON
    #[serde(deserialize_with = "deserialize_millis")]
    pub timeout: Option<Duration>,
    /// Enable debug logging
    pub debug: bool,
    /// Reject calls whose URL still contains placeholders
    pub auto_validate_params: bool,
    /// Hand error callbacks an object with the error details instead of the bare body
    pub errors_as_objects: bool,
    pub validates_secure_certificate: Option<bool>,
    #[serde(skip)]
    pub security_manager: Option<SecurityManager>,
    /// Headers sent with every request
    pub request_headers: HeaderRegistry,
    pub methods: Vec<MethodDescriptor>,
    pub models: Vec<ModelDescriptor>,
    /// Post-processes every successful response
    #[serde(skip)]
    pub on_load: Option<LoadHook>,
    /// Error handler used when a call has none
    #[serde(skip)]
    pub on_error: Option<OnError>,
    #[serde(skip)]
    pub before_send: Option<BodyHook>,
    #[serde(skip)]
    pub before_post: Option<BodyHook>,
    /// When set, calls made without a success callback return a promise
    #[serde(skip)]
    pub deferred: Option<Arc<dyn DeferredFactory>>,
}

impl Config {
    /// Create a new configuration with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Config {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Load the declarative part of a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_auto_validate_params(mut self, enabled: bool) -> Self {
        self.auto_validate_params = enabled;
        self
    }

    pub fn with_errors_as_objects(mut self, enabled: bool) -> Self {
        self.errors_as_objects = enabled;
        self
    }

    pub fn with_validates_secure_certificate(mut self, validate: bool) -> Self {
        self.validates_secure_certificate = Some(validate);
        self
    }

    pub fn with_security_manager(mut self, manager: SecurityManager) -> Self {
        self.security_manager = Some(manager);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.request_headers.upsert(name, value);
        self
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_model(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_on_load(mut self, hook: LoadHook) -> Self {
        self.on_load = Some(hook);
        self
    }

    pub fn with_on_error(mut self, handler: OnError) -> Self {
        self.on_error = Some(handler);
        self
    }

    pub fn with_before_send(mut self, hook: BodyHook) -> Self {
        self.before_send = Some(hook);
        self
    }

    pub fn with_before_post(mut self, hook: BodyHook) -> Self {
        self.before_post = Some(hook);
        self
    }

    pub fn with_deferred(mut self, factory: Arc<dyn DeferredFactory>) -> Self {
        self.deferred = Some(factory);
        self
    }

    /// Timeout to use when a call does not override it
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("auto_validate_params", &self.auto_validate_params)
            .field("errors_as_objects", &self.errors_as_objects)
            .field("validates_secure_certificate", &self.validates_secure_certificate)
            .field("request_headers", &self.request_headers)
            .field("methods", &self.methods)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

pub(crate) fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
