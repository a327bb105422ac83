//! Generated API methods.
//!
//! A [`MethodDescriptor`] declares one call: its verb, URL template, required
//! parameters, headers and hooks. [`Method`] turns it into something callable:
//! placeholders are filled from the call parameters, required parameters are
//! checked before anything goes on the wire, and the request is handed to the
//! dispatcher with the caller's callbacks wrapped by the method's hooks.

use crate::callback::{ignore_error, ignore_load, BodyHook, ErrorHook, LoadHook, OnError, OnLoad};
use crate::client::deserialize_millis;
use crate::deferred::{DeferredFactory, Promise};
use crate::dispatch::{Dispatcher, Exchange, RequestContext, Retry};
use crate::error::{RestError, Result};
use crate::headers::{HeaderRegistry, HeaderValue};
use crate::response::Params;
use crate::template::{self, BODY_KEY};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// HTTP verbs a method can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Precedence used when a descriptor declares several verbs
    pub const PRECEDENCE: [Verb; 5] = [Verb::Post, Verb::Get, Verb::Put, Verb::Patch, Verb::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Whether a body is transmitted with this verb
    pub fn has_body(self) -> bool {
        !matches!(self, Verb::Get)
    }

    /// Converts to the equivalent `reqwest::Method`
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Patch => reqwest::Method::PATCH,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of one API method
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodDescriptor {
    /// Unique name the method is registered under
    pub name: String,
    pub get: Option<String>,
    pub post: Option<String>,
    pub put: Option<String>,
    pub patch: Option<String>,
    pub delete: Option<String>,
    /// Parameters that must be supplied; for POST they are looked up in `body`
    pub expects: Option<Vec<String>>,
    #[serde(alias = "headers")]
    pub request_headers: HeaderRegistry,
    #[serde(deserialize_with = "deserialize_millis")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub on_load: Option<LoadHook>,
    #[serde(skip)]
    pub on_error: Option<ErrorHook>,
    #[serde(skip)]
    pub before_send: Option<BodyHook>,
    #[serde(skip)]
    pub before_post: Option<BodyHook>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, verb: Verb, template: impl Into<String>) -> Self {
        MethodDescriptor {
            name: name.into(),
            ..Default::default()
        }
        .with_template(verb, template)
    }

    /// Set the URL template used for `verb`
    pub fn with_template(mut self, verb: Verb, template: impl Into<String>) -> Self {
        let template = Some(template.into());
        match verb {
            Verb::Get => self.get = template,
            Verb::Post => self.post = template,
            Verb::Put => self.put = template,
            Verb::Patch => self.patch = template,
            Verb::Delete => self.delete = template,
        }
        self
    }

    pub fn with_expects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expects = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.request_headers.upsert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_on_load(mut self, hook: LoadHook) -> Self {
        self.on_load = Some(hook);
        self
    }

    pub fn with_on_error(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
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

    fn template(&self, verb: Verb) -> Option<&String> {
        match verb {
            Verb::Get => self.get.as_ref(),
            Verb::Post => self.post.as_ref(),
            Verb::Put => self.put.as_ref(),
            Verb::Patch => self.patch.as_ref(),
            Verb::Delete => self.delete.as_ref(),
        }
    }

    /// Declared verb, following [`Verb::PRECEDENCE`]
    pub fn verb(&self) -> Option<Verb> {
        Verb::PRECEDENCE
            .into_iter()
            .find(|verb| self.template(*verb).is_some())
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("get", &self.get)
            .field("post", &self.post)
            .field("put", &self.put)
            .field("patch", &self.patch)
            .field("delete", &self.delete)
            .field("expects", &self.expects)
            .field("request_headers", &self.request_headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// What a call hands back
pub enum CallHandle {
    /// The request went through the dispatcher
    Exchange(Exchange),
    /// A deferred was created because no success callback was given
    Promise(Promise),
}

impl CallHandle {
    pub fn exchange(&self) -> Option<&Exchange> {
        match self {
            CallHandle::Exchange(exchange) => Some(exchange),
            CallHandle::Promise(_) => None,
        }
    }

    pub fn into_promise(self) -> Option<Promise> {
        match self {
            CallHandle::Promise(promise) => Some(promise),
            CallHandle::Exchange(_) => None,
        }
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallHandle::Exchange(exchange) => f.debug_tuple("Exchange").field(exchange).finish(),
            CallHandle::Promise(_) => f.write_str("Promise(..)"),
        }
    }
}

/// A callable API method bound to a dispatcher
#[derive(Clone)]
pub struct Method {
    descriptor: Arc<MethodDescriptor>,
    verb: Verb,
    template: String,
    dispatcher: Arc<Dispatcher>,
    deferred: Option<Arc<dyn DeferredFactory>>,
    auto_validate_params: bool,
}

impl Method {
    /// Bind a descriptor to a dispatcher
    pub fn new(
        descriptor: MethodDescriptor,
        dispatcher: Arc<Dispatcher>,
        deferred: Option<Arc<dyn DeferredFactory>>,
        auto_validate_params: bool,
    ) -> Result<Self> {
        let missing = || RestError::MissingTemplate {
            method: descriptor.name.clone(),
        };
        let verb = descriptor.verb().ok_or_else(missing)?;
        let template = descriptor
            .template(verb)
            .or(descriptor.get.as_ref())
            .cloned()
            .ok_or_else(missing)?;

        Ok(Method {
            descriptor: Arc::new(descriptor),
            verb,
            template,
            dispatcher,
            deferred,
            auto_validate_params,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Call the method with parameters.
    ///
    /// Keys of `params` fill the matching `<name>` placeholders; the `body`
    /// key becomes the request body. Validation failures are returned before
    /// any request is made. HTTP failures go to the error callbacks.
    pub fn invoke(&self, params: Params, on_load: Option<OnLoad>, on_error: Option<OnError>) -> Result<CallHandle> {
        self.run(Some(params), on_load, on_error)
    }

    /// Call a method that takes no parameters
    pub fn invoke_with(&self, on_load: OnLoad) -> Result<CallHandle> {
        self.run(None, Some(on_load), None)
    }

    fn run(&self, params: Option<Params>, on_load: Option<OnLoad>, on_error: Option<OnError>) -> Result<CallHandle> {
        let (mut on_load, mut on_error) = (on_load, on_error);

        let mut promise = None;
        if on_load.is_none() {
            if let Some(ref factory) = self.deferred {
                let deferred = factory.defer();
                on_load = Some(deferred.resolve);
                on_error = Some(deferred.reject);
                promise = Some(deferred.promise);
            }
        }

        let params = params.unwrap_or_default();
        let expansion = template::expand(&self.template, &params);

        if let Some(ref hook) = self.descriptor.on_load {
            let hook = hook.clone();
            let original = on_load.unwrap_or_else(ignore_load);
            on_load = Some(Arc::new(move |value: Value| hook(value, original.clone())));
        }

        if let Some(ref hook) = self.descriptor.on_error {
            let hook = hook.clone();
            let original = on_error
                .or_else(|| self.dispatcher.fallback_error_handler(on_load.as_ref()))
                .unwrap_or_else(ignore_error);
            on_error = Some(Arc::new(move |value: Value, retry: Retry| {
                hook(value, retry, original.clone())
            }));
        }

        self.validate(&params, &expansion.url)?;

        let ctx = RequestContext::new(self.verb, expansion.url)
            .with_body(expansion.body)
            .with_headers(self.descriptor.request_headers.clone())
            .with_timeout(self.descriptor.timeout)
            .with_hooks(
                self.descriptor.before_send.clone(),
                self.descriptor.before_post.clone(),
            );

        let exchange = self.dispatcher.dispatch(ctx, on_load, on_error)?;

        Ok(match promise {
            Some(promise) => CallHandle::Promise(promise),
            None => CallHandle::Exchange(exchange),
        })
    }

    /// Check declared parameters, or leftover placeholders when none are declared
    fn validate(&self, params: &Params, url: &str) -> Result<()> {
        match self.descriptor.expects {
            Some(ref expects) => {
                let scope = match (self.verb, params.get(BODY_KEY)) {
                    (Verb::Post, Some(Value::Object(body))) => body,
                    _ => params,
                };
                let missing = expects
                    .iter()
                    .find(|name| scope.get(name.as_str()).map_or(true, Value::is_null));
                if let Some(parameter) = missing {
                    return Err(RestError::MissingParameter {
                        method: self.name().to_string(),
                        parameter: parameter.clone(),
                    });
                }
            }
            None if self.auto_validate_params => {
                let placeholders = template::unresolved_placeholders(url);
                if !placeholders.is_empty() {
                    return Err(RestError::UnresolvedPlaceholders {
                        method: self.name().to_string(),
                        placeholders,
                    });
                }
            }
            None => {}
        }
        Ok(())
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.descriptor.name)
            .field("verb", &self.verb)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{body_hook, error_hook, load_hook, on_error, on_load};
    use crate::client::Config;
    use crate::deferred::ChannelDeferred;
    use crate::transport::{Transport, TransportFailure, TransportRequest, TransportResponse};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<TransportRequest>>,
        fail: bool,
    }

    impl Transport for Recording {
        fn execute(&self, request: &TransportRequest) -> std::result::Result<TransportResponse, TransportFailure> {
            self.sent.lock().push(request.clone());
            if self.fail {
                return Err(TransportFailure {
                    status: Some(500),
                    body: r#"{"error":"down"}"#.to_string(),
                    message: "HTTP error 500".to_string(),
                });
            }
            Ok(TransportResponse {
                status: 200,
                body: r#"{"id":7,"name":"Ann"}"#.to_string(),
            })
        }
    }

    fn method(descriptor: MethodDescriptor, config: Config, transport: Arc<Recording>) -> Method {
        let dispatcher = Arc::new(Dispatcher::new(&config, transport));
        Method::new(descriptor, dispatcher, config.deferred.clone(), config.auto_validate_params).unwrap()
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_verb_precedence() {
        let descriptor = MethodDescriptor::new("m", Verb::Delete, "/d").with_template(Verb::Post, "/p");
        assert_eq!(descriptor.verb(), Some(Verb::Post));
        assert_eq!(MethodDescriptor::default().verb(), None);
    }

    #[test]
    fn test_missing_template_rejected() {
        let config = Config::default();
        let dispatcher = Arc::new(Dispatcher::new(&config, Arc::new(Recording::default())));
        let err = Method::new(MethodDescriptor::default(), dispatcher, None, false).unwrap_err();
        assert!(matches!(err, RestError::MissingTemplate { .. }));
    }

    #[test]
    fn test_expands_url_and_sends() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("getUser", Verb::Get, "/users/<id>"),
            Config::new("https://api.test"),
            transport.clone(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        m.invoke(params(json!({"id": 7})), Some(on_load(move |v| sink.lock().push(v))), None)
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].verb, Verb::Get);
        assert_eq!(sent[0].url, "https://api.test/users/7");
        assert_eq!(*seen.lock(), vec![json!({"id": 7, "name": "Ann"})]);
    }

    #[test]
    fn test_invoke_with_equals_empty_params() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("list", Verb::Get, "/users"),
            Config::default(),
            transport.clone(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let b = seen.clone();

        m.invoke_with(on_load(move |v| a.lock().push(v))).unwrap();
        m.invoke(Params::new(), Some(on_load(move |v| b.lock().push(v))), None)
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].url, sent[1].url);
        assert_eq!(sent[0].body, sent[1].body);
        let seen = seen.lock();
        assert_eq!(seen[0], seen[1]);
    }

    #[test]
    fn test_get_template_selected() {
        let descriptor = MethodDescriptor {
            name: "save".to_string(),
            get: Some("/items/<id>".to_string()),
            put: None,
            ..Default::default()
        };
        let m = method(descriptor, Config::default(), Arc::new(Recording::default()));
        assert_eq!(m.verb(), Verb::Get);
        assert_eq!(m.template(), "/items/<id>");
    }

    #[test]
    fn test_expects_fails_before_sending() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("createUser", Verb::Get, "/users").with_expects(["name"]),
            Config::default(),
            transport.clone(),
        );

        let err = m.invoke(Params::new(), None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("name"));
        assert!(message.contains("createUser"));
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_expects_checks_post_body() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("createUser", Verb::Post, "/users").with_expects(["name"]),
            Config::default(),
            transport.clone(),
        );

        let err = m
            .invoke(params(json!({"name": "top-level", "body": {"age": 3}})), None, None)
            .unwrap_err();
        assert!(matches!(err, RestError::MissingParameter { ref parameter, .. } if parameter == "name"));

        m.invoke(params(json!({"body": {"name": "Ann"}})), None, None)
            .unwrap();
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn test_auto_validate_lists_placeholders() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("getPost", Verb::Get, "/users/<userId>/posts/<postId>"),
            Config::default().with_auto_validate_params(true),
            transport.clone(),
        );

        let err = m.invoke(params(json!({"userId": 1})), None, None).unwrap_err();
        match err {
            RestError::UnresolvedPlaceholders { method, placeholders } => {
                assert_eq!(method, "getPost");
                assert_eq!(placeholders, vec!["<postId>".to_string()]);
            }
            other => panic!("expected UnresolvedPlaceholders, got {:?}", other),
        }
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_placeholders_ignored_without_auto_validate() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("getPost", Verb::Get, "/posts/<postId>"),
            Config::default(),
            transport.clone(),
        );
        m.invoke(Params::new(), None, None).unwrap();
        assert_eq!(transport.sent.lock()[0].url, "/posts/<postId>");
    }

    #[test]
    fn test_on_load_hook_decorates_callback() {
        let transport = Arc::new(Recording::default());
        let descriptor = MethodDescriptor::new("getUser", Verb::Get, "/users/<id>").with_on_load(
            load_hook(|value, next| next(value["name"].clone())),
        );
        let m = method(descriptor, Config::default(), transport);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        m.invoke(params(json!({"id": 7})), Some(on_load(move |v| sink.lock().push(v))), None)
            .unwrap();
        assert_eq!(*seen.lock(), vec![json!("Ann")]);
    }

    #[test]
    fn test_on_error_hook_decorates_callback() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let descriptor = MethodDescriptor::new("getUser", Verb::Get, "/users/<id>").with_on_error(
            error_hook(|value, retry, next| next(json!({"wrapped": value}), retry)),
        );
        let m = method(descriptor, Config::default(), transport);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        m.invoke(
            params(json!({"id": 7})),
            None,
            Some(on_error(move |v, _| sink.lock().push(v))),
        )
        .unwrap();
        assert_eq!(*seen.lock(), vec![json!({"wrapped": {"error": "down"}})]);
    }

    #[test]
    fn test_error_hook_continuation_falls_back_to_on_load() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let descriptor = MethodDescriptor::new("getUser", Verb::Get, "/users")
            .with_on_error(error_hook(|value, retry, next| next(value, retry)));
        let m = method(descriptor, Config::default(), transport);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        m.invoke_with(on_load(move |v| sink.lock().push(v))).unwrap();
        assert_eq!(*seen.lock(), vec![json!({"error": "down"})]);
    }

    #[test]
    fn test_before_post_hook_only_wraps_post() {
        let wrap = body_hook(|body, proceed| proceed.send(Some(json!({"wrapped": body}))));
        let transport = Arc::new(Recording::default());
        let save = method(
            MethodDescriptor::new("save", Verb::Post, "/items").with_before_post(wrap.clone()),
            Config::new("https://api.test"),
            transport.clone(),
        );
        let replace = method(
            MethodDescriptor::new("replace", Verb::Put, "/items/<id>").with_before_post(wrap),
            Config::new("https://api.test"),
            transport.clone(),
        );

        save.invoke(params(json!({"body": {"name": "Ann"}})), None, None).unwrap();
        replace
            .invoke(params(json!({"id": 3, "body": {"name": "Bo"}})), None, None)
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].verb, Verb::Post);
        let posted: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(posted, json!({"wrapped": {"name": "Ann"}}));
        assert_eq!(sent[1].verb, Verb::Put);
        assert_eq!(sent[1].url, "https://api.test/items/3");
        let put: Value = serde_json::from_str(sent[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(put, json!({"name": "Bo"}));
    }

    #[test]
    fn test_method_headers_sent() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("getUser", Verb::Get, "/users").with_header("X-Version", "2"),
            Config::default().with_header("X-Version", "1").with_header("Accept", "*/*"),
            transport.clone(),
        );
        m.invoke(Params::new(), None, None).unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].header("x-version"), Some("2"));
        assert_eq!(sent[0].header("accept"), Some("*/*"));
    }

    #[test]
    fn test_deferred_returns_promise() {
        let transport = Arc::new(Recording::default());
        let m = method(
            MethodDescriptor::new("getUser", Verb::Get, "/users/<id>"),
            Config::default().with_deferred(Arc::new(ChannelDeferred)),
            transport,
        );

        let handle = m.invoke(params(json!({"id": 7})), None, None).unwrap();
        let value = handle.into_promise().unwrap().wait().unwrap();
        assert_eq!(value["name"], "Ann");
    }

    #[test]
    fn test_deferred_rejects_on_failure() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let m = method(
            MethodDescriptor::new("getUser", Verb::Get, "/users"),
            Config::default().with_deferred(Arc::new(ChannelDeferred)),
            transport,
        );

        let promise = m.invoke(Params::new(), None, None).unwrap().into_promise().unwrap();
        match promise.wait() {
            Err(RestError::Rejected(value)) => assert_eq!(value["error"], "down"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_callback_skips_deferred() {
        let m = method(
            MethodDescriptor::new("list", Verb::Get, "/users"),
            Config::default().with_deferred(Arc::new(ChannelDeferred)),
            Arc::new(Recording::default()),
        );
        let handle = m.invoke_with(on_load(|_| {})).unwrap();
        assert!(handle.exchange().is_some());
    }
}
