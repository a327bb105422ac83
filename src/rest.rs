use crate::callback::{OnError, OnLoad};
use crate::client::Config;
use crate::dispatch::Dispatcher;
use crate::error::{RestError, Result};
use crate::headers::HeaderValue;
use crate::method::{CallHandle, Method, MethodDescriptor};
use crate::model::{Collection, Model, ModelDescriptor, ModelSync};
use crate::response::Params;
use crate::transport::{ReqwestTransport, Transport};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_ID: &str = "id";

/// A configured REST client: the table of named methods plus the models bound to them
pub struct Reste {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    methods: IndexMap<String, Method>,
    models: IndexMap<String, Arc<ModelDescriptor>>,
    collections: IndexMap<String, Collection>,
}

impl Reste {
    /// Create a client sending requests through reqwest
    pub fn new(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client on top of a custom transport.
    ///
    /// Methods from the configuration are registered before its models so
    /// that models can refer to them.
    pub fn with_transport(mut config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let methods = std::mem::take(&mut config.methods);
        let models = std::mem::take(&mut config.models);

        let mut reste = Reste {
            dispatcher: Arc::new(Dispatcher::new(&config, transport)),
            config,
            methods: IndexMap::new(),
            models: IndexMap::new(),
            collections: IndexMap::new(),
        };

        for descriptor in methods.iter().cloned() {
            reste.add_method(descriptor)?;
        }
        for descriptor in models.iter().cloned() {
            reste.add_model(descriptor)?;
        }

        reste.config.methods = methods;
        reste.config.models = models;
        Ok(reste)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a method; names must be unique
    pub fn add_method(&mut self, descriptor: MethodDescriptor) -> Result<&Method> {
        if self.methods.contains_key(&descriptor.name) {
            return Err(RestError::DuplicateMethod {
                name: descriptor.name,
            });
        }

        let method = Method::new(
            descriptor,
            self.dispatcher.clone(),
            self.config.deferred.clone(),
            self.config.auto_validate_params,
        )?;
        if self.config.debug {
            debug!(method = %method.name(), verb = %method.verb(), template = %method.template(), "method registered");
        }

        let entry = self.methods.entry(method.name().to_string());
        Ok(entry.or_insert(method))
    }

    pub fn method(&self, name: &str) -> Result<&Method> {
        self.methods
            .get(name)
            .ok_or_else(|| RestError::UnknownMethod {
                name: name.to_string(),
            })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Names of all methods in registration order
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Look a method up by name and invoke it
    pub fn call(
        &self,
        name: &str,
        params: Params,
        on_load: Option<OnLoad>,
        on_error: Option<OnError>,
    ) -> Result<CallHandle> {
        self.method(name)?.invoke(params, on_load, on_error)
    }

    /// Invoke a method without parameters
    pub fn call_with(&self, name: &str, on_load: OnLoad) -> Result<CallHandle> {
        self.method(name)?.invoke_with(on_load)
    }

    /// Replace all global headers
    pub fn set_request_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        self.dispatcher.headers().write().set_all(headers);
    }

    /// Add a global header or replace its value in place
    pub fn change_request_header(&self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.dispatcher.headers().write().upsert(name, value);
    }

    pub fn remove_request_header(&self, name: &str) {
        self.dispatcher.headers().write().remove(name);
    }

    /// Global headers with computed values resolved now
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let headers = self.dispatcher.headers().read().clone();
        headers.resolve()
    }

    /// Drop the transport's cookies for the base URL.
    ///
    /// The default transport keeps a single jar and empties it entirely.
    pub fn clear_cookies(&self) {
        let url = self.dispatcher.base_url().unwrap_or_default();
        self.dispatcher.transport().clear_cookies(url);
    }

    /// Register a model; every method it names must already exist
    pub fn add_model(&mut self, descriptor: ModelDescriptor) -> Result<()> {
        if self.models.contains_key(&descriptor.name) {
            return Err(RestError::DuplicateModel {
                name: descriptor.name,
            });
        }
        if let Some(name) = descriptor.method_names().find(|name| !self.has_method(name)) {
            return Err(RestError::UnknownMethod {
                name: name.to_string(),
            });
        }

        for collection in &descriptor.collections {
            self.collections.insert(
                collection.name.clone(),
                Collection::new(
                    collection.name.clone(),
                    Some(descriptor.name.clone()),
                    descriptor.id.clone(),
                ),
            );
        }
        if self.config.debug {
            debug!(model = %descriptor.name, collections = descriptor.collections.len(), "model registered");
        }

        self.models
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn model_descriptor(&self, name: &str) -> Result<&ModelDescriptor> {
        self.models
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| RestError::UnknownModel {
                name: name.to_string(),
            })
    }

    /// Create a model instance of type `name`
    pub fn create_model(&self, name: &str, attributes: Params) -> Model {
        let id_attribute = self
            .models
            .get(name)
            .map_or(DEFAULT_ID, |descriptor| descriptor.id.as_str());
        Model::new(name, id_attribute, attributes)
    }

    /// Create or reset a collection from an array of items
    pub fn create_collection(&mut self, name: &str, content: Value) -> Result<Collection> {
        let Value::Array(items) = content else {
            return Err(RestError::NotAnArray {
                name: name.to_string(),
            });
        };

        let collection = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name, None, DEFAULT_ID))
            .clone();
        collection.reset(items);
        Ok(collection)
    }

    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| RestError::UnknownCollection {
                name: name.to_string(),
            })
    }

    /// Sync adapter driving the registered models
    pub fn sync(&self) -> ModelSync<'_> {
        ModelSync::new(self)
    }
}

impl fmt::Debug for Reste {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reste")
            .field("base_url", &self.config.base_url)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish()
    }
}
