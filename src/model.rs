//! Model synchronization.
//!
//! Maps create/read/update/delete on observable models, and reads on
//! collections, onto methods already registered on a [`Reste`] client. The
//! adapter never starts calls on its own: a model framework drives it through
//! the [`SyncAdapter`] trait.

use crate::callback::{OnError, OnLoad, Transform};
use crate::dispatch::Retry;
use crate::error::{RestError, Result};
use crate::method::CallHandle;
use crate::response::{lookup, status_code, Params};
use crate::rest::Reste;
use crate::template::BODY_KEY;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Application status codes above this are treated as failures
pub const SUCCESS_CODE_THRESHOLD: i64 = 200;

/// Emitted by a collection after its content was replaced
pub const EVENT_RESET: &str = "reset";
/// Emitted by a collection after a sync completed
pub const EVENT_SYNC: &str = "sync";

const DEFAULT_ID: &str = "id";

/// A named collection and the method that lists it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectionDescriptor {
    pub name: String,
    /// Method listing the collection
    pub read: String,
    /// Field (or slash path) holding the item array in the response
    pub content: Option<String>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, read: impl Into<String>) -> Self {
        CollectionDescriptor {
            name: name.into(),
            read: read.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// How one model type maps onto API methods
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    /// Attribute holding the server-side identifier
    pub id: String,
    /// Field (or slash path) wrapping the payload of read responses
    pub content: Option<String>,
    pub read: Option<String>,
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
    pub collections: Vec<CollectionDescriptor>,
    #[serde(skip)]
    pub before_create: Option<Transform>,
    #[serde(skip)]
    pub before_update: Option<Transform>,
    #[serde(skip)]
    pub before_delete: Option<Transform>,
}

impl Default for ModelDescriptor {
    fn default() -> Self {
        ModelDescriptor {
            name: String::new(),
            id: DEFAULT_ID.to_string(),
            content: None,
            read: None,
            create: None,
            update: None,
            delete: None,
            collections: Vec::new(),
            before_create: None,
            before_update: None,
            before_delete: None,
        }
    }
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDescriptor {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_read(mut self, method: impl Into<String>) -> Self {
        self.read = Some(method.into());
        self
    }

    pub fn with_create(mut self, method: impl Into<String>) -> Self {
        self.create = Some(method.into());
        self
    }

    pub fn with_update(mut self, method: impl Into<String>) -> Self {
        self.update = Some(method.into());
        self
    }

    pub fn with_delete(mut self, method: impl Into<String>) -> Self {
        self.delete = Some(method.into());
        self
    }

    pub fn with_collection(mut self, collection: CollectionDescriptor) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn with_before_create(mut self, hook: Transform) -> Self {
        self.before_create = Some(hook);
        self
    }

    pub fn with_before_update(mut self, hook: Transform) -> Self {
        self.before_update = Some(hook);
        self
    }

    pub fn with_before_delete(mut self, hook: Transform) -> Self {
        self.before_delete = Some(hook);
        self
    }

    /// Every method name this model refers to
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        [&self.read, &self.create, &self.update, &self.delete]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(self.collections.iter().map(|c| c.read.as_str()))
    }

    fn method_for(&self, operation: SyncMethod) -> Result<&str> {
        let method = match operation {
            SyncMethod::Create => &self.create,
            SyncMethod::Read => &self.read,
            SyncMethod::Update => &self.update,
            SyncMethod::Delete => &self.delete,
        };
        method.as_deref().ok_or_else(|| RestError::UnsupportedSync {
            model: self.name.clone(),
            operation: operation.to_string(),
        })
    }

    /// Model attributes without the identifier fields
    fn payload(&self, model: &Model) -> Params {
        let mut attributes = model.attributes();
        attributes.remove(DEFAULT_ID);
        attributes.remove(&self.id);
        attributes
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("content", &self.content)
            .field("read", &self.read)
            .field("create", &self.create)
            .field("update", &self.update)
            .field("delete", &self.delete)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

struct ModelState {
    kind: String,
    id_attribute: String,
    attributes: Params,
}

/// Shared handle to a model's attributes
#[derive(Clone)]
pub struct Model {
    inner: Arc<RwLock<ModelState>>,
}

impl Model {
    pub fn new(kind: impl Into<String>, id_attribute: impl Into<String>, attributes: Params) -> Self {
        Model {
            inner: Arc::new(RwLock::new(ModelState {
                kind: kind.into(),
                id_attribute: id_attribute.into(),
                attributes,
            })),
        }
    }

    /// Name of the model type this instance belongs to
    pub fn kind(&self) -> String {
        self.inner.read().kind.clone()
    }

    pub fn id_attribute(&self) -> String {
        self.inner.read().id_attribute.clone()
    }

    /// Server-side identifier, if the model has been saved
    pub fn id(&self) -> Option<Value> {
        let state = self.inner.read();
        state
            .attributes
            .get(&state.id_attribute)
            .filter(|id| !id.is_null())
            .cloned()
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().attributes.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().attributes.insert(key.into(), value);
    }

    pub fn attributes(&self) -> Params {
        self.inner.read().attributes.clone()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read();
        f.debug_struct("Model")
            .field("kind", &state.kind)
            .field("attributes", &state.attributes)
            .finish()
    }
}

/// Collection event listener, receives the event name
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

struct CollectionState {
    name: String,
    kind: Option<String>,
    id_attribute: String,
    models: Vec<Model>,
    listeners: Vec<Listener>,
}

/// Shared handle to an ordered set of models
#[derive(Clone)]
pub struct Collection {
    inner: Arc<RwLock<CollectionState>>,
}

impl Collection {
    /// Create a collection; `kind` names the model type its items belong to
    pub fn new(name: impl Into<String>, kind: Option<String>, id_attribute: impl Into<String>) -> Self {
        Collection {
            inner: Arc::new(RwLock::new(CollectionState {
                name: name.into(),
                kind,
                id_attribute: id_attribute.into(),
                models: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn kind(&self) -> Option<String> {
        self.inner.read().kind.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().models.is_empty()
    }

    pub fn models(&self) -> Vec<Model> {
        self.inner.read().models.clone()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.models().iter().map(Model::to_json).collect())
    }

    /// Replace the content with models built from `items`
    pub fn reset(&self, items: Vec<Value>) {
        {
            let mut state = self.inner.write();
            let kind = state.kind.clone().unwrap_or_else(|| state.name.clone());
            let id_attribute = state.id_attribute.clone();
            state.models = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(attributes) => attributes,
                    _ => Params::new(),
                })
                .map(|attributes| Model::new(kind.clone(), id_attribute.clone(), attributes))
                .collect();
        }
        self.trigger(EVENT_RESET);
    }

    pub fn on(&self, listener: Listener) {
        self.inner.write().listeners.push(listener);
    }

    /// Notify listeners of `event`
    pub fn trigger(&self, event: &str) {
        let listeners = self.inner.read().listeners.clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read();
        f.debug_struct("Collection")
            .field("name", &state.name)
            .field("kind", &state.kind)
            .field("models", &state.models)
            .finish_non_exhaustive()
    }
}

/// The four operations a model framework asks to synchronize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMethod::Create => "create",
            SyncMethod::Read => "read",
            SyncMethod::Update => "update",
            SyncMethod::Delete => "delete",
        })
    }
}

/// Callbacks and extras for one sync
#[derive(Clone)]
pub struct SyncOptions {
    /// Extra call parameters, merged under the generated ones
    pub params: Params,
    /// Changed attributes; when set, updates send only these
    pub changes: Option<Params>,
    pub success: OnLoad,
    pub error: Option<OnLoad>,
}

impl SyncOptions {
    pub fn new(success: OnLoad) -> Self {
        SyncOptions {
            params: Params::new(),
            changes: None,
            success,
            error: None,
        }
    }

    pub fn with_error(mut self, error: OnLoad) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_changes(mut self, changes: Params) -> Self {
        self.changes = Some(changes);
        self
    }

    fn error_handler(&self) -> Option<OnError> {
        self.error.clone().map(|error| {
            Arc::new(move |value: Value, _retry: Retry| error(value)) as OnError
        })
    }
}

/// Synchronization contract consumed by a model framework
pub trait SyncAdapter {
    fn sync(&self, method: SyncMethod, model: &Model, options: SyncOptions) -> Result<CallHandle>;

    fn sync_collection(&self, collection: &Collection, options: SyncOptions) -> Result<CallHandle>;
}

/// [`SyncAdapter`] backed by the methods registered on a client
pub struct ModelSync<'a> {
    reste: &'a Reste,
}

impl<'a> ModelSync<'a> {
    pub fn new(reste: &'a Reste) -> Self {
        ModelSync { reste }
    }

    fn create(&self, descriptor: &ModelDescriptor, model: &Model, options: SyncOptions) -> Result<CallHandle> {
        let method = descriptor.method_for(SyncMethod::Create)?;
        let payload = apply(&descriptor.before_create, Value::Object(descriptor.payload(model)));

        let mut params = options.params.clone();
        params.insert(BODY_KEY.to_string(), payload);

        let id_field = descriptor.id.clone();
        let target = model.clone();
        let success = options.success.clone();
        let on_load: OnLoad = Arc::new(move |mut value: Value| {
            if let Value::Object(ref mut response) = value {
                if let Some(id) = response.get(&id_field).cloned() {
                    response.insert(DEFAULT_ID.to_string(), id.clone());
                    target.set(id_field.clone(), id);
                }
            }
            success(value)
        });

        self.reste
            .call(method, params, Some(on_load), options.error_handler())
    }

    fn read(&self, descriptor: &ModelDescriptor, model: &Model, options: SyncOptions) -> Result<CallHandle> {
        let method = descriptor.method_for(SyncMethod::Read)?;

        let mut params = options.params.clone();
        if let Some(id) = model.id() {
            params.insert(descriptor.id.clone(), id);
        }

        let content = descriptor.content.clone();
        let success = options.success.clone();
        let on_load: OnLoad = Arc::new(move |value: Value| {
            let unwrapped = content
                .as_deref()
                .and_then(|field| lookup(&value, field))
                .cloned();
            match unwrapped {
                Some(Value::Array(mut results)) if results.len() == 1 => success(results.remove(0)),
                Some(results) => success(results),
                None => success(value),
            }
        });

        self.reste
            .call(method, params, Some(on_load), options.error_handler())
    }

    fn update(&self, descriptor: &ModelDescriptor, model: &Model, options: SyncOptions) -> Result<CallHandle> {
        let method = descriptor.method_for(SyncMethod::Update)?;
        let attributes = match options.changes {
            Some(ref changes) => changes.clone(),
            None => descriptor.payload(model),
        };
        let payload = apply(&descriptor.before_update, Value::Object(attributes));

        let mut params = options.params.clone();
        if let Some(id) = model.id() {
            params.insert(descriptor.id.clone(), id);
        }
        params.insert(BODY_KEY.to_string(), payload);

        let on_load = by_status(options.success.clone(), options.error.clone());
        self.reste
            .call(method, params, Some(on_load), options.error_handler())
    }

    fn delete(&self, descriptor: &ModelDescriptor, model: &Model, options: SyncOptions) -> Result<CallHandle> {
        let method = descriptor.method_for(SyncMethod::Delete)?;
        let payload = apply(&descriptor.before_delete, model.to_json());

        let mut params = options.params.clone();
        if let Some(id) = model.id() {
            params.insert(descriptor.id.clone(), id);
        }
        params.insert(BODY_KEY.to_string(), payload);

        let on_load = by_status(options.success.clone(), options.error.clone());
        self.reste
            .call(method, params, Some(on_load), options.error_handler())
    }
}

impl SyncAdapter for ModelSync<'_> {
    fn sync(&self, method: SyncMethod, model: &Model, options: SyncOptions) -> Result<CallHandle> {
        let descriptor = self.reste.model_descriptor(&model.kind())?;

        // saving a model that already has an id is an update
        let method = match method {
            SyncMethod::Create if !model.is_new() => SyncMethod::Update,
            other => other,
        };
        if self.reste.config().debug {
            debug!(model = %descriptor.name, operation = %method, "sync");
        }

        match method {
            SyncMethod::Create => self.create(descriptor, model, options),
            SyncMethod::Read => self.read(descriptor, model, options),
            SyncMethod::Update => self.update(descriptor, model, options),
            SyncMethod::Delete => self.delete(descriptor, model, options),
        }
    }

    fn sync_collection(&self, collection: &Collection, options: SyncOptions) -> Result<CallHandle> {
        let name = collection.name();
        let kind = collection
            .kind()
            .ok_or_else(|| RestError::UnknownCollection { name: name.clone() })?;
        let descriptor = self.reste.model_descriptor(&kind)?;
        let config = descriptor
            .collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RestError::UnknownCollection { name: name.clone() })?;
        if self.reste.config().debug {
            debug!(collection = %name, model = %kind, "sync collection");
        }

        let id_field = descriptor.id.clone();
        let content = config.content.clone();
        let target = collection.clone();
        let success = options.success.clone();
        let on_load: OnLoad = Arc::new(move |value: Value| {
            let items = content
                .as_deref()
                .and_then(|field| lookup(&value, field))
                .unwrap_or(&value)
                .clone();

            match items {
                Value::Array(items) => {
                    let items: Vec<Value> = items
                        .into_iter()
                        .map(|mut item| {
                            if let Value::Object(ref mut attributes) = item {
                                if let Some(id) = attributes.get(&id_field).cloned() {
                                    attributes.insert(DEFAULT_ID.to_string(), id);
                                }
                            }
                            item
                        })
                        .collect();
                    target.reset(items.clone());
                    success(Value::Array(items));
                }
                other => success(other),
            }
            target.trigger(EVENT_SYNC);
        });

        self.reste
            .call(&config.read, options.params.clone(), Some(on_load), options.error_handler())
    }
}

fn apply(hook: &Option<Transform>, value: Value) -> Value {
    match hook {
        Some(hook) => hook(value),
        None => value,
    }
}

/// Route a response by its application status code
fn by_status(success: OnLoad, error: Option<OnLoad>) -> OnLoad {
    Arc::new(move |value: Value| match status_code(&value) {
        Some(code) if code > SUCCESS_CODE_THRESHOLD => {
            if let Some(ref error) = error {
                error(value)
            }
        }
        _ => success(value),
    })
}
