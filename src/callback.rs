//! Callback and hook signatures.
//!
//! Hooks receive the value plus the callback they decorate as a continuation.
//! A hook that never calls its continuation swallows the result.

use crate::dispatch::{Proceed, Retry};
use serde_json::Value;
use std::sync::Arc;

/// Success callback, receives the parsed response body
pub type OnLoad = Arc<dyn Fn(Value) + Send + Sync>;

/// Error callback, receives the error value and a handle to re-issue the request
pub type OnError = Arc<dyn Fn(Value, Retry) + Send + Sync>;

/// Decorates a success callback
pub type LoadHook = Arc<dyn Fn(Value, OnLoad) + Send + Sync>;

/// Decorates an error callback
pub type ErrorHook = Arc<dyn Fn(Value, Retry, OnError) + Send + Sync>;

/// Runs before a request is sent; must call [`Proceed::send`] with the body to transmit
pub type BodyHook = Arc<dyn Fn(Option<Value>, Proceed) + Send + Sync>;

/// Transforms a JSON value, used by model before-hooks
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub fn on_load<F>(f: F) -> OnLoad
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn on_error<F>(f: F) -> OnError
where
    F: Fn(Value, Retry) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn load_hook<F>(f: F) -> LoadHook
where
    F: Fn(Value, OnLoad) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn error_hook<F>(f: F) -> ErrorHook
where
    F: Fn(Value, Retry, OnError) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn body_hook<F>(f: F) -> BodyHook
where
    F: Fn(Option<Value>, Proceed) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn transform<F>(f: F) -> Transform
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Success callback that discards its value
pub(crate) fn ignore_load() -> OnLoad {
    Arc::new(|_| {})
}

/// Error callback that discards its value
pub(crate) fn ignore_error() -> OnError {
    Arc::new(|_, _| {})
}
