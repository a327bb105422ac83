//! # reste - declarative REST clients for Rust
//!
//! Describe an API once (base URL, headers and a list of named methods, each
//! with a verb and a URL template) and call its methods by name. Responses
//! and errors are routed through layered callbacks with retry support.
//!
//! ## Features
//!
//! - URL templates with `<name>` placeholders filled from call parameters
//! - Required-parameter checks before any request is made
//! - Global and per-method headers, with values computed at send time
//! - JSON or form-encoded bodies, lenient JSON response parsing
//! - Per-method and global hooks for responses, errors and outgoing bodies
//! - `retry()` handles for error callbacks
//! - Optional promises for calls made without a success callback
//! - A sync adapter mapping model CRUD operations onto configured methods
//!
//! ## Basic Usage
//!
//! ```no_run
//! use reste::{callback, json, Config, MethodDescriptor, Reste, Verb};
//!
//! fn main() -> Result<(), reste::RestError> {
//!     let config = Config::new("https://api.test")
//!         .with_header("Accept", "application/json")
//!         .with_method(MethodDescriptor::new("getUser", Verb::Get, "/users/<id>").with_expects(["id"]));
//!
//!     let api = Reste::new(config)?;
//!
//!     let params = json!({"id": 7}).as_object().cloned().unwrap_or_default();
//!     api.call(
//!         "getUser",
//!         params,
//!         Some(callback::on_load(|user| println!("user: {user}"))),
//!         Some(callback::on_error(|error, _retry| eprintln!("failed: {error}"))),
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Loading a configuration
//!
//! ```no_run
//! use reste::{Config, Reste};
//!
//! let config = Config::from_json(r#"{
//!     "url": "https://api.test",
//!     "timeout": 5000,
//!     "methods": [{"name": "listUsers", "get": "/users"}]
//! }"#)?;
//!
//! let api = Reste::new(config)?;
//! # Ok::<(), reste::RestError>(())
//! ```
//!
//! ## Promises
//!
//! ```no_run
//! use reste::{ChannelDeferred, Config, MethodDescriptor, Params, Reste, Verb};
//! use std::sync::Arc;
//!
//! let config = Config::new("https://api.test")
//!     .with_deferred(Arc::new(ChannelDeferred))
//!     .with_method(MethodDescriptor::new("listUsers", Verb::Get, "/users"));
//!
//! let api = Reste::new(config)?;
//! if let Some(promise) = api.call("listUsers", Params::new(), None, None)?.into_promise() {
//!     let users = promise.wait()?;
//!     println!("{users}");
//! }
//! # Ok::<(), reste::RestError>(())
//! ```

pub mod callback;
pub mod client;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod method;
pub mod model;
pub mod response;
pub mod rest;
pub mod template;
pub mod transport;

// Re-export main types for convenience
pub use callback::{BodyHook, ErrorHook, LoadHook, OnError, OnLoad, Transform};
pub use client::Config;
pub use deferred::{ChannelDeferred, Deferred, DeferredFactory, Promise};
pub use dispatch::{Exchange, Outcome, Proceed, Retry};
pub use error::{RestError, Result};
pub use headers::{BodyEncoding, HeaderRegistry, HeaderValue};
pub use method::{CallHandle, Method, MethodDescriptor, Verb};
pub use model::{
    Collection, CollectionDescriptor, Model, ModelDescriptor, ModelSync, SyncAdapter, SyncMethod, SyncOptions,
};
pub use response::Params;
pub use rest::Reste;
pub use transport::{ReqwestTransport, Transport, TransportFailure, TransportRequest, TransportResponse};

// Re-export serde_json for convenience
pub use serde_json::json;
