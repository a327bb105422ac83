//! Promise-style results for callers that prefer waiting over callbacks.
//!
//! A [`DeferredFactory`] configured on the client is asked for a
//! [`Deferred`] whenever a method is invoked without a success callback. The
//! deferred's resolve/reject become the call's callbacks and its [`Promise`]
//! is handed back to the caller.

use crate::callback::{OnError, OnLoad};
use crate::error::{RestError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Creates deferreds for calls made without a success callback
pub trait DeferredFactory: Send + Sync {
    fn defer(&self) -> Deferred;
}

/// Resolve/reject callbacks paired with the promise they settle
pub struct Deferred {
    pub resolve: OnLoad,
    pub reject: OnError,
    pub promise: Promise,
}

enum Settled {
    Resolved(Value),
    Rejected(Value),
}

impl Settled {
    fn into_result(self) -> Result<Value> {
        match self {
            Settled::Resolved(value) => Ok(value),
            Settled::Rejected(value) => Err(RestError::Rejected(value)),
        }
    }
}

/// Eventual result of a call.
///
/// Settles at most once; later resolve or reject calls are ignored. The
/// blocking waits must not be called from inside an async runtime.
pub struct Promise {
    receiver: oneshot::Receiver<Settled>,
}

impl Promise {
    /// Block until the promise settles
    pub fn wait(self) -> Result<Value> {
        self.receiver
            .blocking_recv()
            .map_err(|_| RestError::Abandoned)
            .and_then(Settled::into_result)
    }

    /// Block for at most `timeout`; `None` if still pending
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<Value>> {
        let runtime = match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => return Some(Err(e.into())),
        };
        match runtime.block_on(async { tokio::time::timeout(timeout, &mut self.receiver).await }) {
            Ok(Ok(settled)) => Some(settled.into_result()),
            Ok(Err(_)) => Some(Err(RestError::Abandoned)),
            Err(_) => None,
        }
    }

    /// The result if already settled
    pub fn try_wait(&mut self) -> Option<Result<Value>> {
        match self.receiver.try_recv() {
            Ok(settled) => Some(settled.into_result()),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(RestError::Abandoned)),
        }
    }
}

/// Deferreds backed by a oneshot channel
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelDeferred;

impl DeferredFactory for ChannelDeferred {
    fn defer(&self) -> Deferred {
        let (sender, receiver) = oneshot::channel();
        // resolve and reject share the one sender; whichever runs first consumes it
        let sender = Arc::new(Mutex::new(Some(sender)));

        let resolving = sender.clone();
        let resolve: OnLoad = Arc::new(move |value| {
            if let Some(tx) = resolving.lock().take() {
                let _ = tx.send(Settled::Resolved(value));
            }
        });

        let reject: OnError = Arc::new(move |value, _retry| {
            if let Some(tx) = sender.lock().take() {
                let _ = tx.send(Settled::Rejected(value));
            }
        });

        Deferred {
            resolve,
            reject,
            promise: Promise { receiver },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve() {
        let deferred = ChannelDeferred.defer();
        (deferred.resolve)(json!({"id": 1}));
        assert_eq!(deferred.promise.wait().unwrap(), json!({"id": 1}));
    }

    #[test]
    fn test_settles_once() {
        let mut deferred = ChannelDeferred.defer();
        (deferred.resolve)(json!(1));
        (deferred.resolve)(json!(2));
        assert_eq!(deferred.promise.try_wait().unwrap().unwrap(), json!(1));
    }

    #[test]
    fn test_pending_then_abandoned() {
        let Deferred {
            resolve,
            reject,
            mut promise,
        } = ChannelDeferred.defer();
        assert!(promise.try_wait().is_none());
        assert!(promise.wait_timeout(Duration::from_millis(5)).is_none());

        drop(resolve);
        drop(reject);
        assert!(matches!(promise.wait(), Err(RestError::Abandoned)));
    }

    #[test]
    fn test_wait_timeout_sees_late_resolve() {
        let Deferred {
            resolve,
            mut promise,
            ..
        } = ChannelDeferred.defer();
        let worker = std::thread::spawn(move || resolve(json!("late")));

        let settled = promise.wait_timeout(Duration::from_secs(5));
        worker.join().unwrap();
        assert_eq!(settled.unwrap().unwrap(), json!("late"));
    }
}
