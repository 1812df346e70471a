// SPDX-License-Identifier: Apache-2.0
//! The [`Bridge`] observer surface (§4.5): `{getSnapshot, subscribe, get,
//! dispatch, dispose}`.
//!
//! Internally a bridge holds a read handle into one [`intent_host::Host`]
//! execution (by [`ExecutionKey`]) and rides the host's
//! [`tokio::sync::watch`] channel for that key to re-broadcast snapshots to
//! its own subscribers. It never applies patches itself — `dispatch` is a
//! thin forward to `Host::submit`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use intent_core::{Intent, Snapshot, Value};
use intent_host::{ExecutionKey, Host, Job};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Failures a bridge can report. Distinct from [`intent_core::ErrorCode`]
/// because `Disposed` is a bridge-layer concern, not a taxonomy entry the
/// pure core or host ever raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The bridge was disposed; no further dispatches are accepted.
    #[error("DISPOSED")]
    Disposed,
}

struct Inner {
    host: Host,
    key: ExecutionKey,
    disposed: AtomicBool,
    dispose_notify: Notify,
}

/// A read-only observer over one host execution. Cheap to clone — clones
/// share the same dispose state, so disposing any clone disposes all of
/// them.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    /// Builds a bridge over `host`'s execution at `key`. The key must
    /// already be registered with the host (via `start_execution`).
    #[must_use]
    pub fn new(host: Host, key: ExecutionKey) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                key,
                disposed: AtomicBool::new(false),
                dispose_notify: Notify::new(),
            }),
        }
    }

    /// `true` once [`Bridge::dispose`] has been called on this bridge or
    /// any of its clones.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// The current snapshot, or `None` if the bridge is disposed or the
    /// underlying execution is unknown to the host.
    #[must_use]
    pub fn get_snapshot(&self) -> Option<Snapshot> {
        if self.is_disposed() {
            return None;
        }
        self.inner.host.snapshot(&self.inner.key)
    }

    /// Replays a `get`/`computed` lookup at `path` against the current
    /// snapshot (§4.4 `core.explain`). Returns `Value::Null` once disposed,
    /// matching `getSnapshot`'s "gone" behavior rather than erroring.
    #[must_use]
    pub fn get(&self, path: &str) -> Value {
        if self.is_disposed() {
            return Value::Null;
        }
        let Some(snapshot) = self.inner.host.snapshot(&self.inner.key) else {
            return Value::Null;
        };
        let clock = intent_core::EvalClock::new(self.inner.host.now_millis(), String::new());
        intent_core::engine::explain(self.inner.host.schema(), &snapshot, path, &clock).value
    }

    /// Forwards `intent` to the wrapped host as a `StartIntent` job. Fails
    /// with [`BridgeError::Disposed`] once the bridge has been disposed;
    /// otherwise returns once the job has been enqueued (the host may still
    /// be mid-compute when this returns — subscribe or poll
    /// `get_snapshot` for the result).
    pub async fn dispatch(&self, intent: Intent) -> Result<(), BridgeError> {
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }
        self.inner
            .host
            .submit(self.inner.key.clone(), Job::StartIntent { intent })
            .await;
        Ok(())
    }

    /// Subscribes `on_snapshot` to every snapshot change from this point
    /// forward, including one immediate call with the current snapshot if
    /// the bridge is not disposed. Returns a [`Subscription`] handle;
    /// calling `unsubscribe` on it stops further calls.
    ///
    /// Disposal unsubscribes every live subscription, mirroring §4.5's
    /// "unsubscribes all downstream listeners".
    pub fn subscribe<F>(&self, mut on_snapshot: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let Some(mut rx) = self.inner.host.watch(&self.inner.key) else {
            // Unknown key: hand back a subscription over an already-finished
            // task so `unsubscribe` remains a harmless no-op.
            let handle = tokio::spawn(async {});
            return Subscription { handle };
        };
        if !self.is_disposed() {
            on_snapshot(rx.borrow().clone());
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        match changed {
                            Ok(()) => {
                                if inner.disposed.load(Ordering::Acquire) {
                                    break;
                                }
                                on_snapshot(rx.borrow().clone());
                            }
                            Err(_) => break,
                        }
                    }
                    () = inner.dispose_notify.notified() => break,
                }
            }
        });
        Subscription { handle }
    }

    /// Marks the bridge disposed: future `dispatch` calls fail with
    /// `Disposed`, `get_snapshot`/`get` return their "gone" values, and
    /// every live subscription's background task exits on its next poll.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.dispose_notify.notify_waiters();
    }
}

/// A live subscription created by [`Bridge::subscribe`]. Dropping this
/// value leaves the subscriber task running (matching a detached observer);
/// call [`Subscription::unsubscribe`] to stop it explicitly.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stops this subscription's background task immediately.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}
