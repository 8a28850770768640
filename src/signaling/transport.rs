//! Signaling transport abstraction
//!
//! A shared, subscribable key/value store used purely to exchange
//! negotiation messages; no media ever flows through it. Implementations
//! front whatever store-and-notify service the deployment uses; the crate
//! ships [`InMemorySignaling`](crate::signaling::InMemorySignaling) for
//! tests and local development.

use crate::signaling::path::SignalPath;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// A change observed at a subscribed path
#[derive(Debug, Clone)]
pub struct PathEvent {
    /// The exact path that changed
    pub path: SignalPath,
    /// What happened there
    pub change: PathChange,
}

/// What happened at a path
#[derive(Debug, Clone)]
pub enum PathChange {
    /// A value appeared where none existed
    Added(serde_json::Value),
    /// An existing value was overwritten
    Changed(serde_json::Value),
    /// The value was removed
    Removed,
}

impl PathChange {
    /// The current value, if the change carries one
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            PathChange::Added(v) | PathChange::Changed(v) => Some(v),
            PathChange::Removed => None,
        }
    }
}

/// Live subscription to a path subtree
///
/// Events are delivered for the subscribed path and every descendant. The
/// subscription starts with an immediate snapshot: one `Added` event per
/// existing value under the path, in insertion order. The unsubscribe side
/// effect runs exactly once, on [`unsubscribe`](Self::unsubscribe) or drop.
pub struct Subscription {
    path: SignalPath,
    rx: mpsc::UnboundedReceiver<PathEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Assemble a subscription from its receiving half and cancel action
    pub fn new(
        path: SignalPath,
        rx: mpsc::UnboundedReceiver<PathEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// The subscribed path
    pub fn path(&self) -> &SignalPath {
        &self.path
    }

    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn next(&mut self) -> Option<PathEvent> {
        self.rx.recv().await
    }

    /// Stop receiving events; idempotent
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path.to_string())
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The store-and-notify channel carrying negotiation state
///
/// Side effects are visible to all subscribers of the same path, including
/// the writer. Write and remove may fail transiently; callers decide per
/// call whether a failure is critical (presence, offer, answer: abort and
/// retry via the replacement delay) or best-effort (candidate echo: log
/// and swallow).
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Set the value at a path, creating it if absent
    async fn write(&self, path: &SignalPath, value: serde_json::Value) -> Result<()>;

    /// Append a child with a generated, ordered key; returns the child path
    ///
    /// Used for candidate lists: children are never overwritten, only
    /// appended and eventually removed wholesale on teardown.
    async fn push(&self, path: &SignalPath, value: serde_json::Value) -> Result<SignalPath>;

    /// Remove the value at a path and everything beneath it
    async fn remove(&self, path: &SignalPath) -> Result<()>;

    /// Observe a path subtree
    async fn subscribe(&self, path: &SignalPath) -> Result<Subscription>;

    /// Register server-side removal of `path` if this writer's connection
    /// drops
    ///
    /// Must be registered immediately after establishing presence, before
    /// any negotiation message is sent, so an abrupt network loss cannot
    /// leave stale presence behind.
    async fn remove_on_disconnect(&self, path: &SignalPath) -> Result<()>;
}
