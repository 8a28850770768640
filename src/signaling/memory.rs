//! In-memory signaling store for tests and local development
//!
//! Implements the full [`SignalingTransport`] contract in process: an
//! insertion-ordered value tree, subtree subscriptions with an immediate
//! snapshot, ordered push keys, and disconnect marks that can be tripped
//! to simulate an abrupt network loss.

use crate::signaling::path::SignalPath;
use crate::signaling::transport::{PathChange, PathEvent, SignalingTransport, Subscription};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct Node {
    value: Option<serde_json::Value>,
    children: Vec<(String, Node)>,
}

impl Node {
    fn get(&self, segments: &[String]) -> Option<&Node> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .children
                .iter()
                .find(|(key, _)| key == head)
                .and_then(|(_, child)| child.get(rest)),
        }
    }

    fn get_or_create(&mut self, segments: &[String]) -> &mut Node {
        match segments.split_first() {
            None => self,
            Some((head, rest)) => {
                if !self.children.iter().any(|(key, _)| key == head) {
                    self.children.push((head.clone(), Node::default()));
                }
                let child = self
                    .children
                    .iter_mut()
                    .find(|(key, _)| key == head)
                    .map(|(_, child)| child)
                    .unwrap();
                child.get_or_create(rest)
            }
        }
    }

    fn remove(&mut self, segments: &[String]) -> Option<Node> {
        match segments.split_first() {
            None => None,
            Some((head, rest)) if rest.is_empty() => {
                let idx = self.children.iter().position(|(key, _)| key == head)?;
                Some(self.children.remove(idx).1)
            }
            Some((head, rest)) => self
                .children
                .iter_mut()
                .find(|(key, _)| key == head)
                .and_then(|(_, child)| child.remove(rest)),
        }
    }

    /// Collect every value at or below this node, depth-first in insertion
    /// order, tagged with its full path
    fn collect_values(&self, base: &SignalPath, out: &mut Vec<(SignalPath, serde_json::Value)>) {
        if let Some(value) = &self.value {
            out.push((base.clone(), value.clone()));
        }
        for (key, child) in &self.children {
            child.collect_values(&base.child(key), out);
        }
    }
}

struct SubEntry {
    id: u64,
    path: SignalPath,
    tx: mpsc::UnboundedSender<PathEvent>,
}

#[derive(Default)]
struct StoreInner {
    root: Node,
    subs: Vec<SubEntry>,
    disconnect_paths: Vec<SignalPath>,
    next_sub_id: u64,
    push_seq: u64,
    injected_failures: u32,
}

impl StoreInner {
    fn emit(&mut self, path: &SignalPath, change: PathChange) {
        self.subs.retain(|sub| {
            if path.starts_with(&sub.path) {
                sub.tx
                    .send(PathEvent {
                        path: path.clone(),
                        change: change.clone(),
                    })
                    .is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
    }

    fn check_injected_failure(&mut self) -> Result<()> {
        if self.injected_failures > 0 {
            self.injected_failures -= 1;
            return Err(Error::SignalingError("injected write failure".to_string()));
        }
        Ok(())
    }

    fn write_value(&mut self, path: &SignalPath, value: serde_json::Value) {
        let node = self.root.get_or_create(path.segments());
        let change = if node.value.is_none() {
            PathChange::Added(value.clone())
        } else {
            PathChange::Changed(value.clone())
        };
        node.value = Some(value);
        self.emit(path, change);
    }

    fn remove_subtree(&mut self, path: &SignalPath) {
        let Some(node) = self.root.remove(path.segments()) else {
            return;
        };
        let mut removed = Vec::new();
        node.collect_values(path, &mut removed);
        for (value_path, _) in removed {
            self.emit(&value_path, PathChange::Removed);
        }
    }
}

/// In-process [`SignalingTransport`] implementation
///
/// # Example
///
/// ```
/// use proctorcast::signaling::{InMemorySignaling, SignalPath, SignalingTransport};
///
/// # tokio_test::block_on(async {
/// let store = InMemorySignaling::new();
/// let path = SignalPath::parse("channel/exam-1").unwrap();
/// store.write(&path, serde_json::json!({"connected": true})).await.unwrap();
/// assert!(store.read(&path).is_some());
/// # });
/// ```
#[derive(Default)]
pub struct InMemorySignaling {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemorySignaling {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value at a path, if any
    pub fn read(&self, path: &SignalPath) -> Option<serde_json::Value> {
        self.inner
            .lock()
            .root
            .get(path.segments())
            .and_then(|node| node.value.clone())
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subs.retain(|sub| !sub.tx.is_closed());
        inner.subs.len()
    }

    /// Number of registered disconnect marks
    pub fn disconnect_mark_count(&self) -> usize {
        self.inner.lock().disconnect_paths.len()
    }

    /// Simulate this client's connection dropping: every path registered
    /// via `remove_on_disconnect` is removed, with events
    pub fn trip_disconnect(&self) {
        let mut inner = self.inner.lock();
        let paths = std::mem::take(&mut inner.disconnect_paths);
        debug!("tripping disconnect, removing {} marked paths", paths.len());
        for path in paths {
            inner.remove_subtree(&path);
        }
    }

    /// Make the next `n` write/push calls fail with a transient error
    pub fn inject_write_failures(&self, n: u32) {
        self.inner.lock().injected_failures = n;
    }
}

#[async_trait]
impl SignalingTransport for InMemorySignaling {
    async fn write(&self, path: &SignalPath, value: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_injected_failure()?;
        debug!("signaling write at {}", path);
        inner.write_value(path, value);
        Ok(())
    }

    async fn push(&self, path: &SignalPath, value: serde_json::Value) -> Result<SignalPath> {
        let mut inner = self.inner.lock();
        inner.check_injected_failure()?;
        inner.push_seq += 1;
        let child = path.child(&format!("c{:010}", inner.push_seq));
        debug!("signaling push at {}", child);
        inner.write_value(&child, value);
        Ok(child)
    }

    async fn remove(&self, path: &SignalPath) -> Result<()> {
        let mut inner = self.inner.lock();
        debug!("signaling remove at {}", path);
        inner.remove_subtree(path);
        Ok(())
    }

    async fn subscribe(&self, path: &SignalPath) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id;
        {
            let mut inner = self.inner.lock();
            inner.next_sub_id += 1;
            id = inner.next_sub_id;

            // Snapshot of existing values, delivered only to this subscriber
            if let Some(node) = inner.root.get(path.segments()) {
                let mut existing = Vec::new();
                node.collect_values(path, &mut existing);
                for (value_path, value) in existing {
                    let _ = tx.send(PathEvent {
                        path: value_path,
                        change: PathChange::Added(value),
                    });
                }
            }

            inner.subs.push(SubEntry {
                id,
                path: path.clone(),
                tx,
            });
        }

        let store = Arc::clone(&self.inner);
        Ok(Subscription::new(path.clone(), rx, move || {
            store.lock().subs.retain(|sub| sub.id != id);
        }))
    }

    async fn remove_on_disconnect(&self, path: &SignalPath) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.disconnect_paths.contains(path) {
            inner.disconnect_paths.push(path.clone());
        }
        Ok(())
    }
}
