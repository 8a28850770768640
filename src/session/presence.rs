//! Presence watching over the signaling store.
//!
//! A roster watcher follows the direct children of a roster path (viewers
//! of a channel, speakers on talkback) and emits the full member list on
//! every change. A record watcher follows a single presence path and emits
//! whether it currently holds a valid record. Values that do not decode as
//! presence records are ignored where they stand.

use std::collections::HashSet;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::signaling::{
    PathChange, PresenceRecord, SignalPath, SignalingTransport, Subscription,
};
use crate::Result;

/// A running presence watch. Dropping or stopping it unsubscribes.
pub struct PresenceWatcher {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceWatcher {
    /// Watch the direct children of `roster` and emit the member id list on
    /// every membership change. Members already present at subscribe time
    /// arrive as the snapshot and are coalesced into the first emission.
    pub async fn roster(
        transport: &dyn SignalingTransport,
        roster: &SignalPath,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Vec<String>>)> {
        let sub = transport.subscribe(roster).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let roster = roster.clone();
        let task = tokio::spawn(roster_loop(sub, roster, tx));
        Ok((
            Self {
                task: Mutex::new(Some(task)),
            },
            rx,
        ))
    }

    /// Watch a single presence path and report whether a valid record is
    /// currently there.
    pub async fn record(
        transport: &dyn SignalingTransport,
        path: &SignalPath,
    ) -> Result<(Self, watch::Receiver<bool>)> {
        let sub = transport.subscribe(path).await?;
        let (tx, rx) = watch::channel(false);
        let path = path.clone();
        let task = tokio::spawn(record_loop(sub, path, tx));
        Ok((
            Self {
                task: Mutex::new(Some(task)),
            },
            rx,
        ))
    }

    /// Stop watching and wait for the subscription to be released.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for PresenceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceWatcher").finish()
    }
}

async fn roster_loop(
    mut sub: Subscription,
    roster: SignalPath,
    tx: mpsc::UnboundedSender<Vec<String>>,
) {
    let mut members: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // The subscribe-time snapshot arrives as ordinary events; coalesce
    // whatever is immediately available into the first emission.
    loop {
        let event = match sub.next().await {
            Some(event) => event,
            None => return,
        };

        let mut changed = apply_roster_event(&roster, &event.path, &event.change, &mut members, &mut seen);
        // Drain events that are already queued before emitting, so a burst
        // of roster writes becomes one reconciliation pass.
        while let Ok(event) = tokio::time::timeout(std::time::Duration::ZERO, sub.next()).await {
            match event {
                Some(event) => {
                    changed |= apply_roster_event(
                        &roster,
                        &event.path,
                        &event.change,
                        &mut members,
                        &mut seen,
                    );
                }
                None => return,
            }
        }

        if changed && tx.send(members.clone()).is_err() {
            return;
        }
    }
}

/// Fold one store event into the member list. Returns whether membership
/// changed. Events deeper than one level below the roster are ignored.
fn apply_roster_event(
    roster: &SignalPath,
    path: &SignalPath,
    change: &PathChange,
    members: &mut Vec<String>,
    seen: &mut HashSet<String>,
) -> bool {
    let Some(key) = path.child_key_of(roster) else {
        return false;
    };
    match change.value() {
        Some(value) => match PresenceRecord::from_value(value) {
            Ok(record) => {
                if seen.insert(key.to_string()) {
                    debug!("presence: {} joined roster {}", record.remote_peer_id, roster);
                    members.push(key.to_string());
                    true
                } else {
                    false
                }
            }
            Err(e) => {
                warn!("presence: invalid record at {} ignored: {}", path, e);
                false
            }
        },
        None => {
            if seen.remove(key) {
                debug!("presence: {} left roster {}", key, roster);
                members.retain(|m| m != key);
                true
            } else {
                false
            }
        }
    }
}

async fn record_loop(mut sub: Subscription, path: SignalPath, tx: watch::Sender<bool>) {
    while let Some(event) = sub.next().await {
        // Only the record itself counts; descendants of a presence path
        // (negotiation state nested under it) are not liveness.
        if event.path != path {
            continue;
        }
        let present = match event.change.value() {
            Some(value) => match PresenceRecord::from_value(value) {
                Ok(_) => true,
                Err(e) => {
                    warn!("presence: invalid record at {} ignored: {}", path, e);
                    continue;
                }
            },
            None => false,
        };
        if tx.send(present).is_err() {
            return;
        }
    }
}
