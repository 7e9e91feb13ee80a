// Viewer session registry and broadcast fan-out.
//
// The hub owns the only list of live viewer sessions. Each session is a
// per-connection unbounded queue: the sending half lives in the registry,
// the receiving half is owned by that session's WebSocket task. Broadcasting
// pushes a frame onto every queue; a push failing means the session's task
// has dropped its receiver, so the session is removed. Per-session queues
// also give the ordering guarantee: two sequential broadcasts are observed
// in order by every session connected for both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type SessionId = u64;

pub struct BroadcastHub {
    sessions: Mutex<HashMap<SessionId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        BroadcastHub {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new viewer session. Returns its id and the receiving half
    /// of the session's frame queue; the caller's connection task owns the
    /// receiver and must call [`disconnect`](Self::disconnect) when done.
    pub fn connect(&self) -> (SessionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().insert(id, tx);
        info!("viewer session {id} connected");
        (id, rx)
    }

    /// Remove a session from the registry. Idempotent: removing an unknown
    /// or already-removed session is a no-op.
    pub fn disconnect(&self, id: SessionId) {
        if self.sessions.lock().remove(&id).is_some() {
            info!("viewer session {id} removed");
        }
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Deliver `frame` to every registered session. Delivery is independent
    /// per session: a dead session never aborts delivery to the rest, it is
    /// dropped from the registry instead.
    pub fn broadcast(&self, frame: &str) {
        // Snapshot the registry so a connect/disconnect during fan-out
        // cannot invalidate the iteration.
        let targets: Vec<(SessionId, mpsc::UnboundedSender<String>)> = {
            let sessions = self.sessions.lock();
            sessions.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        debug!(sessions = targets.len(), "broadcasting frame");

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send(frame.to_owned()).is_err() {
                dead.push(id);
            }
        }

        for id in dead {
            warn!("viewer session {id} is gone, dropping it");
            self.disconnect(id);
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
