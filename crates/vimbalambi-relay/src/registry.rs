//! Connection registry: user id -> active connection.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// One connection's outbound queue sender, tagged with the id of the
/// underlying socket so close-time cleanup can tell connections apart.
#[derive(Clone)]
pub struct Connection {
    pub conn_id: u64,
    pub tx: mpsc::Sender<Message>,
}

/// At most one entry per user. A later `user_online` for the same id
/// overwrites the handle: the newest connection is authoritative and the
/// superseded one lingers unregistered until its own close.
#[derive(Default)]
pub struct UserRegistry {
    users: DashMap<String, Connection>,
    seq: AtomicU64,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, user_id: String, conn: Connection) {
        self.users.insert(user_id, conn);
    }

    pub fn remove(&self, user_id: &str) -> Option<Connection> {
        self.users.remove(user_id).map(|(_, conn)| conn)
    }

    /// Remove whichever entry still points at this socket. A user whose
    /// registration was overwritten by a newer connection is left alone.
    pub fn remove_by_conn(&self, conn_id: u64) -> Option<String> {
        let user = self
            .users
            .iter()
            .find(|e| e.value().conn_id == conn_id)
            .map(|e| e.key().clone())?;
        self.users
            .remove_if(&user, |_, conn| conn.conn_id == conn_id)
            .map(|(user, _)| user)
    }

    pub fn get(&self, user_id: &str) -> Option<Connection> {
        self.users.get(user_id).map(|r| r.value().clone())
    }

    pub fn connections(&self) -> Vec<(String, Connection)> {
        self.users
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}
