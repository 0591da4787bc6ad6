use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

/// Which connection profiles currently have a live session.
#[derive(Clone, Default)]
pub struct ConnectionStatus {
    connected: Arc<RwLock<HashSet<Uuid>>>,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: Uuid, connected: bool) {
        let Ok(mut guard) = self.connected.write() else {
            tracing::error!("connection status lock poisoned");
            return;
        };
        if connected {
            guard.insert(id);
        } else {
            guard.remove(&id);
        }
    }

    pub fn is_connected(&self, id: Uuid) -> bool {
        self.connected
            .read()
            .map(|guard| guard.contains(&id))
            .unwrap_or(false)
    }

    pub fn connected(&self) -> Vec<Uuid> {
        self.connected
            .read()
            .map(|guard| guard.iter().copied().collect())
            .unwrap_or_default()
    }
}
