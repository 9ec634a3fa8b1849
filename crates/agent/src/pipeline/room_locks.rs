//! Per-room request serialization.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async lock per room. Holding the guard keeps other
/// requests for the same room waiting.
#[derive(Default)]
pub struct RoomLocks {
    rooms: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut rooms = self.rooms.lock().await;
            // Drop locks nobody is holding or waiting on.
            rooms.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(rooms.entry(room_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of rooms with a live lock.
    pub async fn active_rooms(&self) -> usize {
        self.rooms.lock().await.len()
    }
}
