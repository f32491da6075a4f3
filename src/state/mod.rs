mod anticheat;
mod game;
mod registry;
mod voting;

pub use voting::{normalize_answer, normalize_for_duplicate_check, FinalizeOutcome};

use crate::config::ServerConfig;
use crate::protocol::ServerMessage;
use crate::types::*;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared application state.
///
/// Rooms live behind their own `RwLock`, so commands against different rooms
/// run in parallel. Everything inside one room, including the STOP
/// check-and-set, serializes on that room's lock. The registry maps are
/// sharded (`DashMap`), never a single global lock.
pub struct AppState {
    rooms: DashMap<RoomCode, Arc<RwLock<Room>>>,
    /// connection id -> room code
    connections: DashMap<ConnectionId, RoomCode>,
    /// Per-room fan-out channel for notifications
    channels: DashMap<RoomCode, broadcast::Sender<ServerMessage>>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            channels: DashMap::new(),
            config,
        }
    }

    /// Look up a room by code (case-insensitive)
    pub fn room(&self, code: &str) -> Option<Arc<RwLock<Room>>> {
        self.rooms
            .get(&code.to_uppercase())
            .map(|r| r.value().clone())
    }

    pub fn room_code_of(&self, connection_id: &str) -> Option<RoomCode> {
        self.connections
            .get(connection_id)
            .map(|c| c.value().clone())
    }

    pub fn room_by_connection(&self, connection_id: &str) -> Option<Arc<RwLock<Room>>> {
        let code = self.room_code_of(connection_id)?;
        self.room(&code)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Subscribe to a room's notification channel, creating it on demand
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<ServerMessage> {
        self.channel(code).subscribe()
    }

    pub(crate) fn channel(&self, code: &str) -> broadcast::Sender<ServerMessage> {
        self.channels
            .entry(code.to_uppercase())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    /// Fan a notification out to every connection subscribed to the room.
    /// Send errors (no receivers) are fine.
    pub fn broadcast_to_room(&self, code: &str, msg: ServerMessage) {
        if let Some(tx) = self.channels.get(&code.to_uppercase()) {
            let _ = tx.send(msg);
        }
    }

    pub(crate) fn map_connection(&self, connection_id: ConnectionId, code: RoomCode) {
        self.connections.insert(connection_id, code);
    }

    pub(crate) fn unmap_connection(&self, connection_id: &str) -> Option<RoomCode> {
        self.connections.remove(connection_id).map(|(_, code)| code)
    }

    /// Drop a room and its channel. Connection mappings are released by the
    /// callers that know which players were inside.
    pub(crate) fn drop_room(&self, code: &str) {
        let code = code.to_uppercase();
        self.rooms.remove(&code);
        self.channels.remove(&code);
    }

    /// Snapshot of all live rooms, for the background watchers
    pub fn all_rooms(&self) -> Vec<(RoomCode, Arc<RwLock<Room>>)> {
        self.rooms
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
