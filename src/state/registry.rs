//! Room registry: creation, membership, lookups, and garbage collection.

use super::AppState;
use crate::error::GameError;
use crate::types::*;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_CHARS[rng.random_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}

/// What happened when a player left, for the caller to broadcast
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub room_code: RoomCode,
    pub connection_id: ConnectionId,
    pub was_room_deleted: bool,
    pub new_host_id: Option<ConnectionId>,
}

impl AppState {
    /// Create a room with the caller as sole player and host. Never fails;
    /// code allocation retries until unique.
    pub async fn create_room(
        &self,
        connection_id: &str,
        nickname: &str,
        session_id: &str,
    ) -> Room {
        let host = Player::new(
            connection_id.to_string(),
            session_id.to_string(),
            nickname.to_string(),
            true,
        );

        loop {
            let code = generate_room_code();
            match self.rooms.entry(code.clone()) {
                dashmap::Entry::Occupied(_) => continue,
                dashmap::Entry::Vacant(slot) => {
                    let room = Room::new(code.clone(), host.clone());
                    slot.insert(Arc::new(RwLock::new(room.clone())));
                    self.map_connection(connection_id.to_string(), code);
                    tracing::info!(code = %room.code, nickname, "room created");
                    return room;
                }
            }
        }
    }

    /// Join an existing room. Blocked once a game is past the waiting
    /// phase, which is what prevents mid-round joiners.
    pub async fn join_room(
        &self,
        code: &str,
        connection_id: &str,
        nickname: &str,
        session_id: &str,
    ) -> Result<Room, GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;

        if room.players.len() >= room.settings.max_players {
            return Err(GameError::RoomFull);
        }
        if room.player_by_nickname(nickname).is_some() {
            return Err(GameError::NicknameTaken);
        }
        if let Some(game) = &room.current_game {
            if game.phase != RoundPhase::Waiting {
                return Err(GameError::GameAlreadyStarted);
            }
        }

        let player = Player::new(
            connection_id.to_string(),
            session_id.to_string(),
            nickname.to_string(),
            false,
        );
        room.players.push(player);
        room.last_activity_at = Utc::now();
        self.map_connection(connection_id.to_string(), room.code.clone());

        tracing::info!(code = %room.code, nickname, "player joined");
        Ok(room.clone())
    }

    /// Reunite a dropped connection with its seat. Matches by session id,
    /// falling back to nickname; rebinds the connection id in place so all
    /// per-round bookkeeping follows the player.
    pub async fn rejoin_room(
        &self,
        code: &str,
        connection_id: &str,
        nickname: &str,
        session_id: &str,
    ) -> Result<Room, GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;

        let idx = room
            .players
            .iter()
            .position(|p| !p.session_id.is_empty() && p.session_id == session_id)
            .or_else(|| {
                // fallback kept for clients that lost their session id
                room.players
                    .iter()
                    .position(|p| p.nickname.eq_ignore_ascii_case(nickname))
            })
            .ok_or(GameError::PlayerNotFound)?;

        let player = &mut room.players[idx];
        let old_connection_id = std::mem::replace(
            &mut player.connection_id,
            connection_id.to_string(),
        );
        let was_host = player.is_host;

        if was_host {
            room.host_connection_id = connection_id.to_string();
        }

        // Re-key in-flight round state so all-submitted checks still close
        if let Some(game) = &mut room.current_game {
            if let Some(answers) = game.round_answers.remove(&old_connection_id) {
                let mut answers = answers;
                answers.connection_id = connection_id.to_string();
                game.round_answers.insert(connection_id.to_string(), answers);
            }
            if game.votes_submitted_by.remove(&old_connection_id) {
                game.votes_submitted_by.insert(connection_id.to_string());
            }
            if game.stop_triggered_by.as_deref() == Some(old_connection_id.as_str()) {
                game.stop_triggered_by = Some(connection_id.to_string());
            }
        }

        room.last_activity_at = Utc::now();
        self.unmap_connection(&old_connection_id);
        self.map_connection(connection_id.to_string(), room.code.clone());

        tracing::info!(code = %room.code, nickname, "player reconnected");
        Ok(room.clone())
    }

    /// Remove the player behind a connection. Deletes the room when it
    /// empties; otherwise promotes the longest-joined player when the host
    /// left.
    pub async fn leave_room(&self, connection_id: &str) -> Option<LeaveOutcome> {
        let code = self.unmap_connection(connection_id)?;
        let arc = self.room(&code)?;
        let mut room = arc.write().await;

        let idx = room
            .players
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let leaver = room.players.remove(idx);

        if room.players.is_empty() {
            drop(room);
            self.drop_room(&code);
            tracing::info!(code = %code, "room deleted (last player left)");
            return Some(LeaveOutcome {
                room_code: code,
                connection_id: connection_id.to_string(),
                was_room_deleted: true,
                new_host_id: None,
            });
        }

        let mut new_host_id = None;
        if leaver.is_host {
            let new_host = &mut room.players[0];
            new_host.is_host = true;
            room.host_connection_id = new_host.connection_id.clone();
            new_host_id = Some(room.host_connection_id.clone());
        }
        room.last_activity_at = Utc::now();

        Some(LeaveOutcome {
            room_code: code,
            connection_id: connection_id.to_string(),
            was_room_deleted: false,
            new_host_id,
        })
    }

    /// Host-only removal of another player
    pub async fn kick_player(
        &self,
        host_connection_id: &str,
        target_connection_id: &str,
    ) -> Result<RoomCode, GameError> {
        let arc = self
            .room_by_connection(host_connection_id)
            .ok_or(GameError::NotInRoom)?;
        let mut room = arc.write().await;

        if !room.is_host(host_connection_id) {
            return Err(GameError::NotHost);
        }
        if host_connection_id == target_connection_id {
            return Err(GameError::CannotKickSelf);
        }

        let idx = room
            .players
            .iter()
            .position(|p| p.connection_id == target_connection_id)
            .ok_or(GameError::PlayerNotFound)?;
        room.players.remove(idx);
        room.last_activity_at = Utc::now();
        self.unmap_connection(target_connection_id);

        Ok(room.code.clone())
    }

    pub async fn set_ready(
        &self,
        connection_id: &str,
        is_ready: bool,
    ) -> Result<RoomCode, GameError> {
        let arc = self
            .room_by_connection(connection_id)
            .ok_or(GameError::NotInRoom)?;
        let mut room = arc.write().await;
        let player = room
            .player_mut(connection_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.is_ready = is_ready;
        room.last_activity_at = Utc::now();
        Ok(room.code.clone())
    }

    pub async fn set_room_public(
        &self,
        code: &str,
        connection_id: &str,
        is_public: bool,
    ) -> Result<(), GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;
        if !room.is_host(connection_id) {
            return Err(GameError::NotHost);
        }
        room.is_public = is_public;
        room.last_activity_at = Utc::now();
        Ok(())
    }

    /// Host-only settings update; rejected wholesale on invalid input
    pub async fn update_settings(
        &self,
        code: &str,
        connection_id: &str,
        category_names: &[String],
        round_count: u32,
    ) -> Result<(), GameError> {
        if category_names.is_empty() {
            return Err(GameError::NoCategories);
        }
        if !(1..=20).contains(&round_count) {
            return Err(GameError::InvalidRoundCount);
        }

        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;
        if !room.is_host(connection_id) {
            return Err(GameError::NotHost);
        }

        let standard = Category::standard();
        room.settings.selected_categories = category_names
            .iter()
            .map(|name| {
                standard
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .unwrap_or_else(|| Category::custom(name))
            })
            .collect();
        room.settings.round_count = round_count;
        room.last_activity_at = Utc::now();
        Ok(())
    }

    /// Rooms a stranger may browse and join: public, spare capacity, and
    /// not mid-round
    pub async fn public_rooms(&self) -> Vec<PublicRoomInfo> {
        let mut infos = Vec::new();
        for (_, arc) in self.all_rooms() {
            let room = arc.read().await;
            let joinable = room.is_public
                && room.players.len() < room.settings.max_players
                && room
                    .current_game
                    .as_ref()
                    .is_none_or(|g| g.phase == RoundPhase::Waiting);
            if joinable {
                infos.push(PublicRoomInfo {
                    code: room.code.clone(),
                    host_nickname: room
                        .players
                        .iter()
                        .find(|p| p.is_host)
                        .map(|p| p.nickname.clone())
                        .unwrap_or_else(|| "?".to_string()),
                    player_count: room.players.len(),
                    max_players: room.settings.max_players,
                });
            }
        }
        infos
    }

    /// Store a chat message in the room's ring and return it for fan-out
    pub async fn send_chat(
        &self,
        code: &str,
        connection_id: &str,
        text: &str,
    ) -> Result<ChatMessage, GameError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::EmptyMessage);
        }
        let text: String = text.chars().take(CHAT_MESSAGE_MAX_CHARS).collect();

        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;
        let nickname = room
            .player(connection_id)
            .map(|p| p.nickname.clone())
            .ok_or(GameError::PlayerNotFound)?;

        let message = ChatMessage {
            nickname,
            text,
            is_system: false,
            sent_at: Utc::now(),
        };
        room.push_chat(message.clone());
        room.last_activity_at = Utc::now();
        Ok(message)
    }

    /// Host-initiated teardown; releases every member's connection mapping
    pub async fn delete_room(&self, code: &str) -> Result<Vec<ConnectionId>, GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let members: Vec<ConnectionId> = {
            let room = arc.read().await;
            room.players.iter().map(|p| p.connection_id.clone()).collect()
        };
        for connection_id in &members {
            self.unmap_connection(connection_id);
        }
        self.drop_room(code);
        Ok(members)
    }

    /// Evict empty rooms past `empty_threshold` of inactivity, and any room
    /// at all past `stale_threshold`. Returns how many rooms were removed.
    pub async fn sweep_inactive(
        &self,
        empty_threshold: Duration,
        stale_threshold: Duration,
    ) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        for (code, arc) in self.all_rooms() {
            let (player_connections, inactive_for) = {
                let room = arc.read().await;
                let connections: Vec<ConnectionId> =
                    room.players.iter().map(|p| p.connection_id.clone()).collect();
                let inactive = (now - room.last_activity_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                (connections, inactive)
            };

            let evict = (player_connections.is_empty() && inactive_for > empty_threshold)
                || inactive_for > stale_threshold;
            if !evict {
                continue;
            }

            for connection_id in &player_connections {
                self.unmap_connection(connection_id);
            }
            self.drop_room(&code);
            removed += 1;
            tracing::info!(
                code = %code,
                players = player_connections.len(),
                inactive_secs = inactive_for.as_secs(),
                "swept inactive room"
            );
        }

        removed
    }
}
