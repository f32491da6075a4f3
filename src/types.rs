use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type SessionId = String;
pub type RoomCode = String;
pub type AnswerGroupId = String;

/// Letters a round can be played on. Excludes letters with too few words
/// to be fun (Q, V, X, Y).
pub const ROUND_LETTERS: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'R', 'S',
    'T', 'U', 'W', 'Z',
];

/// Character set for room codes (excludes I and O to avoid confusion)
pub const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const ROOM_CODE_LENGTH: usize = 4;

/// Most recent chat messages kept per room
pub const CHAT_HISTORY_CAP: usize = 50;

/// Maximum chat message length in characters
pub const CHAT_MESSAGE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    /// Between rounds (or before the first one)
    Waiting,
    /// Players are typing answers
    Answering,
    /// Someone pressed STOP, grace countdown running
    Countdown,
    /// Peers are voting on answer validity
    Voting,
    /// Round scoreboard is shown
    Results,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl Category {
    pub fn new(name: &str, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            is_custom: false,
        }
    }

    pub fn custom(name: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: "star".to_string(),
            is_custom: true,
        }
    }

    /// The built-in category set shown in the lobby
    pub fn standard() -> Vec<Category> {
        vec![
            Category::new("Countries", "flag"),
            Category::new("Cities", "apartment"),
            Category::new("Animals", "pets"),
            Category::new("Plants", "eco"),
            Category::new("Names", "person"),
            Category::new("Professions", "engineering"),
            Category::new("Things", "inventory_2"),
            Category::new("Food", "lunch_dining"),
            Category::new("Movies", "theaters"),
            Category::new("Colors", "palette"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    pub round_count: u32,
    pub round_time_seconds: u64,
    pub countdown_seconds: u64,
    pub voting_time_seconds: u64,
    pub selected_categories: Vec<Category>,
    pub max_players: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            round_count: 10,
            round_time_seconds: 60,
            countdown_seconds: 10,
            voting_time_seconds: 45,
            selected_categories: Category::standard().into_iter().take(5).collect(),
            max_players: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Current transport connection; rebound in place on reconnect
    pub connection_id: ConnectionId,
    /// Stable across reconnects, used to reunite a dropped connection
    pub session_id: SessionId,
    pub nickname: String,
    pub avatar_color: String,
    pub is_ready: bool,
    pub is_host: bool,
    pub total_score: i32,
    pub round_score: i32,
    pub violations: Vec<Violation>,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn new(
        connection_id: ConnectionId,
        session_id: SessionId,
        nickname: String,
        is_host: bool,
    ) -> Self {
        Self {
            connection_id,
            session_id,
            nickname,
            avatar_color: generate_avatar_color(),
            is_ready: is_host,
            is_host,
            total_score: 0,
            round_score: 0,
            violations: Vec::new(),
            joined_at: Utc::now(),
        }
    }
}

/// Random avatar color, evenly spread over the hue wheel
pub fn generate_avatar_color() -> String {
    use rand::Rng;
    let hue = rand::rng().random_range(0..360);
    format!("hsl({hue}, 70%, 50%)")
}

/// One player's per-category answers for the active round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerAnswers {
    pub connection_id: ConnectionId,
    /// Key = category name, value = submitted answer (may be empty)
    pub answers: HashMap<String, String>,
    pub submitted_at: DateTime<Utc>,
    /// True when the server filled these in on timeout rather than the client
    pub auto_submitted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Pending,
    Valid,
    Invalid,
    /// Tied vote
    Contested,
}

/// One distinct answer group for one category, as presented to voters.
///
/// Differently-spelled answers that normalize to the same key are folded
/// into a single group; the first-seen spelling becomes the canonical text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerForVoting {
    pub id: AnswerGroupId,
    pub category: String,
    /// Canonical text (first contributor's original spelling)
    pub answer: String,
    pub submitted_by: Vec<ConnectionId>,
    /// Stable ids used for score attribution (connections may rebind mid-game)
    pub submitter_sessions: Vec<SessionId>,
    pub submitter_nicknames: Vec<String>,
    pub votes_valid: Vec<ConnectionId>,
    pub votes_invalid: Vec<ConnectionId>,
    pub status: AnswerStatus,
    /// More than one distinct spelling was folded into this group
    pub is_auto_detected_duplicate: bool,
    /// All distinct literal spellings in the group, for voter display
    pub variants: Vec<String>,
}

impl AnswerForVoting {
    /// Duplicate for scoring purposes: more than one contributor,
    /// regardless of spelling
    pub fn is_duplicate(&self) -> bool {
        self.submitted_by.len() > 1
    }
}

/// Live round machinery for one room, created at game start and discarded
/// on return to lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// 1-indexed
    pub current_round: u32,
    pub total_rounds: u32,
    pub current_letter: Option<char>,
    /// Letters drawn so far; reset when exhausted so the game never stalls
    pub used_letters: Vec<char>,
    /// Snapshotted from settings at game start
    pub categories: Vec<Category>,
    pub phase: RoundPhase,
    pub stop_triggered_by: Option<ConnectionId>,
    /// Advisory deadline for the answering phase
    pub answer_deadline: Option<DateTime<Utc>>,
    /// Set while phase == Countdown
    pub countdown_end_time: Option<DateTime<Utc>>,
    pub round_answers: HashMap<ConnectionId, PlayerAnswers>,
    pub answers_for_voting: Vec<AnswerForVoting>,
    pub votes_submitted_by: HashSet<ConnectionId>,
    /// Advisory deadline for the voting phase
    pub voting_deadline: Option<DateTime<Utc>>,
}

impl GameState {
    pub fn new(total_rounds: u32, categories: Vec<Category>) -> Self {
        Self {
            current_round: 1,
            total_rounds,
            current_letter: None,
            used_letters: Vec::new(),
            categories,
            phase: RoundPhase::Waiting,
            stop_triggered_by: None,
            answer_deadline: None,
            countdown_end_time: None,
            round_answers: HashMap::new(),
            answers_for_voting: Vec::new(),
            votes_submitted_by: HashSet::new(),
            voting_deadline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub nickname: String,
    pub text: String,
    pub is_system: bool,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// 4-character join code, e.g. "ABCD"
    pub code: RoomCode,
    pub host_connection_id: ConnectionId,
    /// Insertion order == join order; first player becomes host on departure
    pub players: Vec<Player>,
    pub settings: GameSettings,
    pub current_game: Option<GameState>,
    pub is_public: bool,
    pub chat: VecDeque<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: RoomCode, host: Player) -> Self {
        let now = Utc::now();
        Self {
            code,
            host_connection_id: host.connection_id.clone(),
            players: vec![host],
            settings: GameSettings::default(),
            current_game: None,
            is_public: false,
            chat: VecDeque::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn player(&self, connection_id: &str) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn player_mut(&mut self, connection_id: &str) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn player_by_nickname(&self, nickname: &str) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.nickname.eq_ignore_ascii_case(nickname))
    }

    pub fn is_host(&self, connection_id: &str) -> bool {
        self.player(connection_id).is_some_and(|p| p.is_host)
    }

    /// Push a chat message, dropping the oldest once the ring is full
    pub fn push_chat(&mut self, message: ChatMessage) {
        if self.chat.len() >= CHAT_HISTORY_CAP {
            self.chat.pop_front();
        }
        self.chat.push_back(message);
    }
}

/// Entry in the public room browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRoomInfo {
    pub code: RoomCode,
    pub host_nickname: String,
    pub player_count: usize,
    pub max_players: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Window lost focus (Page Visibility API)
    FocusLost,
    /// Tab or window switch (blur event)
    TabSwitch,
    ConnectionUnstable,
}

/// One recorded anti-cheat incident. Accumulates on the player for the
/// lifetime of one game; cleared on return to lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationType,
    pub duration_seconds: f64,
    pub penalty: i32,
    pub round_number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_ring_caps_at_fifty() {
        let host = Player::new("c1".into(), "s1".into(), "Ala".into(), true);
        let mut room = Room::new("ABCD".into(), host);

        for i in 0..60 {
            room.push_chat(ChatMessage {
                nickname: "Ala".into(),
                text: format!("msg {i}"),
                is_system: false,
                sent_at: Utc::now(),
            });
        }

        assert_eq!(room.chat.len(), CHAT_HISTORY_CAP);
        assert_eq!(room.chat.front().unwrap().text, "msg 10");
        assert_eq!(room.chat.back().unwrap().text, "msg 59");
    }

    #[test]
    fn test_host_created_ready() {
        let host = Player::new("c1".into(), "s1".into(), "Ala".into(), true);
        assert!(host.is_ready);
        assert!(host.is_host);

        let guest = Player::new("c2".into(), "s2".into(), "Ola".into(), false);
        assert!(!guest.is_ready);
    }

    #[test]
    fn test_duplicate_flag_follows_contributor_count() {
        let mut group = AnswerForVoting {
            id: "g1".into(),
            category: "Countries".into(),
            answer: "France".into(),
            submitted_by: vec!["c1".into()],
            submitter_sessions: vec!["s1".into()],
            submitter_nicknames: vec!["Ala".into()],
            votes_valid: vec![],
            votes_invalid: vec![],
            status: AnswerStatus::Pending,
            is_auto_detected_duplicate: false,
            variants: vec!["France".into()],
        };
        assert!(!group.is_duplicate());

        group.submitted_by.push("c2".into());
        assert!(group.is_duplicate());
    }
}
