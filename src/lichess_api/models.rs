use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct OngoingGames {
    #[serde(rename = "nowPlaying")]
    pub now_playing: Vec<OngoingGame>,
}

#[derive(Debug, Deserialize)]
pub struct OngoingGame {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "isMyTurn", default)]
    pub is_my_turn: bool,
}

/// One side of a streamed game; AI opponents have no name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPlayer {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(rename = "aiLevel", default)]
    pub ai_level: Option<u32>,
}

impl StreamPlayer {
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.ai_level {
            Some(level) => format!("Stockfish level {}", level),
            None => "Unknown".to_string(),
        }
    }

    pub fn display_rating(&self) -> String {
        self.rating.map(|r| r.to_string()).unwrap_or_default()
    }
}

/// Incremental game state; clocks are milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct GameStateBody {
    #[serde(default)]
    pub moves: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub wtime: Option<u64>,
    #[serde(default)]
    pub btime: Option<u64>,
    #[serde(default)]
    pub winner: Option<String>,
}

/// ND-JSON events from the board game stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum GameStreamEvent {
    #[serde(rename = "gameFull")]
    GameFull {
        id: String,
        white: StreamPlayer,
        black: StreamPlayer,
        state: GameStateBody,
    },
    #[serde(rename = "gameState")]
    GameState {
        #[serde(default)]
        moves: String,
        #[serde(default)]
        status: String,
        #[serde(default)]
        wtime: Option<u64>,
        #[serde(default)]
        btime: Option<u64>,
        #[serde(default)]
        winner: Option<String>,
    },
    #[serde(rename = "chatLine")]
    ChatLine {},
    #[serde(rename = "opponentGone")]
    OpponentGone {},
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_full_event_parses() {
        let json = r#"{
            "type": "gameFull",
            "id": "abc123",
            "white": {"id": "alice", "name": "alice", "rating": 1500},
            "black": {"aiLevel": 3},
            "state": {"type": "gameState", "moves": "", "status": "started",
                      "wtime": 600000, "btime": 600000}
        }"#;
        let event: GameStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            GameStreamEvent::GameFull { id, white, black, state } => {
                assert_eq!(id, "abc123");
                assert_eq!(white.display_name(), "alice");
                assert_eq!(black.display_name(), "Stockfish level 3");
                assert_eq!(state.wtime, Some(600_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn game_state_event_parses() {
        let json = r#"{"type": "gameState", "moves": "e2e4 e7e5",
                       "status": "started", "wtime": 540000, "btime": 583000}"#;
        let event: GameStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            GameStreamEvent::GameState { moves, status, .. } => {
                assert_eq!(moves, "e2e4 e7e5");
                assert_eq!(status, "started");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_types_do_not_fail() {
        let json = r#"{"type": "somethingNew", "payload": 1}"#;
        let event: GameStreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, GameStreamEvent::Unknown));
    }
}
