use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Option<i64>,
    pub source: String,
    pub event: String,
    pub site: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMoveRecord {
    pub id: Option<i64>,
    pub gameid: i64,
    /// UCI move text; empty string for the initial-position record.
    pub mv: String,
    pub fen: String,
    pub white_clock: Option<i64>,
    pub black_clock: Option<i64>,
    pub eval_score: Option<i64>,
}
