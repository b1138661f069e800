pub mod base;
pub mod engine;
pub mod hand_brain;
pub mod human;
pub mod lichess;
pub mod manager;

pub use base::{
    Capabilities, PieceEventOutcome, Player, PlayerCallbacks, PlayerCore, PlayerErrorKind,
    PlayerInfo, PlayerState, PlayerType,
};
pub use engine::{EnginePlayer, EnginePlayerConfig, EnginePlayerConfigBuilder};
pub use hand_brain::{
    HandBrainConfig, HandBrainConfigBuilder, HandBrainMode, HandBrainPhase, HandBrainPlayer,
};
pub use human::HumanPlayer;
pub use lichess::{
    ColorPreference, LichessGameMode, LichessPlayer, LichessPlayerConfig,
    LichessPlayerConfigBuilder,
};
pub use manager::{ManagerCallbacks, PlayerManager};
