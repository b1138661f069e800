//! Game interaction core for an electronic chessboard.
//!
//! Reconciles physical piece movements (lift/place events from the 64
//! square sensors) with a logical chess game, drives LED feedback, and
//! orchestrates moves from multiple concurrent sources: local human, local
//! UCI engine, remote Lichess opponent and remote protocol clients.
//!
//! The logical board is the authority; the physical board must conform.
//! When they diverge, correction mode guides the user back with LEDs.

pub use shakmaty;

pub mod board_driver;
pub mod broadcast;
pub mod clock;
pub mod database;
pub mod events;
pub mod game_manager;
pub mod led;
pub mod lichess_api;
pub mod players;
pub mod state;
pub mod uci_engine;

pub mod prelude {
    // Core types
    pub use crate::game_manager::{GameManager, GameManagerConfig, GameManagerConfigBuilder};
    pub use crate::players::{
        EnginePlayer, EnginePlayerConfigBuilder, HandBrainPlayer, HumanPlayer, LichessPlayer,
        LichessPlayerConfigBuilder, Player, PlayerManager,
    };
    pub use crate::state::{BoardMove, ChessGameState, LogicalBoard, PresenceState};

    // Interfaces the embedder provides
    pub use crate::board_driver::{BoardDriver, Key, Sound};
    pub use crate::clock::{ClockService, ScoreSource};
    pub use crate::led::LedCallbacks;

    // Events delivered to the embedder
    pub use crate::events::{GameEvent, PieceEvent, Termination};

    // Persistence
    pub use crate::database::GameStore;
}
