//! Commands consumed by the game thread.
//!
//! Field events, UI requests and player-thread announcements all funnel
//! through one channel, so the game thread is the only mutator of game
//! state. Commands sent before the thread starts simply buffer in the
//! channel and are replayed in order.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use derive_builder::Builder;
use shakmaty::{Color, Square};

use crate::board_driver::Key;
use crate::events::{GameEvent, PieceEvent, Termination};
use crate::state::{BoardMove, PresenceState};

#[derive(Debug)]
pub enum GameCommand {
    Field {
        event: PieceEvent,
        square: Square,
        seconds: f64,
    },
    Key(Key),
    ComputerMove {
        uci: String,
        forced: bool,
    },
    /// A non-human player computed/received a move for the user to execute.
    PendingMove(BoardMove),
    /// External move submission (remote protocol, tests). The reply carries
    /// accepted/rejected.
    SubmitMove {
        mv: BoardMove,
        reply: Sender<bool>,
    },
    Resign {
        color: Option<Color>,
    },
    Draw,
    Flag {
        color: Color,
    },
    SetPendingHint {
        from: Square,
        to: Square,
    },
    ClearPendingHint,
    RestorePendingMoveLeds,
    /// The king-lift resign timer expired with the king still off the board.
    KingLiftExpired {
        color: Color,
    },
    ResetKingsInCenterMenu,
    ResetKingLiftMenu,
    /// Both players reached READY.
    PlayersReady,
    /// Post-move physical validation (task worker) saw a mismatch.
    PostMoveValidationFailed {
        current: Box<PresenceState>,
    },
    /// Barrier: acknowledged once the command queue and the post-move queue
    /// are both drained.
    Sync(Sender<()>),
    Stop,
}

pub type EventCallback = Arc<dyn Fn(GameEvent) + Send + Sync>;
pub type MoveCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type KeyCallback = Arc<dyn Fn(Key) + Send + Sync>;
pub type TakebackCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks handed to `subscribe_game`.
#[derive(Clone, Default)]
pub struct GameCallbacks {
    pub event: Option<EventCallback>,
    pub mv: Option<MoveCallback>,
    pub key: Option<KeyCallback>,
    pub takeback: Option<TakebackCallback>,
}

/// UI-facing callbacks set directly on the manager.
#[derive(Default)]
pub struct UiCallbacks {
    /// Promotion piece selection; receives `is_white_promotion`, returns one
    /// of 'q', 'r', 'b', 'n'.
    pub on_promotion_needed: Mutex<Option<Arc<dyn Fn(bool) -> char + Send + Sync>>>,
    pub on_back_pressed: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    pub on_kings_in_center: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    pub on_kings_in_center_cancel: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    pub on_king_lift_resign: Mutex<Option<Arc<dyn Fn(Color) + Send + Sync>>>,
    pub on_king_lift_resign_cancel: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    pub on_terminal_position: Mutex<Option<Arc<dyn Fn(String, Termination) + Send + Sync>>>,
}

/// PGN-style metadata recorded with the persisted game.
#[derive(Debug, Clone, Default)]
pub struct GameInfo {
    pub event: String,
    pub site: String,
    pub round: String,
    pub white: String,
    pub black: String,
}

#[derive(Builder, Clone)]
#[builder(setter(into))]
pub struct GameManagerConfig {
    #[builder(default = "true")]
    pub save_to_database: bool,
    /// Explicit database path; `None` uses the platform data directory.
    #[builder(default)]
    pub database_path: Option<PathBuf>,
    #[builder(default = "Duration::from_secs(3)")]
    pub king_lift_timeout: Duration,
    /// Settling delay before polling occupancy after a PLACE in correction
    /// mode (sliding pieces briefly cover two squares).
    #[builder(default = "Duration::from_millis(50)")]
    pub sensor_settle: Duration,
    /// Recorded in the `source` column of persisted games.
    #[builder(default = "String::from(\"board_core\")")]
    pub source: String,
}

impl Default for GameManagerConfig {
    fn default() -> Self {
        GameManagerConfigBuilder::default()
            .build()
            .expect("default game manager config")
    }
}
