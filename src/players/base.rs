//! Player abstraction.
//!
//! A player is an entity that produces moves for one side of the game. All
//! players observe piece events and yield moves the same way; they differ
//! only in how the move is *determined*:
//!
//! - `HumanPlayer` constructs moves from lift/place events
//! - `EnginePlayer` computes moves, piece events confirm execution
//! - `LichessPlayer` receives moves from the server, piece events confirm
//!
//! `on_piece_event` returns a [`PieceEventOutcome`] to the game session,
//! which validates and applies submitted moves; the session's accept/reject
//! answer travels back through `on_move_made` (only executed moves are
//! announced). This replaces the duck-typed move callback of older builds.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use shakmaty::{Chess, Color, Square};

use crate::events::PieceEvent;
use crate::state::BoardMove;

/// State machine for the player lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Uninitialized,
    Initializing,
    Ready,
    Thinking,
    Error,
    Stopped,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Uninitialized => "UNINITIALIZED",
            PlayerState::Initializing => "INITIALIZING",
            PlayerState::Ready => "READY",
            PlayerState::Thinking => "THINKING",
            PlayerState::Error => "ERROR",
            PlayerState::Stopped => "STOPPED",
        };
        write!(f, "{}", name)
    }
}

/// How a player's moves are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerType {
    Human,
    Engine,
    Lichess,
    Remote,
}

/// Error conditions a player reports from piece events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerErrorKind {
    /// PLACE with no prior LIFT (extra piece on the board).
    PlaceWithoutLift,
    /// The only lifted piece was placed back; not a move.
    PieceReturned,
    /// Formed move does not match the expected pending move.
    MoveMismatch,
    /// Hand-brain: the moved piece is not the suggested type.
    WrongPieceType,
}

/// What a piece event produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceEventOutcome {
    Nothing,
    /// A move to validate and execute.
    Submit(BoardMove),
    Error(PlayerErrorKind),
}

/// Capability record, replacing "does this subclass override the hook".
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Can this side be resigned from the physical board.
    pub can_resign: bool,
    pub supports_takeback: bool,
    /// Rook-first castling completed after an intervening reply.
    pub supports_late_castling: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            can_resign: true,
            supports_takeback: true,
            supports_late_castling: true,
        }
    }
}

/// Callbacks wired by the `PlayerManager`.
#[derive(Clone, Default)]
pub struct PlayerCallbacks {
    /// Engine computed / server sent a move the user must execute (LEDs).
    pub pending_move: Option<Arc<dyn Fn(BoardMove) + Send + Sync>>,
    pub status: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pub ready: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Clock sync from an online opponent: (white_seconds, black_seconds).
    pub clock: Option<Arc<dyn Fn(i64, i64) + Send + Sync>>,
    /// Online game info: (white_name, white_rating, black_name, black_rating).
    pub game_info: Option<Arc<dyn Fn(String, String, String, String) + Send + Sync>>,
}

/// Display snapshot of a player.
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub name: String,
    pub color: Option<Color>,
    pub player_type: PlayerType,
    pub state: PlayerState,
    pub error: Option<String>,
    pub description: String,
}

struct CoreInner {
    state: PlayerState,
    error: Option<String>,
    color: Option<Color>,
    /// Lifted squares, up to two for captures. Order does not matter: when a
    /// piece lands on one of them, the *other* square is the source.
    lifted: Vec<Square>,
    queued_position: Option<Chess>,
}

pub enum TrackResult {
    Nothing,
    Formed(BoardMove),
    Error(PlayerErrorKind),
}

/// Shared player machinery: the state machine, lifted-square tracking and
/// callback storage. Concrete players embed it behind an `Arc` so their
/// worker threads can reach it.
pub struct PlayerCore {
    name: String,
    inner: Mutex<CoreInner>,
    callbacks: Mutex<PlayerCallbacks>,
}

impl PlayerCore {
    pub fn new(name: &str) -> Self {
        PlayerCore {
            name: name.to_string(),
            inner: Mutex::new(CoreInner {
                state: PlayerState::Uninitialized,
                error: None,
                color: None,
                lifted: Vec::new(),
                queued_position: None,
            }),
            callbacks: Mutex::new(PlayerCallbacks::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Option<Color> {
        self.inner.lock().unwrap().color
    }

    pub fn set_color(&self, color: Color) {
        self.inner.lock().unwrap().color = Some(color);
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().unwrap().state
    }

    pub fn error_message(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PlayerState::Ready
    }

    pub fn is_thinking(&self) -> bool {
        self.state() == PlayerState::Thinking
    }

    pub fn set_callbacks(&self, callbacks: PlayerCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    pub fn callbacks(&self) -> PlayerCallbacks {
        self.callbacks.lock().unwrap().clone()
    }

    /// Transition the state machine.
    ///
    /// On INITIALIZING → READY the ready callback fires and any queued move
    /// request is handed back to the caller, who runs its own request logic.
    #[must_use]
    pub fn set_state(&self, new_state: PlayerState) -> Option<Chess> {
        let (became_ready, queued) = {
            let mut inner = self.inner.lock().unwrap();
            let old_state = inner.state;
            inner.state = new_state;
            if new_state != PlayerState::Error {
                inner.error = None;
            }
            if new_state == PlayerState::Ready && old_state == PlayerState::Initializing {
                (true, inner.queued_position.take())
            } else {
                (false, None)
            }
        };
        if became_ready {
            if let Some(ready) = self.callbacks().ready {
                ready();
            }
            if queued.is_some() {
                info!(
                    "[Player] {} now ready, processing queued move request",
                    self.name
                );
            }
        }
        queued
    }

    pub fn set_error(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = PlayerState::Error;
        inner.error = Some(message.to_string());
    }

    /// Base `request_move` logic: queue the (copied) position while the
    /// player is still initializing, run it when ready, drop it otherwise.
    pub fn begin_request(&self, position: &Chess) -> RequestDisposition {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            PlayerState::Initializing => {
                info!("[Player] {} still initializing, queueing move request", self.name);
                inner.queued_position = Some(position.clone());
                RequestDisposition::Queued
            }
            PlayerState::Ready => {
                inner.queued_position = None;
                RequestDisposition::Proceed
            }
            state => {
                warn!(
                    "[Player] {} request_move called but state is {}",
                    self.name, state
                );
                RequestDisposition::Ignored
            }
        }
    }

    pub fn reset_lifted(&self) {
        self.inner.lock().unwrap().lifted.clear();
    }

    pub fn lifted_squares(&self) -> Vec<Square> {
        self.inner.lock().unwrap().lifted.clone()
    }

    /// Track a lift/place event and form a move when one completes.
    pub fn track_piece_event(&self, event: PieceEvent, square: Square) -> TrackResult {
        let mut inner = self.inner.lock().unwrap();
        match event {
            PieceEvent::Lift => {
                if !inner.lifted.contains(&square) {
                    inner.lifted.push(square);
                }
                TrackResult::Nothing
            }
            PieceEvent::Place => {
                if inner.lifted.is_empty() {
                    return TrackResult::Error(PlayerErrorKind::PlaceWithoutLift);
                }
                if inner.lifted.len() == 1 {
                    let from = inner.lifted[0];
                    inner.lifted.clear();
                    if from == square {
                        return TrackResult::Error(PlayerErrorKind::PieceReturned);
                    }
                    return TrackResult::Formed(BoardMove::new(from, square));
                }
                // Two pieces lifted (capture). Placing on one of them means
                // the other square is the source; a third square falls back
                // to the first lifted square.
                let from = if inner.lifted.contains(&square) {
                    *inner
                        .lifted
                        .iter()
                        .find(|&&sq| sq != square)
                        .expect("two distinct lifted squares")
                } else {
                    inner.lifted[0]
                };
                inner.lifted.clear();
                TrackResult::Formed(BoardMove::new(from, square))
            }
        }
    }

    pub fn report_status(&self, message: &str) {
        if let Some(status) = self.callbacks().status {
            status(message.to_string());
        }
    }

    pub fn fire_pending_move(&self, mv: BoardMove) {
        if let Some(pending) = self.callbacks().pending_move {
            pending(mv);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    Proceed,
    Queued,
    Ignored,
}

/// The uniform move-source interface.
pub trait Player: Send + Sync {
    fn core(&self) -> &PlayerCore;

    fn player_type(&self) -> PlayerType;

    /// Begin async initialization. Returns false on immediate failure.
    fn start(&self) -> bool;

    /// Clean shutdown: kill subprocesses, close streams.
    fn stop(&self);

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn name(&self) -> String {
        self.core().name().to_string()
    }

    fn color(&self) -> Option<Color> {
        self.core().color()
    }

    fn set_color(&self, color: Color) {
        self.core().set_color(color);
    }

    fn state(&self) -> PlayerState {
        self.core().state()
    }

    fn is_ready(&self) -> bool {
        self.core().is_ready()
    }

    fn is_thinking(&self) -> bool {
        self.core().is_thinking()
    }

    /// The move this player expects the user to execute, if any.
    fn pending_move(&self) -> Option<BoardMove> {
        None
    }

    /// Called when it is this player's turn. Queues while initializing.
    fn request_move(&self, position: &Chess) {
        match self.core().begin_request(position) {
            RequestDisposition::Proceed => self.do_request_move(position),
            RequestDisposition::Queued | RequestDisposition::Ignored => {}
        }
    }

    /// Player-specific move request handling; the default just clears the
    /// lifted-square tracking.
    fn do_request_move(&self, _position: &Chess) {
        self.core().reset_lifted();
    }

    /// Track a lift/place event; a completed lift/place pair is validated
    /// by the player and surfaces as `Submit` or an error outcome.
    fn on_piece_event(
        &self,
        event: PieceEvent,
        square: Square,
        position: &Chess,
    ) -> PieceEventOutcome {
        match self.core().track_piece_event(event, square) {
            TrackResult::Nothing => PieceEventOutcome::Nothing,
            TrackResult::Error(kind) => PieceEventOutcome::Error(kind),
            TrackResult::Formed(mv) => self.validate_formed(mv, position),
        }
    }

    /// Decide what to do with a move formed from piece events. Humans submit
    /// unconditionally; engine-backed players compare against their pending
    /// move.
    fn validate_formed(&self, mv: BoardMove, _position: &Chess) -> PieceEventOutcome {
        PieceEventOutcome::Submit(mv)
    }

    /// A move was executed on the logical board (by either side).
    fn on_move_made(&self, _mv: &BoardMove, _position_after: &Chess) {
        self.core().reset_lifted();
    }

    fn on_new_game(&self) {
        self.core().reset_lifted();
    }

    fn on_takeback(&self, _position: &Chess) {}

    fn on_resign(&self, _color: Color) {}

    fn on_draw_offer(&self) {}

    /// Correction mode exited; restore any UI state (status text, hints).
    fn on_correction_mode_exit(&self) {}

    fn get_info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name(),
            color: self.color(),
            player_type: self.player_type(),
            state: self.state(),
            error: self.core().error_message(),
            description: String::new(),
        }
    }
}
