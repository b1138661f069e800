//! In-progress physical move tracking.
//!
//! Castling supports both king-first and rook-first ordering. Rook-first:
//! the rook is lifted from its home square while castling is legal, placed
//! on the castling destination (tracked, still a legal regular move), and a
//! later king lift from e1/e8 narrows the legal destinations to the castling
//! square. Late castling undoes the rook move once the king arrives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use shakmaty::{Color, Square};

use crate::broadcast;

pub const MIN_UCI_MOVE_LENGTH: usize = 4;

/// Center squares checked by the kings-in-center resign/draw gesture.
pub const CENTER_SQUARES: [Square; 4] = [Square::D4, Square::D5, Square::E4, Square::E5];

/// One castling configuration: rook home/destination and the king move.
pub struct CastlingLane {
    pub color: Color,
    pub rook_home: Square,
    pub rook_dest: Square,
    pub king_home: Square,
    pub king_dest: Square,
    pub king_uci: &'static str,
    pub rook_uci: &'static str,
}

pub static CASTLING_LANES: [CastlingLane; 4] = [
    CastlingLane {
        color: Color::White,
        rook_home: Square::H1,
        rook_dest: Square::F1,
        king_home: Square::E1,
        king_dest: Square::G1,
        king_uci: "e1g1",
        rook_uci: "h1f1",
    },
    CastlingLane {
        color: Color::White,
        rook_home: Square::A1,
        rook_dest: Square::D1,
        king_home: Square::E1,
        king_dest: Square::C1,
        king_uci: "e1c1",
        rook_uci: "a1d1",
    },
    CastlingLane {
        color: Color::Black,
        rook_home: Square::H8,
        rook_dest: Square::F8,
        king_home: Square::E8,
        king_dest: Square::G8,
        king_uci: "e8g8",
        rook_uci: "h8f8",
    },
    CastlingLane {
        color: Color::Black,
        rook_home: Square::A8,
        rook_dest: Square::D8,
        king_home: Square::E8,
        king_dest: Square::C8,
        king_uci: "e8c8",
        rook_uci: "a8d8",
    },
];

pub fn castling_lane_for_rook(rook_home: Square) -> Option<&'static CastlingLane> {
    CASTLING_LANES.iter().find(|lane| lane.rook_home == rook_home)
}

/// One-shot resign timer with generation-based cancellation.
///
/// The expiry closure runs under the same lock the timer was armed in, so a
/// cancel that wins the race suppresses the callback entirely.
pub struct KingLiftTimer {
    state: Arc<Mutex<TimerState>>,
}

struct TimerState {
    generation: u64,
    armed: bool,
}

impl KingLiftTimer {
    pub fn new() -> Self {
        KingLiftTimer {
            state: Arc::new(Mutex::new(TimerState {
                generation: 0,
                armed: false,
            })),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed
    }

    pub fn arm(&self, timeout: Duration, on_expire: Box<dyn FnOnce() + Send>) {
        let my_generation = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.armed = true;
            state.generation
        };
        let shared = Arc::clone(&self.state);
        thread::Builder::new()
            .name("king-lift-timer".to_string())
            .spawn(move || {
                thread::sleep(timeout);
                let mut state = shared.lock().unwrap();
                if state.armed && state.generation == my_generation {
                    state.armed = false;
                    on_expire();
                }
            })
            .expect("spawn king-lift timer");
    }

    /// Idempotent cancel.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.armed = false;
    }
}

impl Default for KingLiftTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the state of a move in progress on the physical board.
pub struct MoveState {
    pub source_square: Option<Square>,
    pub opponent_source_square: Option<Square>,
    pub source_piece_color: Option<Color>,
    pub legal_destination_squares: Vec<Square>,

    pub computer_move_uci: String,
    pub is_forced_move: bool,

    // Rook-first / late castling tracking
    pub castling_rook_source: Option<Square>,
    pub castling_rook_placed: bool,
    pub late_castling_in_progress: bool,

    // King-lift resign tracking
    pub king_lifted_square: Option<Square>,
    pub king_lifted_color: Option<Color>,
    pub king_lift_timer: KingLiftTimer,

    /// Source of a pending forced move that has already been lifted, so
    /// subsequent bumps do not trigger errors.
    pub pending_move_source_lifted: Option<Square>,

    capture_square_events: HashSet<Square>,
}

impl MoveState {
    pub fn new() -> Self {
        MoveState {
            source_square: None,
            opponent_source_square: None,
            source_piece_color: None,
            legal_destination_squares: Vec::new(),
            computer_move_uci: String::new(),
            is_forced_move: false,
            castling_rook_source: None,
            castling_rook_placed: false,
            late_castling_in_progress: false,
            king_lifted_square: None,
            king_lifted_color: None,
            king_lift_timer: KingLiftTimer::new(),
            pending_move_source_lifted: None,
            capture_square_events: HashSet::new(),
        }
    }

    /// Reset all move state. Also clears the broadcast pending move.
    pub fn reset(&mut self) {
        self.source_square = None;
        self.opponent_source_square = None;
        self.source_piece_color = None;
        self.legal_destination_squares.clear();
        self.computer_move_uci.clear();
        self.is_forced_move = false;
        self.castling_rook_source = None;
        self.castling_rook_placed = false;
        self.late_castling_in_progress = false;
        self.cancel_king_lift_timer();
        self.king_lifted_square = None;
        self.king_lifted_color = None;
        self.pending_move_source_lifted = None;
        self.capture_square_events.clear();

        broadcast::set_pending_move(None);
    }

    pub fn is_rook_castling_square(&self, square: Square) -> bool {
        castling_lane_for_rook(square).is_some()
    }

    pub fn is_valid_rook_castling_destination(&self, rook_source: Square, rook_dest: Square) -> bool {
        castling_lane_for_rook(rook_source)
            .map(|lane| lane.rook_dest == rook_dest)
            .unwrap_or(false)
    }

    pub fn castling_king_move(&self, rook_source: Square) -> Option<&'static str> {
        castling_lane_for_rook(rook_source).map(|lane| lane.king_uci)
    }

    /// Record the move the player is expected to make. Validates minimum UCI
    /// length only; legality is checked by the caller.
    pub fn set_computer_move(&mut self, uci: &str, forced: bool) -> bool {
        if uci.len() < MIN_UCI_MOVE_LENGTH {
            return false;
        }
        self.computer_move_uci = uci.to_string();
        self.is_forced_move = forced;
        true
    }

    pub fn cancel_king_lift_timer(&mut self) {
        self.king_lift_timer.cancel();
    }

    pub fn record_capture_square_event(&mut self, square: Square) {
        self.capture_square_events.insert(square);
    }

    pub fn has_seen_capture_square_event(&self, square: Square) -> bool {
        self.capture_square_events.contains(&square)
    }
}

impl Default for MoveState {
    fn default() -> Self {
        Self::new()
    }
}
