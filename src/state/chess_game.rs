//! Observable wrapper over the logical board.
//!
//! This is the sole mutation path for the authoritative position. Every
//! mutation (`push_move`, `pop_move`, `reset`, `set_result`) notifies the
//! registered observers so displays and emulators stay in sync.

use std::sync::{Arc, Mutex};

use log::debug;
use shakmaty::{Chess, Color, Square};

use crate::events::Termination;
use crate::state::board_move::BoardMove;
use crate::state::logical_board::{BoardError, LogicalBoard};
use crate::state::presence::PresenceState;

/// Notification payload delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    NewGame,
    MovePushed { uci: String },
    MovePopped { uci: String },
    ResultSet { result: String, termination: Termination },
}

pub type StateObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

pub struct ChessGameState {
    board: Mutex<LogicalBoard>,
    observers: Mutex<Vec<StateObserver>>,
    result: Mutex<Option<(String, Termination)>>,
}

impl ChessGameState {
    pub fn new() -> Self {
        ChessGameState {
            board: Mutex::new(LogicalBoard::new()),
            observers: Mutex::new(Vec::new()),
            result: Mutex::new(None),
        }
    }

    pub fn subscribe(&self, observer: StateObserver) {
        self.observers.lock().unwrap().push(observer);
    }

    fn notify(&self, change: &StateChange) {
        let observers = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer(change);
        }
    }

    /// Run a closure with read access to the logical board.
    ///
    /// The closure must not call back into this state object.
    pub fn with_board<R>(&self, f: impl FnOnce(&LogicalBoard) -> R) -> R {
        let board = self.board.lock().unwrap();
        f(&board)
    }

    pub fn push_move(&self, mv: &BoardMove) -> Result<String, BoardError> {
        let uci = {
            let mut board = self.board.lock().unwrap();
            board.push(mv)?
        };
        debug!("[ChessGameState.push_move] {}", uci);
        self.notify(&StateChange::MovePushed { uci: uci.clone() });
        Ok(uci)
    }

    pub fn pop_move(&self) -> Result<String, BoardError> {
        let uci = {
            let mut board = self.board.lock().unwrap();
            board.pop()?
        };
        debug!("[ChessGameState.pop_move] {}", uci);
        self.notify(&StateChange::MovePopped { uci: uci.clone() });
        Ok(uci)
    }

    pub fn reset(&self) {
        {
            let mut board = self.board.lock().unwrap();
            board.reset();
        }
        *self.result.lock().unwrap() = None;
        self.notify(&StateChange::NewGame);
    }

    pub fn set_result(&self, result: &str, termination: Termination) {
        *self.result.lock().unwrap() = Some((result.to_string(), termination));
        self.notify(&StateChange::ResultSet {
            result: result.to_string(),
            termination,
        });
    }

    pub fn result(&self) -> Option<(String, Termination)> {
        self.result.lock().unwrap().clone()
    }

    pub fn fen(&self) -> String {
        self.with_board(|board| board.fen())
    }

    pub fn turn(&self) -> Color {
        self.with_board(|board| board.turn())
    }

    pub fn position(&self) -> Chess {
        self.with_board(|board| board.position().clone())
    }

    pub fn presence(&self) -> PresenceState {
        self.with_board(|board| board.presence())
    }

    pub fn legal_destinations(&self, from: Square) -> Vec<Square> {
        self.with_board(|board| board.legal_destinations(from))
    }

    pub fn outcome(&self) -> Option<(String, Termination)> {
        self.with_board(|board| board.outcome())
    }

    pub fn is_game_over(&self) -> bool {
        self.result.lock().unwrap().is_some() || self.with_board(|board| board.is_game_over())
    }

    pub fn is_game_in_progress(&self) -> bool {
        self.with_board(|board| board.stack_len() > 0) && !self.is_game_over()
    }
}

impl Default for ChessGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observers_see_every_mutation() {
        let state = ChessGameState::new();
        let pushes = Arc::new(AtomicUsize::new(0));
        let news = Arc::new(AtomicUsize::new(0));
        {
            let pushes = pushes.clone();
            let news = news.clone();
            state.subscribe(Arc::new(move |change| match change {
                StateChange::MovePushed { .. } => {
                    pushes.fetch_add(1, Ordering::SeqCst);
                }
                StateChange::NewGame => {
                    news.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }));
        }

        state
            .push_move(&BoardMove::parse("e2e4").unwrap())
            .unwrap();
        state.reset();
        assert_eq!(pushes.load(Ordering::SeqCst), 1);
        assert_eq!(news.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_result() {
        let state = ChessGameState::new();
        state.set_result("1-0", Termination::Resign);
        assert!(state.is_game_over());
        state.reset();
        assert!(!state.is_game_over());
        assert!(state.result().is_none());
    }

    #[test]
    fn game_in_progress_needs_a_move() {
        let state = ChessGameState::new();
        assert!(!state.is_game_in_progress());
        state
            .push_move(&BoardMove::parse("d2d4").unwrap())
            .unwrap();
        assert!(state.is_game_in_progress());
    }
}
