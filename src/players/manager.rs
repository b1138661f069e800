//! Coordinates the two players of a game.
//!
//! Routes piece events and move requests to the side to move, fans move
//! notifications out to both players, and unifies the per-player callbacks
//! into manager-level ones. The ready callback fires exactly once, when
//! both players have reached READY.

use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use shakmaty::{Chess, Color, Position, Square};

use crate::events::PieceEvent;
use crate::state::BoardMove;

use super::base::{PieceEventOutcome, Player, PlayerCallbacks, PlayerInfo, PlayerType};

/// Manager-level callbacks, wired into both players.
#[derive(Clone, Default)]
pub struct ManagerCallbacks {
    pub pending_move: Option<Arc<dyn Fn(BoardMove) + Send + Sync>>,
    pub status: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pub ready: Option<Arc<dyn Fn() + Send + Sync>>,
    pub clock: Option<Arc<dyn Fn(i64, i64) + Send + Sync>>,
    pub game_info: Option<Arc<dyn Fn(String, String, String, String) + Send + Sync>>,
}

pub struct PlayerManager {
    white: Arc<dyn Player>,
    black: Arc<dyn Player>,
    ready_fired: Mutex<bool>,
}

impl PlayerManager {
    pub fn new(white: Arc<dyn Player>, black: Arc<dyn Player>) -> Arc<Self> {
        white.set_color(Color::White);
        black.set_color(Color::Black);
        info!(
            "[PlayerManager] Created with White={} ({:?}), Black={} ({:?})",
            white.name(),
            white.player_type(),
            black.name(),
            black.player_type()
        );
        Arc::new(PlayerManager {
            white,
            black,
            ready_fired: Mutex::new(false),
        })
    }

    /// Wire unified callbacks into both players. Must be called before
    /// `start` so no ready transition is missed.
    pub fn set_callbacks(self: &Arc<Self>, callbacks: ManagerCallbacks) {
        for player in [&self.white, &self.black] {
            let manager = Arc::downgrade(self);
            let on_ready = callbacks.ready.clone();
            let ready = Arc::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_player_ready(on_ready.clone());
                }
            });
            player.core().set_callbacks(PlayerCallbacks {
                pending_move: callbacks.pending_move.clone(),
                status: callbacks.status.clone(),
                ready: Some(ready),
                clock: callbacks.clock.clone(),
                game_info: callbacks.game_info.clone(),
            });
        }
    }

    fn handle_player_ready(&self, on_ready: Option<Arc<dyn Fn() + Send + Sync>>) {
        let mut fired = self.ready_fired.lock().unwrap();
        if *fired || !self.is_ready() {
            return;
        }
        *fired = true;
        info!("[PlayerManager] All players ready");
        if let Some(on_ready) = on_ready {
            on_ready();
        }
    }

    pub fn player(&self, color: Color) -> &Arc<dyn Player> {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn white_player(&self) -> &Arc<dyn Player> {
        &self.white
    }

    pub fn black_player(&self) -> &Arc<dyn Player> {
        &self.black
    }

    pub fn current_player(&self, position: &Chess) -> &Arc<dyn Player> {
        self.player(position.turn())
    }

    /// The pending move of the side to move, if its player has one.
    pub fn current_pending_move(&self, position: &Chess) -> Option<BoardMove> {
        self.current_player(position).pending_move()
    }

    /// Ask the side to move for a move. No-op while that player is already
    /// thinking.
    pub fn request_move(&self, position: &Chess) {
        let player = self.current_player(position);
        if player.is_thinking() {
            debug!("[PlayerManager] {} already thinking, skipping request", player.name());
            return;
        }
        debug!("[PlayerManager] Requesting move from {}", player.name());
        player.request_move(position);
    }

    /// Route a piece event to the side to move.
    pub fn on_piece_event(
        &self,
        event: PieceEvent,
        square: Square,
        position: &Chess,
    ) -> PieceEventOutcome {
        self.current_player(position)
            .on_piece_event(event, square, position)
    }

    pub fn on_move_made(&self, mv: &BoardMove, position_after: &Chess) {
        self.white.on_move_made(mv, position_after);
        self.black.on_move_made(mv, position_after);
    }

    pub fn on_new_game(&self) {
        self.white.on_new_game();
        self.black.on_new_game();
    }

    pub fn on_takeback(&self, position: &Chess) {
        self.white.on_takeback(position);
        self.black.on_takeback(position);
    }

    pub fn start(&self) -> bool {
        info!("[PlayerManager] Starting players");
        let white_ok = self.white.start();
        let black_ok = self.black.start();
        if !white_ok {
            error!("[PlayerManager] White player failed to start");
        }
        if !black_ok {
            error!("[PlayerManager] Black player failed to start");
        }
        white_ok && black_ok
    }

    pub fn stop(&self) {
        info!("[PlayerManager] Stopping players");
        self.white.stop();
        self.black.stop();
    }

    pub fn is_ready(&self) -> bool {
        self.white.is_ready() && self.black.is_ready()
    }

    pub fn supports_takeback(&self) -> bool {
        self.white.capabilities().supports_takeback && self.black.capabilities().supports_takeback
    }

    pub fn is_two_human(&self) -> bool {
        self.white.player_type() == PlayerType::Human
            && self.black.player_type() == PlayerType::Human
    }

    pub fn has_engine(&self) -> bool {
        self.white.player_type() == PlayerType::Engine
            || self.black.player_type() == PlayerType::Engine
    }

    pub fn has_lichess(&self) -> bool {
        self.white.player_type() == PlayerType::Lichess
            || self.black.player_type() == PlayerType::Lichess
    }

    pub fn get_info(&self) -> (PlayerInfo, PlayerInfo) {
        (self.white.get_info(), self.black.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::human::HumanPlayer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ready_callback_fires_once_when_both_players_ready() {
        let white: Arc<dyn Player> = Arc::new(HumanPlayer::new("White"));
        let black: Arc<dyn Player> = Arc::new(HumanPlayer::new("Black"));
        let manager = PlayerManager::new(white, black);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        manager.set_callbacks(ManagerCallbacks {
            ready: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        });

        assert!(manager.start());
        assert!(manager.is_ready());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn colors_are_assigned_on_construction() {
        let white: Arc<dyn Player> = Arc::new(HumanPlayer::new("a"));
        let black: Arc<dyn Player> = Arc::new(HumanPlayer::new("b"));
        let manager = PlayerManager::new(white, black);
        assert_eq!(manager.white_player().color(), Some(Color::White));
        assert_eq!(manager.black_player().color(), Some(Color::Black));
        assert!(manager.is_two_human());
        assert!(manager.supports_takeback());
    }

    #[test]
    fn piece_events_route_to_side_to_move() {
        let white: Arc<dyn Player> = Arc::new(HumanPlayer::new("White"));
        let black: Arc<dyn Player> = Arc::new(HumanPlayer::new("Black"));
        let manager = PlayerManager::new(white, black);
        manager.start();

        let position = Chess::default();
        let _ = manager.on_piece_event(PieceEvent::Lift, Square::E2, &position);
        // White is tracking the lift; black is not.
        assert_eq!(manager.white_player().core().lifted_squares(), vec![Square::E2]);
        assert!(manager.black_player().core().lifted_squares().is_empty());
    }
}
