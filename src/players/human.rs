//! A player whose moves come from piece events on the physical board.

use log::{debug, info};
use shakmaty::Chess;

use crate::state::BoardMove;

use super::base::{Player, PlayerCore, PlayerInfo, PlayerState, PlayerType};

pub struct HumanPlayer {
    core: PlayerCore,
}

impl HumanPlayer {
    pub fn new(name: &str) -> Self {
        HumanPlayer {
            core: PlayerCore::new(name),
        }
    }
}

impl Default for HumanPlayer {
    fn default() -> Self {
        Self::new("Human")
    }
}

impl Player for HumanPlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    fn player_type(&self) -> PlayerType {
        PlayerType::Human
    }

    /// Always succeeds immediately; a human is ready to play.
    fn start(&self) -> bool {
        info!("[HumanPlayer] {} ready", self.core.name());
        let _ = self.core.set_state(PlayerState::Initializing);
        let _ = self.core.set_state(PlayerState::Ready);
        true
    }

    fn stop(&self) {
        debug!("[HumanPlayer] Stopping");
        let _ = self.core.set_state(PlayerState::Stopped);
    }

    fn do_request_move(&self, _position: &Chess) {
        self.core.reset_lifted();
        debug!("[HumanPlayer] Turn started, waiting for piece events");
    }

    fn on_move_made(&self, mv: &BoardMove, _position_after: &Chess) {
        debug!("[HumanPlayer] Move made: {}", mv);
        self.core.reset_lifted();
    }

    fn get_info(&self) -> PlayerInfo {
        let mut info = PlayerInfo {
            name: self.name(),
            color: self.color(),
            player_type: self.player_type(),
            state: self.state(),
            error: self.core.error_message(),
            description: String::new(),
        };
        info.description = "Human player (physical board)".to_string();
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PieceEvent;
    use crate::players::base::PieceEventOutcome;
    use shakmaty::Square;

    #[test]
    fn human_submits_any_formed_move() {
        let player = HumanPlayer::default();
        assert!(player.start());
        assert!(player.is_ready());

        let position = Chess::default();
        assert_eq!(
            player.on_piece_event(PieceEvent::Lift, Square::E2, &position),
            PieceEventOutcome::Nothing
        );
        match player.on_piece_event(PieceEvent::Place, Square::E4, &position) {
            PieceEventOutcome::Submit(mv) => assert_eq!(mv.uci(), "e2e4"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn human_capabilities_allow_everything() {
        let player = HumanPlayer::default();
        let caps = player.capabilities();
        assert!(caps.can_resign);
        assert!(caps.supports_takeback);
        assert!(caps.supports_late_castling);
    }
}
