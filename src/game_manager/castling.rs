//! Rook-first and late castling.
//!
//! The chess library represents castling as a king move (e1g1). When the
//! user moves the rook first, the rook move executes as a regular move and
//! is tracked; a later king move to the castling square undoes the rook
//! move (and the opponent's reply, if one landed in between), verifies that
//! castling is legal, and plays the real castling move. The takeback
//! callback re-fires when a reply was undone so an engine opponent can
//! recompute.

use log::{error, info, warn};

use crate::state::BoardMove;

use super::move_state::CastlingLane;
use super::session::GameSession;

impl GameSession {
    /// Complete a late castle for the given lane. The rook move must be the
    /// last or second-to-last move on the stack.
    ///
    /// # Returns
    /// `true` when the castling move was executed.
    pub fn try_late_castling(&mut self, lane: &'static CastlingLane) -> bool {
        let stack_tail = self.stack_tail(2);
        let Some(position_from_top) = stack_tail.iter().position(|uci| uci == lane.rook_uci)
        else {
            error!(
                "[GameManager.late_castling] Rook move {} not found in recent moves (last: {:?})",
                lane.rook_uci, stack_tail
            );
            self.beep_wrong();
            self.move_state.reset();
            return false;
        };
        let moves_to_undo = position_from_top + 1;
        info!(
            "[GameManager.late_castling] Undoing {} move(s) to correct castling",
            moves_to_undo
        );

        let mut undone: Vec<String> = Vec::new();
        for _ in 0..moves_to_undo {
            match self.ctx.game_state.pop_move() {
                Ok(uci) => {
                    info!("[GameManager.late_castling] Undone move: {}", uci);
                    undone.push(uci);
                }
                Err(e) => {
                    error!("[GameManager.late_castling] Pop failed: {}", e);
                    self.beep_wrong();
                    self.move_state.reset();
                    return false;
                }
            }
            let game_db_id = self.ctx.game_db_id();
            if let Some(store) = self.ctx.store.lock().unwrap().as_ref() {
                if game_db_id >= 0 {
                    if let Err(e) = store.delete_last_move(game_db_id) {
                        error!(
                            "[GameManager.late_castling] Error removing move from database: {}",
                            e
                        );
                    }
                }
            }
        }

        let castle = BoardMove::parse(lane.king_uci).expect("castling lane uci");
        let castle_legal = self
            .ctx
            .game_state
            .with_board(|board| board.is_legal(&castle));
        if !castle_legal {
            error!(
                "[GameManager.late_castling] Castling {} not legal after undo",
                lane.king_uci
            );
            // Restore the undone moves, oldest first.
            for uci in undone.iter().rev() {
                match BoardMove::parse(uci) {
                    Ok(mv) => {
                        if let Err(e) = self.ctx.game_state.push_move(&mv) {
                            error!("[GameManager.late_castling] Restore push failed: {}", e);
                        }
                    }
                    Err(e) => error!("[GameManager.late_castling] Restore parse failed: {}", e),
                }
            }
            self.beep_wrong();
            self.enter_correction_mode();
            let expected = self.expected_state();
            if let Some(current) = self.ctx.board.chess_state() {
                self.provide_correction_guidance(&current, &expected);
            }
            self.move_state.reset();
            return false;
        }

        let undid_reply = moves_to_undo > 1;

        // Suppress post-move physical validation; the board intentionally
        // differs until the user finishes shuffling the pieces.
        self.move_state.late_castling_in_progress = true;
        let executed = self.execute_complete_move(castle);
        if !executed {
            warn!("[GameManager.late_castling] Castling execution failed");
            return false;
        }
        // The castle consumed the tracked rook move.
        self.move_state.castling_rook_source = None;
        self.move_state.castling_rook_placed = false;
        info!(
            "[GameManager.late_castling] Castling {} executed successfully",
            lane.king_uci
        );

        if undid_reply {
            if let Some(takeback) = &self.ctx.callbacks.takeback {
                info!("[GameManager.late_castling] Calling takeback callback to re-trigger engine");
                takeback();
            }
        }
        true
    }

    /// UCI strings of the newest `n` moves, newest first.
    fn stack_tail(&self, n: usize) -> Vec<String> {
        self.ctx
            .game_state
            .with_board(|board| board.recent_moves(n))
    }
}
