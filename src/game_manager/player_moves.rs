//! The player-submitted move pipeline.
//!
//! Validation and execution of a move a player submitted after piece events:
//! destination-only recovery (missed LIFT), promotion completion, legality
//! check, late-castling fallback, and the immediate-feedback execute path.

use log::{error, info, warn};
use shakmaty::{Color, Role, Square};

use crate::state::{BoardMove, BOARD_SIZE, BOARD_WIDTH};

use super::session::GameSession;

impl GameSession {
    /// Handle a move submitted by a player.
    ///
    /// # Returns
    /// `true` when the move was accepted and executed.
    pub fn on_player_move(&mut self, mv: BoardMove) -> bool {
        info!("[GameManager.on_player_move] Received move: {}", mv);

        let mut mv = mv;
        if mv.is_destination_only() {
            match self.complete_destination_only_move(mv.to) {
                Some(completed) => {
                    info!(
                        "[GameManager.on_player_move] Completed destination-only move: {}",
                        completed
                    );
                    mv = completed;
                }
                None => {
                    warn!(
                        "[GameManager.on_player_move] Could not complete destination-only move to {}",
                        mv.to
                    );
                    return false;
                }
            }
        }

        if mv.promotion.is_none() {
            if let Some(promotion_move) = self.check_and_handle_promotion(&mv) {
                info!(
                    "[GameManager.on_player_move] Promotion handled: {} -> {}",
                    mv, promotion_move
                );
                mv = promotion_move;
            }
        }

        if self.ctx.game_state.with_board(|board| board.is_legal(&mv)) {
            info!("[GameManager.on_player_move] Legal move, executing: {}", mv);
            return self.execute_complete_move(mv);
        }

        // Late castling: the king arrives at its castling square after the
        // rook was already moved there as a regular move.
        let supports_late_castling = self
            .ctx
            .players()
            .map(|players| {
                players
                    .current_player(&self.position())
                    .capabilities()
                    .supports_late_castling
            })
            .unwrap_or(false);
        if supports_late_castling {
            if let Some(lane) = super::move_state::CASTLING_LANES
                .iter()
                .find(|lane| lane.king_uci == mv.uci())
            {
                info!(
                    "[GameManager.on_player_move] Late castling detected: {}",
                    mv
                );
                return self.try_late_castling(lane);
            }
        }

        warn!(
            "[GameManager.on_player_move] Illegal move: {}, entering correction mode",
            mv
        );
        self.beep_wrong();
        self.enter_correction_mode();

        let expected = self.expected_state();
        if let Some(current) = self.ctx.board.chess_state() {
            self.provide_correction_guidance(&current, &expected);
        }
        false
    }

    /// Execute a validated, complete move. Feedback (beep + target LED) is
    /// synchronous; everything else runs on the post-move worker.
    pub fn execute_complete_move(&mut self, mv: BoardMove) -> bool {
        if self.ctx.game_state.is_game_over() {
            warn!(
                "[GameManager.execute_complete_move] Attempted to execute move after game ended"
            );
            self.beep_wrong();
            self.ctx.led().off();
            self.move_state.reset();
            return false;
        }

        let target_square = mv.to;
        let fen_before_move = self.ctx.game_state.fen();
        let is_first_move = self.ctx.game_db_id() < 0;
        let late_castling_in_progress = self.move_state.late_castling_in_progress;

        let move_uci = match self.ctx.game_state.push_move(&mv) {
            Ok(uci) => uci,
            Err(e) => {
                error!(
                    "[GameManager.execute_complete_move] Chess library push failed: {}. Error: {}",
                    mv, e
                );
                self.beep_wrong();
                self.ctx.led().off();
                self.move_state.reset();
                return false;
            }
        };

        // Immediate feedback, bypassing the serial queue for latency.
        self.ctx.led().off();
        self.beep_general();
        self.ctx.led().single_fast(target_square, 1);

        let fen_after_move = self.ctx.game_state.fen();
        let position_after = self.position();

        let outcome = self.ctx.game_state.with_board(|board| board.outcome());
        let game_ended = outcome.is_some();
        let (result, termination) = match outcome {
            Some((result, termination)) => (Some(result), Some(termination)),
            None => (None, None),
        };

        // Players clear pending state before the next turn is requested.
        if let Some(players) = self.ctx.players() {
            players.on_move_made(&mv, &position_after);
        }

        // Preserve rook-first castling tracking across the rook's regular
        // move so a late king move can still complete the castle.
        let preserve_rook_source = self.move_state.castling_rook_source;
        let preserve_rook_placed = self.move_state.castling_rook_placed;
        self.move_state.reset();
        if preserve_rook_placed {
            self.move_state.castling_rook_source = preserve_rook_source;
            self.move_state.castling_rook_placed = preserve_rook_placed;
        }

        if !game_ended {
            self.switch_turn_with_event();
        }

        self.enqueue_post_move_tasks(
            move_uci,
            fen_before_move,
            fen_after_move,
            is_first_move,
            late_castling_in_progress,
            game_ended,
            result,
            termination,
        );
        true
    }

    /// Reconstruct the source of a destination-only submission: the unique
    /// square that is physically empty but logically occupied; ambiguity is
    /// resolved through legality.
    pub fn complete_destination_only_move(&mut self, destination: Square) -> Option<BoardMove> {
        let Some(current) = self.ctx.board.chess_state() else {
            warn!("[GameManager.destination_only] Could not get physical board state");
            return None;
        };
        let expected = self.expected_state();

        let mut sources: Vec<Square> = Vec::new();
        for i in 0..BOARD_SIZE {
            let square = Square::new(i as u32);
            if square == destination {
                continue;
            }
            if expected[i] == 1 && current[i] == 0 {
                sources.push(square);
            }
        }

        if sources.is_empty() {
            warn!(
                "[GameManager.destination_only] No source square found for destination {}",
                destination
            );
            return None;
        }

        if sources.len() > 1 {
            let legal_sources: Vec<Square> = self.ctx.game_state.with_board(|board| {
                sources
                    .iter()
                    .copied()
                    .filter(|&source| {
                        let plain = BoardMove::new(source, destination);
                        if board.is_legal(&plain) {
                            return true;
                        }
                        [Role::Queen, Role::Rook, Role::Bishop, Role::Knight]
                            .iter()
                            .any(|&role| {
                                board.is_legal(&BoardMove::with_promotion(
                                    source,
                                    destination,
                                    role,
                                ))
                            })
                    })
                    .collect()
            });
            if legal_sources.len() == 1 {
                info!(
                    "[GameManager.destination_only] Disambiguated to legal source: {}",
                    legal_sources[0]
                );
                sources = legal_sources;
            } else {
                warn!(
                    "[GameManager.destination_only] Ambiguous sources for destination {}",
                    destination
                );
                return None;
            }
        }

        let completed = BoardMove::new(sources[0], destination);
        info!(
            "[GameManager.destination_only] Missed lift recovery: completed move {}",
            completed
        );
        Some(completed)
    }

    /// If the move is a pawn landing on the promotion rank without a
    /// promotion piece, ask the UI for one (queen when no callback is set).
    pub fn check_and_handle_promotion(&mut self, mv: &BoardMove) -> Option<BoardMove> {
        let piece = self
            .ctx
            .game_state
            .with_board(|board| board.piece_at(mv.from))?;
        if piece.role != Role::Pawn {
            return None;
        }
        let to_rank = usize::from(mv.to) / BOARD_WIDTH;
        let is_white_promotion = piece.color == Color::White && to_rank == 7;
        let is_black_promotion = piece.color == Color::Black && to_rank == 0;
        if !(is_white_promotion || is_black_promotion) {
            return None;
        }

        info!(
            "[GameManager.check_and_handle_promotion] Promotion detected for {}",
            mv
        );
        self.beep_general();

        self.is_showing_promotion = true;
        let choice = match self.ctx.ui.on_promotion_needed.lock().unwrap().clone() {
            Some(callback) => callback(is_white_promotion),
            None => {
                warn!("[GameManager.check_and_handle_promotion] No promotion callback, defaulting to queen");
                'q'
            }
        };
        self.is_showing_promotion = false;

        let role = Role::from_char(choice.to_ascii_lowercase()).unwrap_or(Role::Queen);
        let promotion_move = BoardMove::with_promotion(mv.from, mv.to, role);
        info!(
            "[GameManager.check_and_handle_promotion] Created promotion move: {}",
            promotion_move
        );
        Some(promotion_move)
    }
}
