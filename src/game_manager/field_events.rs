//! Physical field event routing (LIFT/PLACE).
//!
//! Ordering of the checks matters and is part of the behavioral contract:
//! resign-menu override, late-castling completion, correction mode (with
//! the pending-move shortcut), no-player handling, pending-move state
//! shortcuts and guards, rook-first castling tracking, and finally the
//! player manager.

use log::{debug, info, warn};
use shakmaty::{Role, Square};

use crate::events::{GameEvent, PieceEvent};
use crate::players::PieceEventOutcome;
use crate::state::{states_match, BoardMove};

use super::move_state::castling_lane_for_rook;
use super::session::GameSession;

impl GameSession {
    pub fn process_field_event(&mut self, event: PieceEvent, square: Square, seconds: f64) {
        let is_lift = event.is_lift();

        // One-shot stale-PLACE suppression window from a correction exit.
        self.stale_place_suppressed = self.correction_mode.just_exited();
        self.correction_mode.clear_exit_flag();

        // LIFT reads the color from the board; PLACE reuses the lift color,
        // because on captures the destination square still holds the
        // opponent's piece until the push.
        let piece_color = if is_lift {
            let color = self.ctx.game_state.with_board(|board| board.color_at(square));
            if color.is_some() {
                self.move_state.source_piece_color = color;
            }
            color
        } else {
            self.move_state
                .source_piece_color
                .or_else(|| self.ctx.game_state.with_board(|board| board.color_at(square)))
        };

        self.ctx.fire_event(if is_lift {
            GameEvent::PieceLifted { square, seconds }
        } else {
            GameEvent::PiecePlaced { square, seconds }
        });

        info!(
            "[GameManager.receive_field] event={:?} square={} color={:?} seconds={}",
            event, square, piece_color, seconds
        );

        if self.kings_in_center_menu_active || self.king_lift_resign_menu_active {
            self.handle_event_with_resign_menu(is_lift);
            return;
        }

        // During late castling the board is intentionally transitional.
        if self.move_state.late_castling_in_progress {
            if !is_lift {
                self.handle_late_castling_place(square);
            }
            return;
        }

        if self.correction_mode.is_active() {
            // Even in correction mode, a PLACE that produces exactly the
            // expected post-move occupancy completes the pending move. This
            // prevents a deadlock when an unrelated bump triggered
            // correction mid-sequence.
            if !is_lift {
                if let Some(expected) = self.expected_move() {
                    let is_capture = self.is_expected_capture(&expected);
                    let gate = !is_capture
                        || self.move_state.has_seen_capture_square_event(expected.to);
                    if gate && self.physical_matches_after(&expected) {
                        info!(
                            "[GameManager.receive_field] (correction) Board matches state after {} - executing pending move",
                            expected
                        );
                        self.on_player_move(expected);
                        return;
                    }
                }
            }
            self.handle_field_event_in_correction_mode(!is_lift);
            return;
        }

        if self.ctx.players().is_none() {
            if !is_lift {
                self.handle_piece_event_without_player(square);
            }
            return;
        }

        // Pending-move bookkeeping and board-state shortcut. The shortcut
        // MUST run before forwarding to the player, which could otherwise
        // form an incorrect move from a noisy event sequence.
        let expected = self.expected_move();
        let mut expected_capture = false;
        let mut capture_square: Option<Square> = None;
        if let Some(expected) = expected {
            expected_capture = self.is_expected_capture(&expected);
            capture_square = expected_capture.then_some(expected.to);

            if expected_capture && square == expected.to {
                if !self.move_state.has_seen_capture_square_event(expected.to) {
                    self.move_state.record_capture_square_event(expected.to);
                    debug!(
                        "[GameManager.receive_field] Recorded {:?} event on capture square {}",
                        event, expected.to
                    );
                }
            }

            if !is_lift {
                let can_shortcut = !expected_capture
                    || self.move_state.has_seen_capture_square_event(expected.to);
                if can_shortcut && self.physical_matches_after(&expected) {
                    info!(
                        "[GameManager.receive_field] Board matches state after {} - executing pending move directly",
                        expected
                    );
                    self.on_player_move(expected);
                    return;
                } else if expected_capture && !can_shortcut {
                    debug!(
                        "[GameManager.receive_field] Pending capture {} - waiting for event on capture square",
                        expected
                    );
                }
            }
        }

        // Rook-first castling tracking; consumes the king lift that arms
        // late castling.
        if is_lift && self.handle_castling_tracking_lift(square, piece_color) {
            return;
        }

        let pending_source_lifted = self.move_state.pending_move_source_lifted.is_some()
            && (!expected_capture
                || capture_square
                    .map(|sq| self.move_state.has_seen_capture_square_event(sq))
                    .unwrap_or(false));

        // Wrong-piece guard: during a pending move only the source square
        // (and the capture target) may be lifted.
        if is_lift && piece_color.is_some() && !pending_source_lifted {
            if let Some(expected) = expected {
                let valid_lift =
                    square == expected.from || (expected_capture && Some(square) == capture_square);
                if valid_lift && square == expected.from {
                    self.move_state.pending_move_source_lifted = Some(square);
                    debug!(
                        "[GameManager.receive_field] Pending move source {} lifted - bumps allowed",
                        square
                    );
                }
                if !valid_lift {
                    warn!(
                        "[GameManager.receive_field] Wrong piece lifted at {} for pending move {} - entering correction mode",
                        square, expected
                    );
                    self.fail_into_correction();
                    return;
                }
            }
        }

        // No-legal-move guard: any lifted piece without a legal move is a
        // mistake (opponent's piece, pinned piece), unless the pending-move
        // allowances apply.
        if is_lift && piece_color.is_some() {
            let mut allow = false;
            if expected.is_some() {
                if expected_capture && Some(square) == capture_square {
                    allow = true;
                } else {
                    allow = pending_source_lifted;
                }
            }
            if !allow {
                // Lifting the victim of an available capture is the normal
                // first step of a two-lift capture sequence.
                let has_moves = self.ctx.game_state.with_board(|board| {
                    board.has_legal_move_from(square) || board.is_capture_target(square)
                });
                if !has_moves {
                    warn!(
                        "[GameManager.receive_field] Piece at {} has no legal moves - entering correction mode",
                        square
                    );
                    self.fail_into_correction();
                    return;
                }
            }
        }

        if !is_lift {
            self.handle_castling_tracking_place(square);
        }

        // Forward to the side to move.
        let position = self.position();
        let outcome = match self.ctx.players() {
            Some(players) => players.on_piece_event(event, square, &position),
            None => PieceEventOutcome::Nothing,
        };
        match outcome {
            PieceEventOutcome::Nothing => {}
            PieceEventOutcome::Submit(mv) => {
                self.on_player_move(mv);
            }
            PieceEventOutcome::Error(kind) => self.on_player_error(kind),
        }

        if is_lift {
            self.handle_king_lift_resign(square);
            return;
        }

        // PLACE: any placement cancels the king-lift resign timer.
        self.cancel_king_lift_on_place();
        self.move_state.source_piece_color = None;
    }

    /// Resign menu (kings-in-center or king-lift) is showing.
    fn handle_event_with_resign_menu(&mut self, is_lift: bool) {
        let expected = self.expected_state();
        let current = self.ctx.board.chess_state();

        if let Some(current) = &current {
            if states_match(current, &expected) {
                info!("[GameManager.receive_field] Board corrected while resign menu active - cancelling menu");
                self.cancel_resign_menus();
                return;
            }
        }

        if is_lift {
            info!("[GameManager.receive_field] Piece lifted while resign menu active - correction mode");
            self.cancel_resign_menus();
            self.enter_correction_mode();
            if let Some(current) = current {
                self.provide_correction_guidance(&current, &expected);
            }
        }
        // PLACE events while the menu shows are otherwise ignored.
    }

    fn cancel_resign_menus(&mut self) {
        if self.kings_in_center_menu_active {
            self.kings_in_center_menu_active = false;
            if let Some(callback) = self
                .ctx
                .ui
                .on_kings_in_center_cancel
                .lock()
                .unwrap()
                .clone()
            {
                callback();
            }
        }
        if self.king_lift_resign_menu_active {
            self.king_lift_resign_menu_active = false;
            self.move_state.cancel_king_lift_timer();
            self.move_state.king_lifted_square = None;
            self.move_state.king_lifted_color = None;
            if let Some(callback) = self
                .ctx
                .ui
                .on_king_lift_resign_cancel
                .lock()
                .unwrap()
                .clone()
            {
                callback();
            }
        }
    }

    /// True when nothing is mid-flight: no lifted squares at the current
    /// player and no armed castling tracking.
    fn no_move_in_progress(&self) -> bool {
        let player_idle = match self.ctx.players() {
            Some(players) => players
                .current_player(&self.position())
                .core()
                .lifted_squares()
                .is_empty(),
            None => true,
        };
        player_idle
            && self.move_state.source_square.is_none()
            && self.move_state.castling_rook_source.is_none()
    }

    fn is_expected_capture(&self, expected: &BoardMove) -> bool {
        self.ctx
            .game_state
            .with_board(|board| board.is_capture(expected))
    }

    /// Does the full physical occupancy equal the occupancy after applying
    /// the expected move? A promotion move missing its piece letter is
    /// applied as a queen promotion; occupancy does not depend on the piece.
    pub(crate) fn physical_matches_after(&self, expected: &BoardMove) -> bool {
        let after = self.ctx.game_state.with_board(|board| {
            board.presence_after(expected).or_else(|| {
                if expected.promotion.is_none() {
                    board.presence_after(&BoardMove::with_promotion(
                        expected.from,
                        expected.to,
                        Role::Queen,
                    ))
                } else {
                    None
                }
            })
        });
        let Some(after) = after else {
            return false;
        };
        let Some(current) = self.ctx.board.chess_state() else {
            return false;
        };
        states_match(&current, &after)
    }

    // ------------------------------------------------------------------
    // Rook-first castling tracking
    // ------------------------------------------------------------------

    /// LIFT-side castling tracking.
    ///
    /// # Returns
    /// `true` when the event armed late castling and is fully consumed.
    fn handle_castling_tracking_lift(
        &mut self,
        square: Square,
        piece_color: Option<shakmaty::Color>,
    ) -> bool {
        let turn = self.ctx.game_state.turn();
        let is_current = piece_color == Some(turn);

        if self.move_state.castling_rook_placed && !self.move_state.late_castling_in_progress {
            if let Some(rook_source) = self.move_state.castling_rook_source {
                if let Some(lane) = castling_lane_for_rook(rook_source) {
                    if square == lane.king_home {
                        let is_matching_king = self.ctx.game_state.with_board(|board| {
                            board
                                .piece_at(square)
                                .map(|piece| {
                                    piece.role == Role::King
                                        && board.king_square(piece.color) == Some(lane.king_home)
                                })
                                .unwrap_or(false)
                        });
                        if is_matching_king {
                            info!(
                                "[GameManager.receive_field] Late castling detected - king lifted from {} after rook move",
                                square
                            );
                            self.move_state.late_castling_in_progress = true;
                            self.move_state.source_square = Some(square);
                            self.move_state.legal_destination_squares =
                                vec![square, lane.king_dest];
                            return true;
                        }
                    } else if piece_color == Some(lane.color) && self.no_move_in_progress() {
                        // Only the castling side abandons the castle by
                        // reaching for another piece; the opponent's reply
                        // must leave the tracking armed.
                        info!(
                            "[GameManager.receive_field] Late castling abandoned - different piece lifted from {}",
                            square
                        );
                        self.move_state.castling_rook_source = None;
                        self.move_state.castling_rook_placed = false;
                    }
                }
            }
        }

        // A rook lifted from its home square while castling is legal may be
        // the start of a rook-first castle.
        if is_current
            && self.move_state.castling_rook_source.is_none()
            && !self.move_state.castling_rook_placed
            && self.move_state.is_rook_castling_square(square)
        {
            let starts_castling = self.ctx.game_state.with_board(|board| {
                let is_rook = board
                    .piece_at(square)
                    .map(|piece| piece.role == Role::Rook)
                    .unwrap_or(false);
                if !is_rook {
                    return false;
                }
                castling_lane_for_rook(square)
                    .and_then(|lane| BoardMove::parse(lane.king_uci).ok())
                    .map(|castle| board.is_legal(&castle))
                    .unwrap_or(false)
            });
            if starts_castling {
                info!(
                    "[GameManager.receive_field] Potential castling rook lifted from {}",
                    square
                );
                self.move_state.castling_rook_source = Some(square);
            }
        }

        if !is_current && piece_color.is_some() {
            self.move_state.opponent_source_square = Some(square);
        }
        false
    }

    /// PLACE-side castling tracking; runs before the player forms the move
    /// so the rook's regular move executes with the tracking armed.
    fn handle_castling_tracking_place(&mut self, square: Square) {
        if let Some(rook_source) = self.move_state.castling_rook_source {
            if !self.move_state.castling_rook_placed {
                if square == rook_source {
                    info!(
                        "[GameManager.receive_field] Rook returned to {} - cancelling potential castling",
                        square
                    );
                    self.move_state.castling_rook_source = None;
                } else if self
                    .move_state
                    .is_valid_rook_castling_destination(rook_source, square)
                {
                    info!(
                        "[GameManager.receive_field] Rook moved to castling position {} - tracking for late castling",
                        square
                    );
                    self.move_state.castling_rook_placed = true;
                } else {
                    self.move_state.castling_rook_source = None;
                }
            }
        }

        if let Some(opponent_source) = self.move_state.opponent_source_square {
            if square == opponent_source {
                self.move_state.opponent_source_square = None;
            }
        }
    }

    /// PLACE while a late castle is armed: complete on the king's castling
    /// square, cancel on the king's home square, correct otherwise.
    fn handle_late_castling_place(&mut self, square: Square) {
        let Some(rook_source) = self.move_state.castling_rook_source else {
            self.move_state.late_castling_in_progress = false;
            return;
        };
        let Some(lane) = castling_lane_for_rook(rook_source) else {
            self.move_state.late_castling_in_progress = false;
            return;
        };

        if square == lane.king_dest {
            info!(
                "[GameManager.receive_field] Late castling completion: king placed on {}",
                square
            );
            self.try_late_castling(lane);
        } else if Some(square) == self.move_state.source_square {
            info!(
                "[GameManager.receive_field] Late castling cancelled: king returned to {}",
                square
            );
            self.move_state.reset();
            self.ctx.led().off();
        } else {
            warn!(
                "[GameManager.receive_field] Late castling failed: king placed on unexpected square {}",
                square
            );
            self.beep_wrong();
            self.enter_correction_mode();
            let expected = self.expected_state();
            if let Some(current) = self.ctx.board.chess_state() {
                self.provide_correction_guidance(&current, &expected);
            }
            self.move_state.reset();
        }
    }
}
