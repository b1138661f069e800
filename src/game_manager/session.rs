//! The game thread.
//!
//! `GameSession` owns all mutable game-interaction state (move state,
//! correction mode, menus) and is the single consumer of the command
//! channel. The database connection is opened inside this thread and torn
//! down with it. Shared handles (`SharedCtx`) are cloneable so post-move
//! closures on the task worker can reach the store, callbacks and LEDs.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use shakmaty::{Chess, Color, Position, Square};

use crate::board_driver::{BeepContext, BoardDriver, Key, Sound};
use crate::broadcast;
use crate::clock::{ClockService, ScoreSource};
use crate::database::{GameRecord, GameStore};
use crate::events::{GameEvent, Termination};
use crate::led::LedCallbacks;
use crate::players::{PlayerErrorKind, PlayerManager};
use crate::state::{is_starting_position, states_match, BoardMove, ChessGameState, PresenceState};

use super::command::{GameCallbacks, GameCommand, GameInfo, GameManagerConfig, UiCallbacks};
use super::correction_guidance::{provide_correction_guidance, GuidanceOutcome};
use super::correction_mode::CorrectionMode;
use super::move_state::MoveState;
use super::task_worker::GameTaskWorker;

/// Handles shared between the facade, the game thread and post-move tasks.
#[derive(Clone)]
pub(crate) struct SharedCtx {
    pub config: GameManagerConfig,
    pub board: Arc<dyn BoardDriver>,
    pub game_state: Arc<ChessGameState>,
    pub led: Arc<Mutex<Option<Arc<dyn LedCallbacks>>>>,
    pub players: Arc<Mutex<Option<Arc<PlayerManager>>>>,
    pub clock: Arc<Mutex<Option<Arc<dyn ClockService>>>>,
    pub score: Arc<Mutex<Option<Arc<dyn ScoreSource>>>>,
    pub ui: Arc<UiCallbacks>,
    pub game_info: Arc<Mutex<GameInfo>>,
    pub cached_result: Arc<Mutex<Option<String>>>,
    pub store: Arc<Mutex<Option<GameStore>>>,
    pub game_db_id: Arc<Mutex<i64>>,
    pub callbacks: GameCallbacks,
    pub tx: Sender<GameCommand>,
}

impl SharedCtx {
    pub fn led(&self) -> Arc<dyn LedCallbacks> {
        self.led
            .lock()
            .unwrap()
            .clone()
            .expect("LED callbacks not set. Call set_led_callbacks() before starting game.")
    }

    pub fn led_opt(&self) -> Option<Arc<dyn LedCallbacks>> {
        self.led.lock().unwrap().clone()
    }

    pub fn players(&self) -> Option<Arc<PlayerManager>> {
        self.players.lock().unwrap().clone()
    }

    pub fn fire_event(&self, event: GameEvent) {
        if let Some(callback) = &self.callbacks.event {
            callback(event);
        }
    }

    pub fn game_db_id(&self) -> i64 {
        *self.game_db_id.lock().unwrap()
    }

    pub fn clock_times_for_db(&self) -> (Option<i64>, Option<i64>) {
        match self.clock.lock().unwrap().as_ref() {
            Some(clock) => {
                let (white, black) = clock.get_times();
                (Some(white), Some(black))
            }
            None => (None, None),
        }
    }

    /// Evaluation score in centipawns for persistence, if a source is wired.
    pub fn eval_score_for_db(&self) -> Option<i64> {
        self.score
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|source| source.score_pawns())
            .map(|pawns| (pawns * 100.0) as i64)
    }

    /// Record the game result: database row, cached copy, observable state
    /// and the event callback, in that order.
    pub fn update_game_result(&self, result: &str, termination: Termination, context: &str) {
        let game_db_id = self.game_db_id();
        if let Some(store) = self.store.lock().unwrap().as_ref() {
            if game_db_id >= 0 {
                match store.update_result(game_db_id, result) {
                    Ok(true) => info!(
                        "[GameManager.{}] Updated game result in database: id={}, result={}, termination={}",
                        context, game_db_id, result, termination
                    ),
                    Ok(false) => warn!(
                        "[GameManager.{}] Game with id {} not found in database",
                        context, game_db_id
                    ),
                    Err(e) => error!(
                        "[GameManager.{}] Error updating game result in database: {}",
                        context, e
                    ),
                }
            } else {
                warn!(
                    "[GameManager.{}] Skipping database update: game not initialized. Result: {}",
                    context, result
                );
            }
        }
        *self.cached_result.lock().unwrap() = Some(result.to_string());
        self.game_state.set_result(result, termination);
        self.fire_event(GameEvent::Termination(termination));
    }
}

pub(crate) struct GameSession {
    pub ctx: SharedCtx,
    pub move_state: MoveState,
    pub correction_mode: CorrectionMode,
    pub kings_in_center_menu_active: bool,
    pub king_lift_resign_menu_active: bool,
    pub pending_hint: Option<(Square, Square)>,
    pub is_showing_promotion: bool,
    /// One-shot: the correction mode was exited by the previous event, so a
    /// stale PLACE belonging to the correction may still arrive.
    pub stale_place_suppressed: bool,
    pub task_worker: GameTaskWorker,
}

pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Entry point of the game thread.
pub(crate) fn run_game_thread(ctx: SharedCtx, rx: Receiver<GameCommand>) {
    // The database connection must be created in this thread.
    if ctx.config.save_to_database {
        let open = match &ctx.config.database_path {
            Some(path) => GameStore::open(path),
            None => GameStore::open_default(),
        };
        match open {
            Ok(store) => {
                *ctx.store.lock().unwrap() = Some(store);
                info!("[GameManager.game_thread] Database session created");
            }
            Err(e) => {
                error!(
                    "[GameManager.game_thread] Database unavailable, persistence disabled: {}",
                    e
                );
            }
        }
    } else {
        info!("[GameManager.game_thread] Database disabled for this game");
    }

    if let Some(led) = ctx.led_opt() {
        led.off();
    }
    info!("[GameManager.game_thread] Ready to receive events");

    let mut session = GameSession {
        ctx: ctx.clone(),
        move_state: MoveState::new(),
        correction_mode: CorrectionMode::new(),
        kings_in_center_menu_active: false,
        king_lift_resign_menu_active: false,
        pending_hint: None,
        is_showing_promotion: false,
        stale_place_suppressed: false,
        task_worker: GameTaskWorker::start(),
    };

    while let Ok(command) = rx.recv() {
        match session.handle(command) {
            Flow::Continue => {}
            Flow::Stop => break,
        }
    }

    session.task_worker.stop();
    if let Some(led) = ctx.led_opt() {
        led.off();
    }
    *ctx.store.lock().unwrap() = None;
    info!("[GameManager.game_thread] Game thread finished");
}

impl GameSession {
    fn handle(&mut self, command: GameCommand) -> Flow {
        match command {
            GameCommand::Field {
                event,
                square,
                seconds,
            } => self.process_field_event(event, square, seconds),
            GameCommand::Key(key) => self.receive_key(key),
            GameCommand::ComputerMove { uci, forced } => self.computer_move(&uci, forced),
            GameCommand::PendingMove(mv) => self.on_pending_move(mv),
            GameCommand::SubmitMove { mv, reply } => {
                let accepted = self.on_player_move(mv);
                let _ = reply.send(accepted);
            }
            GameCommand::Resign { color } => self.handle_resign(color),
            GameCommand::Draw => self.handle_draw(),
            GameCommand::Flag { color } => self.handle_flag(color),
            GameCommand::SetPendingHint { from, to } => {
                debug!("[GameManager.set_pending_hint] Stored hint: {} -> {}", from, to);
                self.pending_hint = Some((from, to));
            }
            GameCommand::ClearPendingHint => {
                self.pending_hint = None;
            }
            GameCommand::RestorePendingMoveLeds => self.restore_pending_move_leds(),
            GameCommand::KingLiftExpired { color } => self.on_king_lift_expired(color),
            GameCommand::ResetKingsInCenterMenu => {
                self.kings_in_center_menu_active = false;
            }
            GameCommand::ResetKingLiftMenu => {
                self.king_lift_resign_menu_active = false;
            }
            GameCommand::PlayersReady => {
                info!("[GameManager] All players ready");
                if let Some(players) = self.ctx.players() {
                    players.request_move(&self.position());
                }
            }
            GameCommand::PostMoveValidationFailed { current } => {
                self.on_post_move_validation_failed(*current);
            }
            GameCommand::Sync(reply) => {
                self.task_worker.flush();
                let _ = reply.send(());
            }
            GameCommand::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------
    // Small helpers
    // ------------------------------------------------------------------

    pub fn position(&self) -> Chess {
        self.ctx.game_state.position()
    }

    pub fn expected_state(&self) -> PresenceState {
        self.ctx.game_state.presence()
    }

    pub fn beep_general(&self) {
        self.ctx.board.beep(Sound::General, BeepContext::GameEvent);
    }

    pub fn beep_wrong(&self) {
        self.ctx.board.beep(Sound::WrongMove, BeepContext::Error);
    }

    /// The move the user is currently expected to execute: the current
    /// player's pending move, or the externally forced move.
    pub fn expected_move(&self) -> Option<BoardMove> {
        if let Some(players) = self.ctx.players() {
            if let Some(pending) = players.current_pending_move(&self.position()) {
                return Some(pending);
            }
        }
        if self.move_state.is_forced_move && !self.move_state.computer_move_uci.is_empty() {
            return self
                .ctx
                .game_state
                .with_board(|board| board.parse_uci(&self.move_state.computer_move_uci).ok());
        }
        None
    }

    /// Fire the side-to-move event and prompt that player.
    pub fn switch_turn_with_event(&mut self) {
        let position = self.position();
        self.ctx.fire_event(if position.turn() == Color::White {
            GameEvent::WhiteTurn
        } else {
            GameEvent::BlackTurn
        });
        if let Some(players) = self.ctx.players() {
            players.request_move(&position);
        }
    }

    // ------------------------------------------------------------------
    // Correction mode
    // ------------------------------------------------------------------

    pub fn enter_correction_mode(&mut self) {
        let expected = self.expected_state();
        self.correction_mode.enter(expected);
        warn!(
            "[GameManager.enter_correction_mode] Entered correction mode (FEN: {})",
            self.ctx.game_state.fen()
        );
    }

    /// Exit correction mode and resume normal flow. Exactly one of
    /// {terminal check, forced-move LEDs, pending hint, turn event} runs,
    /// in that priority order.
    pub fn exit_correction_mode(&mut self) {
        self.correction_mode.exit();
        self.stale_place_suppressed = false;
        warn!("[GameManager.exit_correction_mode] Exited correction mode");

        self.ctx.led().off();
        self.move_state.source_square = None;
        self.move_state.legal_destination_squares.clear();
        self.move_state.opponent_source_square = None;

        // The restored position may already be terminal (loaded positions).
        if let Some((result, termination)) = self.ctx.game_state.outcome() {
            info!(
                "[GameManager.exit_correction_mode] Position is terminal: {} ({})",
                termination, result
            );
            self.pending_hint = None;
            if let Some(callback) = self.ctx.ui.on_terminal_position.lock().unwrap().clone() {
                callback(result, termination);
            }
            return;
        }

        if self.move_state.is_forced_move && !self.move_state.computer_move_uci.is_empty() {
            if let Ok(mv) = BoardMove::parse(&self.move_state.computer_move_uci) {
                self.ctx.led().from_to(mv.from, mv.to, 0);
                info!(
                    "[GameManager.exit_correction_mode] Restored forced move LEDs: {}",
                    self.move_state.computer_move_uci
                );
            }
        } else if let Some((from, to)) = self.pending_hint.take() {
            self.ctx.led().from_to_hint(from, to, 0);
            info!(
                "[GameManager.exit_correction_mode] Showing hint LEDs: {} -> {}",
                from, to
            );
        } else {
            self.switch_turn_with_event();
        }

        if let Some(players) = self.ctx.players() {
            players
                .current_player(&self.position())
                .on_correction_mode_exit();
        }
    }

    /// Run LED guidance; handles the kings-in-center gesture internally.
    pub fn provide_correction_guidance(
        &mut self,
        current: &PresenceState,
        expected: &PresenceState,
    ) {
        let detect_kings = self
            .ctx
            .ui
            .on_kings_in_center
            .lock()
            .unwrap()
            .is_some();
        let led = self.ctx.led();
        let outcome = self.ctx.game_state.with_board(|board| {
            provide_correction_guidance(led.as_ref(), board, current, expected, detect_kings)
        });
        if outcome == GuidanceOutcome::KingsInCenter {
            self.exit_correction_mode();
            self.ctx.led().off();
            self.move_state.reset();
            self.kings_in_center_menu_active = true;
            if let Some(callback) = self.ctx.ui.on_kings_in_center.lock().unwrap().clone() {
                callback();
            }
        }
    }

    /// Beep, enter correction mode and flash guidance.
    pub fn fail_into_correction(&mut self) {
        self.beep_wrong();
        self.enter_correction_mode();
        let expected = self.expected_state();
        if let Some(current) = self.ctx.board.chess_state() {
            self.provide_correction_guidance(&current, &expected);
        }
    }

    /// Field events while correction mode is active.
    pub fn handle_field_event_in_correction_mode(&mut self, is_place: bool) {
        if is_place {
            // Let sensors settle after placement; sliding pieces briefly
            // cover two squares.
            thread::sleep(self.ctx.config.sensor_settle);
        }

        let Some(current) = self.ctx.board.chess_state() else {
            return;
        };

        // A board set back to the starting position abandons the game.
        if is_starting_position(&current) {
            warn!(
                "[GameManager.correction] Starting position detected during correction mode - abandoning game"
            );
            self.exit_correction_mode();
            self.reset_game();
            return;
        }

        // The logical board is the authority and may have advanced while
        // correction was active; always re-derive the expected state.
        let expected = self.expected_state();
        self.correction_mode.refresh_expected_state(expected);

        if states_match(&current, &expected) {
            info!("[GameManager.correction] Physical board matches logical board, exiting correction mode");
            self.beep_general();
            self.exit_correction_mode();
            return;
        }

        self.provide_correction_guidance(&current, &expected);
    }

    // ------------------------------------------------------------------
    // Takeback
    // ------------------------------------------------------------------

    /// Detect and execute a takeback: the physical board equals the state
    /// before the last logical move.
    pub fn check_takeback(&mut self) -> bool {
        if self.ctx.callbacks.takeback.is_none() {
            return false;
        }
        if let Some(players) = self.ctx.players() {
            if !players.supports_takeback() {
                return false;
            }
        }
        let previous = self
            .ctx
            .game_state
            .with_board(|board| board.previous_presence());
        let Some(previous) = previous else {
            debug!("[GameManager.check_takeback] No moves to take back");
            return false;
        };
        let Some(current) = self.ctx.board.chess_state() else {
            warn!("[GameManager.check_takeback] Cannot check takeback: no board state");
            return false;
        };
        if !states_match(&current, &previous) {
            return false;
        }

        info!("[GameManager.check_takeback] Takeback detected - board matches previous state");
        self.ctx.led().off();

        // Preserve the forced move; the callback path may reset move state.
        let forced_uci = if self.move_state.is_forced_move {
            Some(self.move_state.computer_move_uci.clone())
        } else {
            None
        };

        {
            let game_db_id = self.ctx.game_db_id();
            if let Some(store) = self.ctx.store.lock().unwrap().as_ref() {
                if game_db_id >= 0 {
                    if let Err(e) = store.delete_last_move(game_db_id) {
                        error!("[GameManager.check_takeback] Error deleting last move: {}", e);
                    }
                }
            }
        }

        if let Err(e) = self.ctx.game_state.pop_move() {
            error!("[GameManager.check_takeback] Pop failed: {}", e);
            return false;
        }
        self.beep_general();

        let position = self.position();
        if let Some(players) = self.ctx.players() {
            players.on_takeback(&position);
        }
        if let Some(takeback) = &self.ctx.callbacks.takeback {
            takeback();
        }

        // Restore the forced move if it is still legal here.
        if let Some(uci) = forced_uci {
            let still_legal = self
                .ctx
                .game_state
                .with_board(|board| board.parse_uci(&uci).map(|mv| board.is_legal(&mv)))
                .unwrap_or(false);
            if still_legal {
                self.move_state.set_computer_move(&uci, true);
                if let Ok(mv) = BoardMove::parse(&uci) {
                    self.ctx.led().from_to(mv.from, mv.to, 0);
                    info!(
                        "[GameManager.check_takeback] Reapplied LEDs for forced move {} after takeback",
                        uci
                    );
                }
            } else {
                info!(
                    "[GameManager.check_takeback] Forced move {} no longer legal after takeback",
                    uci
                );
            }
        }

        // Post-takeback validation; skipped when the board is busy.
        if let Some(current) = self.ctx.board.chess_state_low_priority() {
            let expected = self.expected_state();
            if !states_match(&current, &expected) {
                info!("[GameManager.check_takeback] Board incorrect after takeback, entering correction mode");
                self.enter_correction_mode();
                self.provide_correction_guidance(&current, &expected);
            }
        }

        true
    }

    // ------------------------------------------------------------------
    // Game lifecycle
    // ------------------------------------------------------------------

    /// Abandon the current game: the physical board is back in the starting
    /// position. The persisted game (if any) is marked unfinished; a new
    /// game row is created on the next first move.
    pub fn reset_game(&mut self) {
        warn!("[GameManager.reset_game] Starting position detected - abandoning current game");

        if self.correction_mode.is_active() {
            self.exit_correction_mode();
        }

        {
            let game_db_id = self.ctx.game_db_id();
            if let Some(store) = self.ctx.store.lock().unwrap().as_ref() {
                if game_db_id >= 0 {
                    match store.game_result(game_db_id) {
                        Ok(None) => {
                            if let Err(e) = store.update_result(game_db_id, "*") {
                                warn!(
                                    "[GameManager.reset_game] Error marking game abandoned: {}",
                                    e
                                );
                            } else {
                                info!(
                                    "[GameManager.reset_game] Marked previous game (id={}) as abandoned",
                                    game_db_id
                                );
                            }
                        }
                        Ok(Some(_)) => {}
                        Err(e) => {
                            warn!("[GameManager.reset_game] Error reading game result: {}", e)
                        }
                    }
                }
            }
        }

        self.move_state.reset();
        self.ctx.game_state.reset();
        *self.ctx.cached_result.lock().unwrap() = None;
        self.is_showing_promotion = false;
        self.kings_in_center_menu_active = false;
        self.king_lift_resign_menu_active = false;
        self.ctx.led().off();
        *self.ctx.game_db_id.lock().unwrap() = -1;

        if let Some(players) = self.ctx.players() {
            players.on_new_game();
        }
        self.ctx.fire_event(GameEvent::NewGame);

        self.beep_general();
        thread::sleep(Duration::from_millis(300));
        self.beep_general();
        info!("[GameManager.reset_game] Game reset complete - new game will be created on first move");
    }

    /// Piece events with no player manager attached (setup mode).
    pub fn handle_piece_event_without_player(&mut self, square: Square) {
        let Some(current) = self.ctx.board.chess_state() else {
            return;
        };
        if is_starting_position(&current) {
            info!("[GameManager.no_player] Starting position detected");
            self.reset_game();
            return;
        }
        let expected = self.expected_state();
        if states_match(&current, &expected) {
            debug!("[GameManager.no_player] Board matches game state");
            self.ctx.led().off();
            return;
        }
        debug!("[GameManager.no_player] Board mismatch on {}", square);
        // No beep or correction for minor movements during setup.
    }

    // ------------------------------------------------------------------
    // Keys, resign, draw, flag
    // ------------------------------------------------------------------

    pub fn receive_key(&mut self, key: Key) {
        if key == Key::Back {
            if self.ctx.game_state.is_game_over() {
                info!("[GameManager] BACK pressed after game over - passing to external callback");
            } else if self.ctx.game_state.is_game_in_progress() {
                info!("[GameManager] BACK pressed during game - notifying display controller");
                if let Some(callback) = self.ctx.ui.on_back_pressed.lock().unwrap().clone() {
                    callback();
                }
                return;
            } else {
                info!("[GameManager] BACK pressed - no game in progress, passing to external callback");
            }
        }
        if let Some(callback) = &self.ctx.callbacks.key {
            callback(key);
        }
    }

    pub fn handle_resign(&mut self, resigning_color: Option<Color>) {
        info!("[GameManager] Processing resignation");
        let color = resigning_color.unwrap_or_else(|| self.ctx.game_state.turn());
        let result = match color {
            Color::White => "0-1",
            Color::Black => "1-0",
        };
        self.ctx
            .update_game_result(result, Termination::Resign, "handle_resign");
        if let Some(players) = self.ctx.players() {
            players.player(color).on_resign(color);
        }
        self.beep_general();
        self.ctx.led().off();
    }

    pub fn handle_draw(&mut self) {
        info!("[GameManager] Processing draw");
        self.ctx
            .update_game_result("1/2-1/2", Termination::Draw, "handle_draw");
        if let Some(players) = self.ctx.players() {
            players.white_player().on_draw_offer();
            players.black_player().on_draw_offer();
        }
        self.beep_general();
        self.ctx.led().off();
    }

    pub fn handle_flag(&mut self, flagged_color: Color) {
        let result = match flagged_color {
            Color::White => "0-1",
            Color::Black => "1-0",
        };
        info!(
            "[GameManager] {:?} flagged - {} wins on time",
            flagged_color,
            if result == "0-1" { "Black" } else { "White" }
        );
        self.ctx
            .update_game_result(result, Termination::TimeForfeit, "handle_flag");
        self.beep_general();
        self.ctx.led().off();
    }

    // ------------------------------------------------------------------
    // Forced moves and pending moves
    // ------------------------------------------------------------------

    /// Arm a forced move the user is expected to execute.
    pub fn computer_move(&mut self, uci: &str, forced: bool) {
        if self.ctx.game_state.is_game_over() {
            warn!("[GameManager.computer_move] Attempted to set forced move after game ended");
            self.beep_wrong();
            return;
        }
        if !self.move_state.set_computer_move(uci, forced) {
            return;
        }
        let legal = self
            .ctx
            .game_state
            .with_board(|board| board.parse_uci(uci).map(|mv| (mv, board.is_legal(&mv))));
        match legal {
            Ok((mv, true)) => {
                self.ctx.led().from_to(mv.from, mv.to, 0);
            }
            _ => {
                error!("[GameManager.computer_move] Illegal move: {}", uci);
                self.move_state.computer_move_uci.clear();
                self.move_state.is_forced_move = false;
                self.beep_wrong();
            }
        }
    }

    /// A non-human player announced the move it expects to be executed.
    pub fn on_pending_move(&mut self, mv: BoardMove) {
        info!("[GameManager.on_pending_move] Pending move: {}", mv);
        self.move_state.set_computer_move(&mv.uci(), true);
        broadcast::set_pending_move(Some(mv.uci()));
        self.ctx.led().from_to(mv.from, mv.to, 0);
    }

    pub fn restore_pending_move_leds(&mut self) {
        if self.move_state.is_forced_move && !self.move_state.computer_move_uci.is_empty() {
            if let Ok(mv) = BoardMove::parse(&self.move_state.computer_move_uci) {
                self.ctx.led().from_to(mv.from, mv.to, 0);
                info!(
                    "[GameManager.restore_pending_move_leds] Restored LEDs for {}",
                    self.move_state.computer_move_uci
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // King-lift resign
    // ------------------------------------------------------------------

    /// Arm the resign timer when a resignable king is lifted.
    pub fn handle_king_lift_resign(&mut self, square: Square) {
        let piece = self
            .ctx
            .game_state
            .with_board(|board| board.piece_at(square));
        let Some(piece) = piece else {
            return;
        };
        if piece.role != shakmaty::Role::King {
            return;
        }
        let king_color = piece.color;

        let can_resign = match self.ctx.players() {
            Some(players) => players.player(king_color).capabilities().can_resign,
            None => true,
        };
        if !can_resign {
            return;
        }

        self.move_state.cancel_king_lift_timer();
        self.move_state.king_lifted_square = Some(square);
        self.move_state.king_lifted_color = Some(king_color);

        let tx = self.ctx.tx.clone();
        self.move_state.king_lift_timer.arm(
            self.ctx.config.king_lift_timeout,
            Box::new(move || {
                let _ = tx.send(GameCommand::KingLiftExpired { color: king_color });
            }),
        );
        debug!(
            "[GameManager.handle_king_lift_resign] King lifted from {}, started resign timer",
            square
        );
    }

    fn on_king_lift_expired(&mut self, color: Color) {
        // Re-check: a PLACE may have raced the expiry.
        if self.move_state.king_lifted_square.is_none()
            || self.move_state.king_lifted_color != Some(color)
        {
            return;
        }
        info!(
            "[GameManager] King held off board - showing resign menu for {:?}",
            color
        );
        self.king_lift_resign_menu_active = true;
        if let Some(callback) = self.ctx.ui.on_king_lift_resign.lock().unwrap().clone() {
            callback(color);
        }
    }

    /// PLACE events cancel any armed resign timer and dismiss the menu.
    pub fn cancel_king_lift_on_place(&mut self) {
        if !self.move_state.king_lift_timer.is_armed()
            && self.move_state.king_lifted_square.is_none()
        {
            return;
        }
        self.move_state.cancel_king_lift_timer();
        debug!("[GameManager] Cancelled king-lift resign timer on PLACE");

        if self.king_lift_resign_menu_active {
            info!("[GameManager] King placed - cancelling resign menu");
            self.king_lift_resign_menu_active = false;
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
        self.move_state.king_lifted_square = None;
        self.move_state.king_lifted_color = None;
    }

    // ------------------------------------------------------------------
    // Player errors
    // ------------------------------------------------------------------

    pub fn on_player_error(&mut self, kind: PlayerErrorKind) {
        debug!("[GameManager.on_player_error] Player reported: {:?}", kind);
        match kind {
            PlayerErrorKind::PieceReturned => {
                // Not an error; if a pending move exists, restore its LEDs.
                if let Some(expected) = self.expected_move() {
                    debug!(
                        "[GameManager.on_player_error] Re-displaying pending move: {}",
                        expected
                    );
                    self.ctx.led().from_to(expected.from, expected.to, 0);
                    return;
                }
                self.ctx.led().off();
            }
            PlayerErrorKind::PlaceWithoutLift => {
                // Takeback first: at one ply the pre-move state IS the
                // starting position and must roll back, not reset.
                if self.check_takeback() {
                    info!("[GameManager.on_player_error] Takeback detected");
                    self.move_state.reset();
                    self.ctx.led().off();
                    return;
                }
                let current = self.ctx.board.chess_state();
                if let Some(current) = &current {
                    if is_starting_position(current) {
                        info!("[GameManager.on_player_error] Starting position detected - resetting game");
                        self.reset_game();
                        return;
                    }
                }
                if self.stale_place_suppressed {
                    info!("[GameManager.on_player_error] Ignoring stale PLACE event after correction exit");
                    return;
                }
                warn!("[GameManager.on_player_error] Extra piece on board - entering correction mode");
                self.beep_wrong();
                self.enter_correction_mode();
                let expected = self.expected_state();
                if let Some(current) = current {
                    self.provide_correction_guidance(&current, &expected);
                }
            }
            PlayerErrorKind::MoveMismatch | PlayerErrorKind::WrongPieceType => {
                warn!(
                    "[GameManager.on_player_error] Error: {:?} - entering correction mode",
                    kind
                );
                self.fail_into_correction();
            }
        }
    }

    fn on_post_move_validation_failed(&mut self, current: PresenceState) {
        let expected = self.expected_state();
        if states_match(&current, &expected) {
            return; // resolved in the meantime
        }
        if self.correction_mode.is_active() {
            return;
        }
        warn!("[GameManager.post_move] Physical board mismatch after move, entering correction mode");
        self.enter_correction_mode();
        self.provide_correction_guidance(&current, &expected);
    }

    // ------------------------------------------------------------------
    // Post-move side effects
    // ------------------------------------------------------------------

    /// Queue the ordered post-move side effects: database, move callback,
    /// physical validation, game end. Board feedback already happened
    /// synchronously in the execute path.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_post_move_tasks(
        &mut self,
        move_uci: String,
        fen_before_move: String,
        fen_after_move: String,
        is_first_move: bool,
        late_castling_in_progress: bool,
        game_ended: bool,
        result: Option<String>,
        termination: Option<Termination>,
    ) {
        let ctx = self.ctx.clone();
        self.task_worker.submit(move || {
            // 1. Database
            {
                let store_guard = ctx.store.lock().unwrap();
                if let Some(store) = store_guard.as_ref() {
                    let (white_clock, black_clock) = ctx.clock_times_for_db();
                    let eval_score = ctx.eval_score_for_db();
                    let info = ctx.game_info.lock().unwrap().clone();
                    let record = GameRecord {
                        id: None,
                        source: ctx.config.source.clone(),
                        event: info.event,
                        site: info.site,
                        round: info.round,
                        white: info.white,
                        black: info.black,
                        result: None,
                    };
                    let current_id = ctx.game_db_id();
                    match store.persist_move(
                        is_first_move,
                        current_id,
                        &record,
                        &fen_before_move,
                        &move_uci,
                        &fen_after_move,
                        white_clock,
                        black_clock,
                        eval_score,
                    ) {
                        Ok(game_id) => {
                            *ctx.game_db_id.lock().unwrap() = game_id;
                        }
                        Err(e) => {
                            error!("[GameManager.async] Database error: {}", e);
                        }
                    }
                }
            }

            // 2. Move callback (display update, emulator forwarding)
            if let Some(callback) = &ctx.callbacks.mv {
                callback(move_uci.clone());
            }

            // 3. Physical validation (low priority; yields to polling).
            if !late_castling_in_progress {
                if let Some(current) = ctx.board.chess_state_low_priority() {
                    let expected = ctx.game_state.presence();
                    if !states_match(&current, &expected) {
                        warn!(
                            "[GameManager.async] Physical board mismatch after {}, requesting correction",
                            move_uci
                        );
                        let _ = ctx.tx.send(GameCommand::PostMoveValidationFailed {
                            current: Box::new(current),
                        });
                    }
                }
            }

            // 4. Game end
            if game_ended {
                ctx.board.beep(Sound::General, BeepContext::GameEvent);
                if let (Some(result), Some(termination)) = (result, termination) {
                    ctx.update_game_result(&result, termination, "execute_move");
                }
            }
        });
    }
}
