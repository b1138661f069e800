//! Public game manager handle.
//!
//! Constructed once at startup and passed to whatever needs it; tests build
//! their own. All operations enqueue commands for the game thread, so they
//! are cheap and safe from any thread. Events received before
//! `subscribe_game` buffer in the channel and replay in order once the
//! game thread starts.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use shakmaty::{Chess, Color, Square};

use crate::board_driver::{BoardDriver, Key};
use crate::clock::{ClockService, ScoreSource};
use crate::database::GameStore;
use crate::events::{PieceEvent, Termination};
use crate::led::LedCallbacks;
use crate::players::{ManagerCallbacks, PlayerManager};
use crate::state::{BoardMove, ChessGameState};

use super::command::{
    EventCallback, GameCallbacks, GameCommand, GameInfo, GameManagerConfig, KeyCallback,
    MoveCallback, TakebackCallback, UiCallbacks,
};
use super::session::{run_game_thread, SharedCtx};

pub struct GameManager {
    config: GameManagerConfig,
    board: Arc<dyn BoardDriver>,
    game_state: Arc<ChessGameState>,
    led: Arc<Mutex<Option<Arc<dyn LedCallbacks>>>>,
    players: Arc<Mutex<Option<Arc<PlayerManager>>>>,
    clock: Arc<Mutex<Option<Arc<dyn ClockService>>>>,
    score: Arc<Mutex<Option<Arc<dyn ScoreSource>>>>,
    ui: Arc<UiCallbacks>,
    game_info: Arc<Mutex<GameInfo>>,
    cached_result: Arc<Mutex<Option<String>>>,
    store: Arc<Mutex<Option<GameStore>>>,
    game_db_id: Arc<Mutex<i64>>,
    tx: Mutex<Sender<GameCommand>>,
    rx: Mutex<Option<Receiver<GameCommand>>>,
    game_thread: Mutex<Option<(JoinHandle<()>, Receiver<()>)>>,
}

impl GameManager {
    pub fn new(board: Arc<dyn BoardDriver>, config: GameManagerConfig) -> Self {
        let (tx, rx) = channel();
        GameManager {
            config,
            board,
            game_state: Arc::new(ChessGameState::new()),
            led: Arc::new(Mutex::new(None)),
            players: Arc::new(Mutex::new(None)),
            clock: Arc::new(Mutex::new(None)),
            score: Arc::new(Mutex::new(None)),
            ui: Arc::new(UiCallbacks::default()),
            game_info: Arc::new(Mutex::new(GameInfo::default())),
            cached_result: Arc::new(Mutex::new(None)),
            store: Arc::new(Mutex::new(None)),
            game_db_id: Arc::new(Mutex::new(-1)),
            tx: Mutex::new(tx),
            rx: Mutex::new(Some(rx)),
            game_thread: Mutex::new(None),
        }
    }

    fn send(&self, command: GameCommand) {
        let _ = self.tx.lock().unwrap().send(command);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the game thread. The database session is created inside that
    /// thread when persistence is enabled.
    pub fn subscribe_game(
        &self,
        event_callback: EventCallback,
        move_callback: MoveCallback,
        key_callback: KeyCallback,
        takeback_callback: Option<TakebackCallback>,
    ) {
        let Some(rx) = self.rx.lock().unwrap().take() else {
            warn!("[GameManager.subscribe_game] Already subscribed");
            return;
        };

        let callbacks = GameCallbacks {
            event: Some(event_callback),
            mv: Some(move_callback),
            key: Some(key_callback),
            takeback: takeback_callback,
        };
        let ctx = SharedCtx {
            config: self.config.clone(),
            board: Arc::clone(&self.board),
            game_state: Arc::clone(&self.game_state),
            led: Arc::clone(&self.led),
            players: Arc::clone(&self.players),
            clock: Arc::clone(&self.clock),
            score: Arc::clone(&self.score),
            ui: Arc::clone(&self.ui),
            game_info: Arc::clone(&self.game_info),
            cached_result: Arc::clone(&self.cached_result),
            store: Arc::clone(&self.store),
            game_db_id: Arc::clone(&self.game_db_id),
            callbacks,
            tx: self.tx.lock().unwrap().clone(),
        };

        let (done_tx, done_rx) = channel();
        let handle = thread::Builder::new()
            .name("game-manager".to_string())
            .spawn(move || {
                run_game_thread(ctx, rx);
                let _ = done_tx.send(());
            })
            .expect("spawn game thread");
        *self.game_thread.lock().unwrap() = Some((handle, done_rx));
        info!("[GameManager.subscribe_game] Game thread started");
    }

    /// Stop the game thread; the database session closes with it.
    pub fn unsubscribe_game(&self) {
        self.send(GameCommand::Stop);
        if let Some((handle, done_rx)) = self.game_thread.lock().unwrap().take() {
            match done_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(()) => {
                    let _ = handle.join();
                }
                Err(_) => {
                    warn!("[GameManager.unsubscribe_game] Game thread did not finish within timeout");
                }
            }
        }
    }

    /// Block until every queued command and post-move task has finished.
    /// No-op when the game thread is not running.
    pub fn drain(&self) {
        if self.game_thread.lock().unwrap().is_none() {
            return;
        }
        let (ack_tx, ack_rx) = channel();
        self.send(GameCommand::Sync(ack_tx));
        let _ = ack_rx.recv_timeout(Duration::from_secs(10));
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Attach the player manager and wire its callbacks into the command
    /// channel. Records player names for game metadata.
    pub fn set_player_manager(&self, player_manager: Arc<PlayerManager>) {
        {
            let tx_pending = self.tx.lock().unwrap().clone();
            let tx_ready = self.tx.lock().unwrap().clone();
            let clock_slot = Arc::clone(&self.clock);
            let game_info = Arc::clone(&self.game_info);
            // Senders are single-threaded handles; guard for the player
            // threads that call these callbacks.
            let tx_pending = Mutex::new(tx_pending);
            let tx_ready = Mutex::new(tx_ready);
            player_manager.set_callbacks(ManagerCallbacks {
                pending_move: Some(Arc::new(move |mv: BoardMove| {
                    let _ = tx_pending.lock().unwrap().send(GameCommand::PendingMove(mv));
                })),
                status: Some(Arc::new(|message: String| {
                    info!("[GameManager] Player status: {}", message);
                })),
                ready: Some(Arc::new(move || {
                    let _ = tx_ready.lock().unwrap().send(GameCommand::PlayersReady);
                })),
                clock: Some(Arc::new(move |white_seconds, black_seconds| {
                    if let Some(clock) = clock_slot.lock().unwrap().as_ref() {
                        clock.set_times(white_seconds, black_seconds);
                    }
                })),
                game_info: Some(Arc::new(move |white, _white_rating, black, _black_rating| {
                    let mut info = game_info.lock().unwrap();
                    if !white.is_empty() {
                        info.white = white;
                    }
                    if !black.is_empty() {
                        info.black = black;
                    }
                })),
            });
        }

        {
            let mut info = self.game_info.lock().unwrap();
            info.white = player_manager.white_player().name();
            info.black = player_manager.black_player().name();
        }
        info!(
            "[GameManager] Player manager set: White={}, Black={}",
            player_manager.white_player().name(),
            player_manager.black_player().name()
        );
        *self.players.lock().unwrap() = Some(player_manager);
    }

    pub fn player_manager(&self) -> Option<Arc<PlayerManager>> {
        self.players.lock().unwrap().clone()
    }

    /// LED callbacks are required before play starts.
    pub fn set_led_callbacks(&self, led: Arc<dyn LedCallbacks>) {
        *self.led.lock().unwrap() = Some(led);
        info!("[GameManager] LED callbacks set");
    }

    pub fn set_clock_service(&self, clock: Arc<dyn ClockService>) {
        *self.clock.lock().unwrap() = Some(clock);
    }

    pub fn set_score_source(&self, score: Arc<dyn ScoreSource>) {
        *self.score.lock().unwrap() = Some(score);
    }

    // ------------------------------------------------------------------
    // UI callbacks
    // ------------------------------------------------------------------

    pub fn set_on_promotion_needed(&self, callback: Arc<dyn Fn(bool) -> char + Send + Sync>) {
        *self.ui.on_promotion_needed.lock().unwrap() = Some(callback);
    }

    pub fn set_on_back_pressed(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.ui.on_back_pressed.lock().unwrap() = Some(callback);
    }

    pub fn set_on_kings_in_center(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.ui.on_kings_in_center.lock().unwrap() = Some(callback);
    }

    pub fn set_on_kings_in_center_cancel(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.ui.on_kings_in_center_cancel.lock().unwrap() = Some(callback);
    }

    pub fn set_on_king_lift_resign(&self, callback: Arc<dyn Fn(Color) + Send + Sync>) {
        *self.ui.on_king_lift_resign.lock().unwrap() = Some(callback);
    }

    pub fn set_on_king_lift_resign_cancel(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        *self.ui.on_king_lift_resign_cancel.lock().unwrap() = Some(callback);
    }

    pub fn set_on_terminal_position(
        &self,
        callback: Arc<dyn Fn(String, Termination) + Send + Sync>,
    ) {
        *self.ui.on_terminal_position.lock().unwrap() = Some(callback);
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed a physical field event (LIFT/PLACE) into the game thread.
    pub fn receive_field(&self, event: PieceEvent, square: Square, seconds: f64) {
        self.send(GameCommand::Field {
            event,
            square,
            seconds,
        });
    }

    pub fn receive_key(&self, key: Key) {
        self.send(GameCommand::Key(key));
    }

    /// Arm a forced move the user is expected to execute on the board.
    pub fn computer_move(&self, uci: &str, forced: bool) {
        self.send(GameCommand::ComputerMove {
            uci: uci.to_string(),
            forced,
        });
    }

    /// Submit a move on behalf of an external source (remote protocol).
    ///
    /// # Returns
    /// `true` when the move was accepted and executed.
    pub fn submit_move(&self, mv: BoardMove) -> bool {
        let (reply_tx, reply_rx) = channel();
        self.send(GameCommand::SubmitMove {
            mv,
            reply: reply_tx,
        });
        reply_rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or(false)
    }

    pub fn handle_resign(&self, color: Option<Color>) {
        self.send(GameCommand::Resign { color });
    }

    pub fn handle_draw(&self) {
        self.send(GameCommand::Draw);
    }

    pub fn handle_flag(&self, color: Color) {
        self.send(GameCommand::Flag { color });
    }

    /// Arm a hint LED pattern shown after correction mode exits.
    pub fn set_pending_hint(&self, from: Square, to: Square) {
        self.send(GameCommand::SetPendingHint { from, to });
    }

    pub fn clear_pending_hint(&self) {
        self.send(GameCommand::ClearPendingHint);
    }

    pub fn restore_pending_move_leds(&self) {
        self.send(GameCommand::RestorePendingMoveLeds);
    }

    pub fn reset_kings_in_center_menu(&self) {
        self.send(GameCommand::ResetKingsInCenterMenu);
    }

    pub fn reset_king_lift_resign_menu(&self) {
        self.send(GameCommand::ResetKingLiftMenu);
    }

    // ------------------------------------------------------------------
    // Metadata and queries
    // ------------------------------------------------------------------

    pub fn set_game_info(&self, event: &str, site: &str, round: &str, white: &str, black: &str) {
        let mut info = self.game_info.lock().unwrap();
        info.event = event.to_string();
        info.site = site.to_string();
        info.round = round.to_string();
        if !white.is_empty() {
            info.white = white.to_string();
        }
        if !black.is_empty() {
            info.black = black.to_string();
        }
    }

    /// Sync clock times (used by Lichess to mirror the server).
    pub fn set_clock(&self, white_seconds: i64, black_seconds: i64) {
        if let Some(clock) = self.clock.lock().unwrap().as_ref() {
            clock.set_times(white_seconds, black_seconds);
        }
    }

    pub fn game_state(&self) -> &Arc<ChessGameState> {
        &self.game_state
    }

    pub fn get_fen(&self) -> String {
        self.game_state.fen()
    }

    pub fn position(&self) -> Chess {
        self.game_state.position()
    }

    /// Result of the last game: the cached copy when available, otherwise
    /// the most recent persisted game.
    pub fn get_result(&self) -> String {
        if let Some(result) = self.cached_result.lock().unwrap().clone() {
            return result;
        }
        if let Some(store) = self.store.lock().unwrap().as_ref() {
            if let Ok(Some(result)) = store.last_game_result() {
                return result;
            }
        }
        "Unknown".to_string()
    }
}
