//! A player backed by a UCI chess engine subprocess.
//!
//! Initialization runs in a background thread so the game can start while
//! the engine loads. Each move request spawns a think thread; the computed
//! move becomes the pending move and is announced for LED guidance. Piece
//! events only confirm that the user executed it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use derive_builder::Builder;
use log::{debug, error, info, warn};
use shakmaty::Chess;

use crate::state::{fen_of, BoardMove};
use crate::uci_engine::{load_uci_options, UciEngine};

use super::base::{
    Capabilities, PieceEventOutcome, Player, PlayerCore, PlayerErrorKind, PlayerInfo, PlayerState,
    PlayerType,
};

#[derive(Builder, Clone)]
#[builder(setter(into))]
pub struct EnginePlayerConfig {
    /// Path to the engine executable. The option file is expected at
    /// `<engine_path>.uci`.
    pub engine_path: PathBuf,
    #[builder(default = "String::from(\"Default\")")]
    pub elo_section: String,
    #[builder(default = "Duration::from_secs(5)")]
    pub time_limit: Duration,
    /// Extra UCI options overriding the option file.
    #[builder(default)]
    pub uci_options: BTreeMap<String, String>,
}

pub(crate) struct EngineShared {
    pub config: EnginePlayerConfig,
    pub engine: Mutex<Option<UciEngine>>,
    pub options: Mutex<BTreeMap<String, String>>,
    pub thinking: AtomicBool,
    pub pending: Mutex<Option<BoardMove>>,
}

impl EngineShared {
    pub fn new(config: EnginePlayerConfig) -> Self {
        EngineShared {
            config,
            engine: Mutex::new(None),
            options: Mutex::new(BTreeMap::new()),
            thinking: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    /// Initialize the engine process. Runs on the init thread.
    pub fn initialize(&self, core: &PlayerCore) -> Result<(), String> {
        let path = &self.config.engine_path;
        if !path.exists() {
            return Err(format!("Engine not found: {}", path.display()));
        }

        // Load the option file synchronously; it is small.
        let uci_file = PathBuf::from(format!("{}.uci", path.display()));
        let mut options = load_uci_options(&uci_file, &self.config.elo_section);
        for (key, value) in &self.config.uci_options {
            options.insert(key.clone(), value.clone());
        }
        *self.options.lock().unwrap() = options.clone();

        let mut engine = UciEngine::launch(path).map_err(|e| e.to_string())?;
        if !options.is_empty() {
            info!("[EnginePlayer] Configuring with options: {:?}", options);
            engine.configure(&options).map_err(|e| e.to_string())?;
        }

        if core.state() == PlayerState::Stopped {
            // Stopped while launching; do not keep the process around.
            engine.quit();
            return Err("stopped during initialization".to_string());
        }
        *self.engine.lock().unwrap() = Some(engine);
        Ok(())
    }

    /// Compute a move on the think thread, then publish it as pending.
    pub fn think(self: &Arc<Self>, core: &Arc<PlayerCore>, position: Chess) {
        let shared = Arc::clone(self);
        let core = Arc::clone(core);
        let name = format!("engine-think-{}", core.name());
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = shared.compute(&position);
                match result {
                    Ok(mv) => {
                        info!("[EnginePlayer] Computed: {}", mv);
                        *shared.pending.lock().unwrap() = Some(mv);
                        core.fire_pending_move(mv);
                    }
                    Err(message) => {
                        error!("[EnginePlayer] Error getting move: {}", message);
                    }
                }
                shared.thinking.store(false, Ordering::SeqCst);
                if core.state() == PlayerState::Thinking {
                    let _ = core.set_state(PlayerState::Ready);
                }
            })
            .expect("spawn engine think thread");
    }

    fn compute(&self, position: &Chess) -> Result<BoardMove, String> {
        let mut guard = self.engine.lock().unwrap();
        let engine = guard.as_mut().ok_or("engine not initialized")?;

        // Re-apply UCI options before each move; some engines reset.
        let options = self.options.lock().unwrap().clone();
        engine.configure(&options).map_err(|e| e.to_string())?;

        let fen = fen_of(position);
        let uci = engine
            .best_move(&fen, self.config.time_limit, None)
            .map_err(|e| e.to_string())?;
        BoardMove::parse(&uci).map_err(|e| e.to_string())
    }

    /// Compare a formed move with the pending one. Promotion is taken from
    /// the pending move; destination-only submissions recover a missed lift.
    pub fn validate_against_pending(&self, mv: BoardMove) -> PieceEventOutcome {
        let pending = *self.pending.lock().unwrap();
        let Some(expected) = pending else {
            warn!("[EnginePlayer] Move formed but no pending move - still thinking");
            return PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch);
        };

        if mv.is_destination_only() {
            if mv.to == expected.to {
                warn!(
                    "[EnginePlayer] Missed lift recovery: destination {} matches pending move",
                    mv.to
                );
                return PieceEventOutcome::Submit(expected);
            }
            return PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch);
        }

        if mv.same_squares(&expected) {
            PieceEventOutcome::Submit(expected)
        } else {
            warn!(
                "[EnginePlayer] Move {} does not match pending {}",
                mv, expected
            );
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        }
    }
}

pub struct EnginePlayer {
    core: Arc<PlayerCore>,
    shared: Arc<EngineShared>,
}

impl EnginePlayer {
    pub fn new(name: &str, config: EnginePlayerConfig) -> Self {
        EnginePlayer {
            core: Arc::new(PlayerCore::new(name)),
            shared: Arc::new(EngineShared::new(config)),
        }
    }

    pub fn engine_name(&self) -> String {
        self.shared
            .config
            .engine_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "engine".to_string())
    }

    pub fn elo_section(&self) -> &str {
        &self.shared.config.elo_section
    }
}

impl Player for EnginePlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    fn player_type(&self) -> PlayerType {
        PlayerType::Engine
    }

    fn pending_move(&self) -> Option<BoardMove> {
        *self.shared.pending.lock().unwrap()
    }

    fn start(&self) -> bool {
        let state = self.core.state();
        if !matches!(state, PlayerState::Uninitialized | PlayerState::Stopped) {
            warn!("[EnginePlayer] Cannot start - already in state {}", state);
            return false;
        }
        let _ = self.core.set_state(PlayerState::Initializing);
        self.core
            .report_status(&format!("Loading {}...", self.engine_name()));

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        let thread_name = format!("engine-init-{}", self.engine_name());
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || match shared.initialize(&core) {
                Ok(()) => {
                    core.report_status("Engine ready");
                    if let Some(queued) = core.set_state(PlayerState::Ready) {
                        shared.thinking.store(true, Ordering::SeqCst);
                        let _ = core.set_state(PlayerState::Thinking);
                        shared.think(&core, queued);
                    }
                }
                Err(message) => {
                    error!("[EnginePlayer] Failed to initialize engine: {}", message);
                    core.set_error(&message);
                }
            })
            .expect("spawn engine init thread");
        true
    }

    fn stop(&self) {
        info!("[EnginePlayer] Stopping engine: {}", self.engine_name());
        if let Some(mut engine) = self.shared.engine.lock().unwrap().take() {
            engine.quit();
        }
        let _ = self.core.set_state(PlayerState::Stopped);
    }

    fn do_request_move(&self, position: &Chess) {
        if self.shared.thinking.load(Ordering::SeqCst) {
            debug!("[EnginePlayer] Already thinking, ignoring duplicate call");
            return;
        }
        if let Some(pending) = *self.shared.pending.lock().unwrap() {
            debug!(
                "[EnginePlayer] Already have pending move {}, ignoring request",
                pending
            );
            return;
        }
        if self.shared.engine.lock().unwrap().is_none() {
            warn!("[EnginePlayer] Engine not initialized");
            return;
        }

        self.core.reset_lifted();
        self.shared.thinking.store(true, Ordering::SeqCst);
        let _ = self.core.set_state(PlayerState::Thinking);
        self.shared.think(&self.core, position.clone());
    }

    fn validate_formed(&self, mv: BoardMove, _position: &Chess) -> PieceEventOutcome {
        self.shared.validate_against_pending(mv)
    }

    fn on_move_made(&self, mv: &BoardMove, _position_after: &Chess) {
        debug!("[EnginePlayer] Move made: {}", mv);
        *self.shared.pending.lock().unwrap() = None;
        self.core.reset_lifted();
    }

    fn on_new_game(&self) {
        info!("[EnginePlayer] New game - resetting {}", self.engine_name());
        *self.shared.pending.lock().unwrap() = None;
        self.core.reset_lifted();
        if let Some(engine) = self.shared.engine.lock().unwrap().as_mut() {
            if let Err(e) = engine.new_game() {
                warn!("[EnginePlayer] ucinewgame failed: {}", e);
            }
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn get_info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name(),
            color: self.color(),
            player_type: self.player_type(),
            state: self.state(),
            error: self.core.error_message(),
            description: format!("{} @ {}", self.engine_name(), self.elo_section()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Square;

    fn shared_with_pending(pending: Option<&str>) -> EngineShared {
        let config = EnginePlayerConfigBuilder::default()
            .engine_path("/nonexistent/engine")
            .build()
            .unwrap();
        let shared = EngineShared::new(config);
        *shared.pending.lock().unwrap() = pending.map(|uci| BoardMove::parse(uci).unwrap());
        shared
    }

    #[test]
    fn matching_move_submits_pending_with_promotion() {
        let shared = shared_with_pending(Some("a7a8q"));
        let outcome = shared.validate_against_pending(BoardMove::parse("a7a8").unwrap());
        match outcome {
            PieceEventOutcome::Submit(mv) => assert_eq!(mv.uci(), "a7a8q"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn mismatch_is_reported() {
        let shared = shared_with_pending(Some("g1f3"));
        assert_eq!(
            shared.validate_against_pending(BoardMove::parse("b1c3").unwrap()),
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        );
    }

    #[test]
    fn no_pending_move_is_a_mismatch() {
        let shared = shared_with_pending(None);
        assert_eq!(
            shared.validate_against_pending(BoardMove::parse("e2e4").unwrap()),
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        );
    }

    #[test]
    fn destination_only_matches_pending_target() {
        let shared = shared_with_pending(Some("g1f3"));
        let outcome =
            shared.validate_against_pending(BoardMove::new(Square::F3, Square::F3));
        match outcome {
            PieceEventOutcome::Submit(mv) => assert_eq!(mv.uci(), "g1f3"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(
            shared.validate_against_pending(BoardMove::new(Square::E4, Square::E4)),
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        );
    }

    #[test]
    fn start_fails_for_missing_executable() {
        let config = EnginePlayerConfigBuilder::default()
            .engine_path("/nonexistent/engine")
            .build()
            .unwrap();
        let player = EnginePlayer::new("missing", config);
        assert!(player.start());
        // The init thread reports the failure asynchronously.
        for _ in 0..50 {
            if player.state() == PlayerState::Error {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(player.state(), PlayerState::Error);
        assert!(player.core().error_message().is_some());
    }
}
