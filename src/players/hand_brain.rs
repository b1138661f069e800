//! Hand-brain assistant player.
//!
//! NORMAL mode: the engine names a piece type ("the brain"), the human picks
//! the actual move with that piece ("the hand"). Moves of any other piece
//! type are rejected.
//!
//! REVERSE mode: the human picks the piece type by lifting a piece and
//! putting it back on the same square; the engine then computes its best
//! move restricted to that piece type and guides the user to execute it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use derive_builder::Builder;
use log::{debug, info, warn};
use shakmaty::{CastlingMode, Chess, Position, Role, Square};

use crate::events::PieceEvent;
use crate::state::{fen_of, BoardMove};

use super::base::{
    Capabilities, PieceEventOutcome, Player, PlayerCore, PlayerErrorKind, PlayerInfo, PlayerState,
    PlayerType, TrackResult,
};
use super::engine::{EnginePlayerConfig, EnginePlayerConfigBuilder, EngineShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandBrainMode {
    /// Engine suggests a piece type, human chooses the move.
    Normal,
    /// Human constrains the engine to a piece type.
    Reverse,
}

/// Phase machine for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandBrainPhase {
    Idle,
    ComputingSuggestion,
    WaitingHumanMove,
    WaitingPieceSelection,
    ComputingMove,
    WaitingExecution,
}

#[derive(Builder, Clone)]
#[builder(setter(into))]
pub struct HandBrainConfig {
    pub engine_path: PathBuf,
    #[builder(default = "HandBrainMode::Normal")]
    pub mode: HandBrainMode,
    #[builder(default = "String::from(\"Default\")")]
    pub elo_section: String,
    #[builder(default = "std::time::Duration::from_secs(3)")]
    pub time_limit: std::time::Duration,
}

pub type BrainHintCallback = Arc<dyn Fn(Role) + Send + Sync>;

struct HandBrainShared {
    engine: EngineShared,
    mode: HandBrainMode,
    phase: Mutex<HandBrainPhase>,
    suggested_role: Mutex<Option<Role>>,
    selection_lift: Mutex<Option<Square>>,
    computing: AtomicBool,
    brain_hint: Mutex<Option<BrainHintCallback>>,
}

impl HandBrainShared {
    fn phase(&self) -> HandBrainPhase {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: HandBrainPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn compute_best(
        &self,
        position: &Chess,
        searchmoves: Option<&[String]>,
    ) -> Result<BoardMove, String> {
        let mut guard = self.engine.engine.lock().unwrap();
        let engine = guard
            .as_mut()
            .ok_or_else(|| "engine not initialized".to_string())?;
        let options = self.engine.options.lock().unwrap().clone();
        engine.configure(&options).map_err(|e| e.to_string())?;
        let fen = fen_of(position);
        let uci = engine
            .best_move(&fen, self.engine.config.time_limit, searchmoves)
            .map_err(|e| e.to_string())?;
        BoardMove::parse(&uci).map_err(|e| e.to_string())
    }
}

fn legal_moves_for_role(position: &Chess, role: Role) -> Vec<String> {
    position
        .legal_moves()
        .iter()
        .filter(|mv| mv.role() == role)
        .map(|mv| mv.to_uci(CastlingMode::Standard).to_string())
        .collect()
}

/// Start a turn; callable from the game thread and from the init thread
/// when a request was queued during initialization.
fn begin_turn(core: &Arc<PlayerCore>, shared: &Arc<HandBrainShared>, position: &Chess) {
    if shared.computing.load(Ordering::SeqCst) {
        debug!("[HandBrain] Already computing, ignoring request");
        return;
    }
    core.reset_lifted();
    let _ = core.set_state(PlayerState::Thinking);
    match shared.mode {
        HandBrainMode::Normal => start_normal_turn(core, shared, position),
        HandBrainMode::Reverse => start_reverse_turn(core, shared),
    }
}

fn start_normal_turn(core: &Arc<PlayerCore>, shared: &Arc<HandBrainShared>, position: &Chess) {
    shared.set_phase(HandBrainPhase::ComputingSuggestion);
    shared.computing.store(true, Ordering::SeqCst);

    let core = Arc::clone(core);
    let shared = Arc::clone(shared);
    let position = position.clone();
    thread::Builder::new()
        .name("hand-brain-suggest".to_string())
        .spawn(move || {
            match shared.compute_best(&position, None) {
                Ok(mv) => {
                    let role = position
                        .board()
                        .piece_at(mv.from)
                        .map(|piece| piece.role)
                        .unwrap_or(Role::Pawn);
                    info!("[HandBrain] Suggesting piece type: {:?}", role);
                    *shared.suggested_role.lock().unwrap() = Some(role);
                    core.report_status(&format!("Move your {:?}", role));
                    let hint = shared.brain_hint.lock().unwrap().clone();
                    if let Some(hint) = hint {
                        hint(role);
                    }
                }
                Err(message) => {
                    warn!("[HandBrain] Suggestion failed: {}", message);
                }
            }
            shared.set_phase(HandBrainPhase::WaitingHumanMove);
            shared.computing.store(false, Ordering::SeqCst);
            if core.state() == PlayerState::Thinking {
                let _ = core.set_state(PlayerState::Ready);
            }
        })
        .expect("spawn hand-brain suggest thread");
}

fn start_reverse_turn(core: &Arc<PlayerCore>, shared: &Arc<HandBrainShared>) {
    shared.set_phase(HandBrainPhase::WaitingPieceSelection);
    *shared.selection_lift.lock().unwrap() = None;
    core.report_status("Lift and replace a piece to choose its type");
    if core.state() == PlayerState::Thinking {
        let _ = core.set_state(PlayerState::Ready);
    }
}

fn compute_constrained_move(
    core: &Arc<PlayerCore>,
    shared: &Arc<HandBrainShared>,
    role: Role,
    position: &Chess,
) {
    let moves = legal_moves_for_role(position, role);
    if moves.is_empty() {
        core.report_status(&format!("No legal {:?} moves, pick another piece", role));
        shared.set_phase(HandBrainPhase::WaitingPieceSelection);
        return;
    }

    shared.set_phase(HandBrainPhase::ComputingMove);
    shared.computing.store(true, Ordering::SeqCst);

    let core = Arc::clone(core);
    let shared = Arc::clone(shared);
    let position = position.clone();
    thread::Builder::new()
        .name("hand-brain-compute".to_string())
        .spawn(move || {
            match shared.compute_best(&position, Some(&moves)) {
                Ok(mv) => {
                    info!("[HandBrain] Constrained move: {}", mv);
                    *shared.engine.pending.lock().unwrap() = Some(mv);
                    shared.set_phase(HandBrainPhase::WaitingExecution);
                    core.fire_pending_move(mv);
                }
                Err(message) => {
                    warn!("[HandBrain] Constrained compute failed: {}", message);
                    shared.set_phase(HandBrainPhase::WaitingPieceSelection);
                }
            }
            shared.computing.store(false, Ordering::SeqCst);
        })
        .expect("spawn hand-brain compute thread");
}

pub struct HandBrainPlayer {
    core: Arc<PlayerCore>,
    shared: Arc<HandBrainShared>,
}

impl HandBrainPlayer {
    pub fn new(name: &str, config: HandBrainConfig) -> Self {
        let engine_config: EnginePlayerConfig = EnginePlayerConfigBuilder::default()
            .engine_path(config.engine_path.clone())
            .elo_section(config.elo_section.clone())
            .time_limit(config.time_limit)
            .build()
            .expect("engine config");
        HandBrainPlayer {
            core: Arc::new(PlayerCore::new(name)),
            shared: Arc::new(HandBrainShared {
                engine: EngineShared::new(engine_config),
                mode: config.mode,
                phase: Mutex::new(HandBrainPhase::Idle),
                suggested_role: Mutex::new(None),
                selection_lift: Mutex::new(None),
                computing: AtomicBool::new(false),
                brain_hint: Mutex::new(None),
            }),
        }
    }

    pub fn mode(&self) -> HandBrainMode {
        self.shared.mode
    }

    pub fn phase(&self) -> HandBrainPhase {
        self.shared.phase()
    }

    /// Callback announcing the suggested piece type (NORMAL mode UI).
    pub fn set_brain_hint_callback(&self, callback: BrainHintCallback) {
        *self.shared.brain_hint.lock().unwrap() = Some(callback);
    }

    fn reset_turn_state(&self) {
        *self.shared.engine.pending.lock().unwrap() = None;
        *self.shared.suggested_role.lock().unwrap() = None;
        *self.shared.selection_lift.lock().unwrap() = None;
        self.shared.set_phase(HandBrainPhase::Idle);
        self.core.reset_lifted();
    }

    /// REVERSE selection phase: lift + replace on the same square confirms
    /// the piece type.
    fn handle_selection_event(
        &self,
        event: PieceEvent,
        square: Square,
        position: &Chess,
    ) -> PieceEventOutcome {
        match event {
            PieceEvent::Lift => {
                *self.shared.selection_lift.lock().unwrap() = Some(square);
                PieceEventOutcome::Nothing
            }
            PieceEvent::Place => {
                let lifted = self.shared.selection_lift.lock().unwrap().take();
                match lifted {
                    Some(from) if from == square => {
                        let Some(piece) = position.board().piece_at(square) else {
                            return PieceEventOutcome::Nothing;
                        };
                        if piece.color != position.turn() {
                            debug!("[HandBrain] Opponent piece touched during selection");
                            return PieceEventOutcome::Nothing;
                        }
                        info!("[HandBrain] Piece type selected: {:?}", piece.role);
                        compute_constrained_move(&self.core, &self.shared, piece.role, position);
                        PieceEventOutcome::Nothing
                    }
                    Some(_) => {
                        // A real move during selection is premature.
                        PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
                    }
                    None => PieceEventOutcome::Error(PlayerErrorKind::PlaceWithoutLift),
                }
            }
        }
    }
}

impl Player for HandBrainPlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    fn player_type(&self) -> PlayerType {
        PlayerType::Engine
    }

    fn pending_move(&self) -> Option<BoardMove> {
        match self.shared.mode {
            HandBrainMode::Normal => None,
            HandBrainMode::Reverse => *self.shared.engine.pending.lock().unwrap(),
        }
    }

    fn start(&self) -> bool {
        let state = self.core.state();
        if !matches!(state, PlayerState::Uninitialized | PlayerState::Stopped) {
            warn!("[HandBrain] Cannot start - already in state {}", state);
            return false;
        }
        let _ = self.core.set_state(PlayerState::Initializing);
        self.core.report_status("Loading hand-brain engine...");

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("hand-brain-init".to_string())
            .spawn(move || match shared.engine.initialize(&core) {
                Ok(()) => {
                    core.report_status("Hand-brain ready");
                    if let Some(queued) = core.set_state(PlayerState::Ready) {
                        begin_turn(&core, &shared, &queued);
                    }
                }
                Err(message) => core.set_error(&message),
            })
            .expect("spawn hand-brain init thread");
        true
    }

    fn stop(&self) {
        info!("[HandBrain] Stopping");
        if let Some(mut engine) = self.shared.engine.engine.lock().unwrap().take() {
            engine.quit();
        }
        let _ = self.core.set_state(PlayerState::Stopped);
    }

    fn do_request_move(&self, position: &Chess) {
        begin_turn(&self.core, &self.shared, position);
    }

    fn on_piece_event(
        &self,
        event: PieceEvent,
        square: Square,
        position: &Chess,
    ) -> PieceEventOutcome {
        match self.shared.mode {
            HandBrainMode::Normal => {
                // Default tracking; validation checks the suggested type.
                match self.core.track_piece_event(event, square) {
                    TrackResult::Nothing => PieceEventOutcome::Nothing,
                    TrackResult::Error(kind) => PieceEventOutcome::Error(kind),
                    TrackResult::Formed(mv) => self.validate_formed(mv, position),
                }
            }
            HandBrainMode::Reverse => match self.shared.phase() {
                HandBrainPhase::WaitingPieceSelection => {
                    self.handle_selection_event(event, square, position)
                }
                HandBrainPhase::WaitingExecution => {
                    match self.core.track_piece_event(event, square) {
                        TrackResult::Nothing => PieceEventOutcome::Nothing,
                        TrackResult::Error(kind) => PieceEventOutcome::Error(kind),
                        TrackResult::Formed(mv) => {
                            self.shared.engine.validate_against_pending(mv)
                        }
                    }
                }
                _ => PieceEventOutcome::Nothing,
            },
        }
    }

    fn validate_formed(&self, mv: BoardMove, position: &Chess) -> PieceEventOutcome {
        // NORMAL mode: the moved piece must match the suggestion.
        let suggested = *self.shared.suggested_role.lock().unwrap();
        let Some(role) = suggested else {
            // No suggestion computed (engine failed); accept the human move.
            return PieceEventOutcome::Submit(mv);
        };
        let moving = position.board().piece_at(mv.from).map(|piece| piece.role);
        if moving == Some(role) {
            PieceEventOutcome::Submit(mv)
        } else {
            warn!(
                "[HandBrain] Move {} uses {:?}, suggestion was {:?}",
                mv, moving, role
            );
            PieceEventOutcome::Error(PlayerErrorKind::WrongPieceType)
        }
    }

    fn on_move_made(&self, mv: &BoardMove, _position_after: &Chess) {
        debug!("[HandBrain] Move made: {}", mv);
        self.reset_turn_state();
    }

    fn on_new_game(&self) {
        self.reset_turn_state();
    }

    fn on_takeback(&self, _position: &Chess) {
        debug!("[HandBrain] Takeback - resetting phase");
        self.reset_turn_state();
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
            description: match self.shared.mode {
                HandBrainMode::Normal => "Hand-brain (engine suggests piece type)".to_string(),
                HandBrainMode::Reverse => "Hand-brain reverse (human picks piece type)".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(mode: HandBrainMode) -> HandBrainPlayer {
        let config = HandBrainConfigBuilder::default()
            .engine_path("/nonexistent/engine")
            .mode(mode)
            .build()
            .unwrap();
        HandBrainPlayer::new("HandBrain", config)
    }

    #[test]
    fn normal_mode_rejects_wrong_piece_type() {
        let p = player(HandBrainMode::Normal);
        *p.shared.suggested_role.lock().unwrap() = Some(Role::Knight);
        let position = Chess::default();
        let outcome = p.validate_formed(BoardMove::parse("e2e4").unwrap(), &position);
        assert_eq!(
            outcome,
            PieceEventOutcome::Error(PlayerErrorKind::WrongPieceType)
        );
        let outcome = p.validate_formed(BoardMove::parse("g1f3").unwrap(), &position);
        assert!(matches!(outcome, PieceEventOutcome::Submit(_)));
    }

    #[test]
    fn legal_moves_for_role_filters_by_piece() {
        let position = Chess::default();
        let mut knight_moves = legal_moves_for_role(&position, Role::Knight);
        knight_moves.sort();
        assert_eq!(knight_moves, vec!["b1a3", "b1c3", "g1f3", "g1h3"]);
        assert!(legal_moves_for_role(&position, Role::Queen).is_empty());
    }

    #[test]
    fn reverse_selection_requires_same_square_replace() {
        let p = player(HandBrainMode::Reverse);
        p.shared.set_phase(HandBrainPhase::WaitingPieceSelection);
        let position = Chess::default();
        let outcome = p.on_piece_event(PieceEvent::Lift, Square::B1, &position);
        assert_eq!(outcome, PieceEventOutcome::Nothing);
        // Placing elsewhere during selection is an error.
        let outcome = p.on_piece_event(PieceEvent::Place, Square::C3, &position);
        assert_eq!(
            outcome,
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        );
    }

    #[test]
    fn move_made_resets_the_phase_machine() {
        let p = player(HandBrainMode::Reverse);
        p.shared.set_phase(HandBrainPhase::WaitingExecution);
        *p.shared.engine.pending.lock().unwrap() = Some(BoardMove::parse("e2e4").unwrap());
        p.on_move_made(&BoardMove::parse("e2e4").unwrap(), &Chess::default());
        assert_eq!(p.phase(), HandBrainPhase::Idle);
        assert!(p.pending_move().is_none());
    }
}
