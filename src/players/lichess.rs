//! A player that represents the remote side of a Lichess online game.
//!
//! Moves arrive from the server over the game-state stream, become the
//! pending move and are confirmed by piece events; the local player's moves
//! are forwarded to the server after execution. Takebacks and late castling
//! are not available because a sent move cannot be undone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use derive_builder::Builder;
use log::{debug, error, info, warn};
use rand::Rng;
use shakmaty::{Chess, Color, Position};

use crate::lichess_api::{GameStreamEvent, LichessClient, StreamPlayer};
use crate::state::BoardMove;

use super::base::{
    Capabilities, PieceEventOutcome, Player, PlayerCore, PlayerErrorKind, PlayerInfo, PlayerState,
    PlayerType,
};

const SEND_MOVE_RETRIES: u32 = 3;
const FIND_GAME_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LichessGameMode {
    /// Seek a new game with the configured time control.
    New,
    /// Resume an ongoing game by id.
    Ongoing,
    /// Accept an incoming challenge.
    Challenge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPreference {
    White,
    Black,
    Random,
}

#[derive(Builder, Clone)]
#[builder(setter(into))]
pub struct LichessPlayerConfig {
    /// Personal API token with board:play scope.
    pub token: String,
    #[builder(default = "LichessGameMode::New")]
    pub mode: LichessGameMode,
    #[builder(default = "10")]
    pub time_minutes: u32,
    #[builder(default = "5")]
    pub increment_seconds: u32,
    #[builder(default = "false")]
    pub rated: bool,
    #[builder(default = "ColorPreference::Random")]
    pub color_preference: ColorPreference,
    #[builder(default)]
    pub rating_range: String,
    #[builder(default)]
    pub game_id: String,
    #[builder(default)]
    pub challenge_id: String,
}

struct LichessShared {
    config: LichessPlayerConfig,
    client: Mutex<Option<Arc<LichessClient>>>,
    game_id: Mutex<Option<String>>,
    username: Mutex<String>,
    /// Is the LOCAL user playing white? This player instance represents the
    /// remote opponent and takes the other color.
    local_is_white: Mutex<Option<bool>>,
    white_name: Mutex<String>,
    white_rating: Mutex<String>,
    black_name: Mutex<String>,
    black_rating: Mutex<String>,
    times: Mutex<(i64, i64)>,
    remote_moves: Mutex<String>,
    last_processed_moves: Mutex<String>,
    pending: Mutex<Option<BoardMove>>,
    should_stop: AtomicBool,
    board_flip: AtomicBool,
}

impl LichessShared {
    fn new(config: LichessPlayerConfig) -> Self {
        LichessShared {
            config,
            client: Mutex::new(None),
            game_id: Mutex::new(None),
            username: Mutex::new(String::new()),
            local_is_white: Mutex::new(None),
            white_name: Mutex::new(String::new()),
            white_rating: Mutex::new(String::new()),
            black_name: Mutex::new(String::new()),
            black_rating: Mutex::new(String::new()),
            times: Mutex::new((0, 0)),
            remote_moves: Mutex::new(String::new()),
            last_processed_moves: Mutex::new(String::new()),
            pending: Mutex::new(None),
            should_stop: AtomicBool::new(false),
            board_flip: AtomicBool::new(false),
        }
    }

    fn client(&self) -> Option<Arc<LichessClient>> {
        self.client.lock().unwrap().clone()
    }

    fn game_id(&self) -> Option<String> {
        self.game_id.lock().unwrap().clone()
    }
}

pub struct LichessPlayer {
    core: Arc<PlayerCore>,
    shared: Arc<LichessShared>,
}

impl LichessPlayer {
    pub fn new(name: &str, config: LichessPlayerConfig) -> Self {
        LichessPlayer {
            core: Arc::new(PlayerCore::new(name)),
            shared: Arc::new(LichessShared::new(config)),
        }
    }

    /// True when the local player is black and the display should flip.
    pub fn board_flip(&self) -> bool {
        self.shared.board_flip.load(Ordering::SeqCst)
    }

    pub fn game_id(&self) -> Option<String> {
        self.shared.game_id()
    }

    pub fn white_player(&self) -> String {
        self.shared.white_name.lock().unwrap().clone()
    }

    pub fn black_player(&self) -> String {
        self.shared.black_name.lock().unwrap().clone()
    }

    /// Abort the current game (only valid in the first few moves).
    pub fn abort_game(&self) {
        let (Some(client), Some(game_id)) = (self.shared.client(), self.shared.game_id()) else {
            warn!("[LichessPlayer] Cannot abort - no active game");
            return;
        };
        if let Err(e) = client.abort(&game_id) {
            error!("[LichessPlayer] Failed to abort: {}", e);
        }
    }

    fn connect(core: &Arc<PlayerCore>, shared: &Arc<LichessShared>) {
        let client = match LichessClient::new(&shared.config.token) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("[LichessPlayer] Failed to create client: {}", e);
                core.set_error("API client error");
                return;
            }
        };
        *shared.client.lock().unwrap() = Some(Arc::clone(&client));

        core.report_status("Authenticating...");
        match client.account() {
            Ok(account) => {
                info!("[LichessPlayer] Authenticated as: {}", account.username);
                *shared.username.lock().unwrap() = account.username;
            }
            Err(e) => {
                error!("[LichessPlayer] Authentication failed: {}", e);
                core.set_error("API token invalid");
                return;
            }
        }

        match shared.config.mode {
            LichessGameMode::New => Self::start_new_game(core, shared, &client),
            LichessGameMode::Ongoing => {
                let game_id = shared.config.game_id.clone();
                if game_id.is_empty() {
                    core.set_error("No game id to resume");
                    return;
                }
                *shared.game_id.lock().unwrap() = Some(game_id);
                Self::spawn_stream(core, shared);
            }
            LichessGameMode::Challenge => {
                let challenge_id = shared.config.challenge_id.clone();
                if challenge_id.is_empty() {
                    core.set_error("No challenge id");
                    return;
                }
                core.report_status("Accepting challenge...");
                if let Err(e) = client.accept_challenge(&challenge_id) {
                    error!("[LichessPlayer] Challenge handling failed: {}", e);
                    core.set_error("Challenge failed");
                    return;
                }
                *shared.game_id.lock().unwrap() = Some(challenge_id);
                Self::spawn_stream(core, shared);
            }
        }
    }

    fn start_new_game(core: &Arc<PlayerCore>, shared: &Arc<LichessShared>, client: &LichessClient) {
        core.report_status("Finding opponent...");
        let color = match shared.config.color_preference {
            ColorPreference::White => Some("white"),
            ColorPreference::Black => Some("black"),
            // Random preference is resolved locally before the seek.
            ColorPreference::Random => {
                if rand::thread_rng().gen_bool(0.5) {
                    Some("white")
                } else {
                    Some("black")
                }
            }
        };
        info!(
            "[LichessPlayer] Seeking: {}+{}",
            shared.config.time_minutes, shared.config.increment_seconds
        );
        if let Err(e) = client.seek(
            shared.config.time_minutes,
            shared.config.increment_seconds,
            shared.config.rated,
            color,
            &shared.config.rating_range,
        ) {
            if !shared.should_stop.load(Ordering::SeqCst) {
                error!("[LichessPlayer] Seek failed: {}", e);
                core.set_error("Seek failed");
            }
            return;
        }
        if shared.should_stop.load(Ordering::SeqCst) {
            return;
        }

        // The seek returned, so a game should be listed shortly.
        info!("[LichessPlayer] Looking for started game...");
        for _ in 0..FIND_GAME_ATTEMPTS {
            if shared.should_stop.load(Ordering::SeqCst) {
                return;
            }
            match client.ongoing(30) {
                Ok(games) => {
                    if let Some(game) = games.into_iter().next() {
                        info!("[LichessPlayer] Found game: {}", game.game_id);
                        *shared.game_id.lock().unwrap() = Some(game.game_id);
                        Self::spawn_stream(core, shared);
                        return;
                    }
                }
                Err(e) => warn!("[LichessPlayer] Error checking ongoing games: {}", e),
            }
            thread::sleep(Duration::from_millis(500));
        }
        error!("[LichessPlayer] Could not find started game");
        core.set_error("Game not found");
    }

    fn spawn_stream(core: &Arc<PlayerCore>, shared: &Arc<LichessShared>) {
        let core = Arc::clone(core);
        let shared = Arc::clone(shared);
        thread::Builder::new()
            .name("lichess-stream".to_string())
            .spawn(move || {
                let (Some(client), Some(game_id)) = (shared.client(), shared.game_id()) else {
                    return;
                };
                info!("[LichessPlayer] Stream thread started for {}", game_id);
                let stream = match client.stream_game(&game_id) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("[LichessPlayer] Stream open failed: {}", e);
                        core.set_error("Stream disconnected");
                        return;
                    }
                };
                for event in stream {
                    if shared.should_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    match event {
                        Ok(event) => Self::process_event(&core, &shared, event),
                        Err(e) => {
                            if !shared.should_stop.load(Ordering::SeqCst) {
                                error!("[LichessPlayer] Stream error: {}", e);
                                core.set_error("Stream disconnected");
                            }
                            return;
                        }
                    }
                }
                info!("[LichessPlayer] Stream thread ended");
            })
            .expect("spawn lichess stream thread");
    }

    fn process_event(core: &Arc<PlayerCore>, shared: &Arc<LichessShared>, event: GameStreamEvent) {
        match event {
            GameStreamEvent::GameFull {
                white,
                black,
                state,
                ..
            } => {
                Self::extract_player_info(core, shared, &white, &black);
                Self::process_state(core, shared, &state.moves, &state.status, state.wtime, state.btime);
            }
            GameStreamEvent::GameState {
                moves,
                status,
                wtime,
                btime,
                ..
            } => {
                Self::process_state(core, shared, &moves, &status, wtime, btime);
            }
            GameStreamEvent::ChatLine {}
            | GameStreamEvent::OpponentGone {}
            | GameStreamEvent::Unknown => {}
        }
    }

    fn extract_player_info(
        core: &Arc<PlayerCore>,
        shared: &Arc<LichessShared>,
        white: &StreamPlayer,
        black: &StreamPlayer,
    ) {
        let white_name = white.display_name();
        let black_name = black.display_name();
        let white_rating = white.display_rating();
        let black_rating = black.display_rating();
        *shared.white_name.lock().unwrap() = white_name.clone();
        *shared.white_rating.lock().unwrap() = white_rating.clone();
        *shared.black_name.lock().unwrap() = black_name.clone();
        *shared.black_rating.lock().unwrap() = black_rating.clone();

        let username = shared.username.lock().unwrap().clone();
        let local_is_white = white_name == username;
        *shared.local_is_white.lock().unwrap() = Some(local_is_white);
        shared.board_flip.store(!local_is_white, Ordering::SeqCst);
        // This instance represents the remote opponent.
        core.set_color(if local_is_white {
            Color::Black
        } else {
            Color::White
        });

        info!(
            "[LichessPlayer] Players: {} ({}) vs {} ({}), local user is {}",
            white_name,
            white_rating,
            black_name,
            black_rating,
            if local_is_white { "White" } else { "Black" }
        );

        if let Some(game_info) = core.callbacks().game_info {
            game_info(white_name, white_rating, black_name, black_rating);
        }
        if core.set_state(PlayerState::Ready).is_some() {
            // A move request was queued while connecting; if the server has
            // already produced a move, restore its LED guidance.
            if let Some(pending) = *shared.pending.lock().unwrap() {
                core.fire_pending_move(pending);
            }
        }
    }

    fn process_state(
        core: &Arc<PlayerCore>,
        shared: &Arc<LichessShared>,
        moves: &str,
        status: &str,
        wtime: Option<u64>,
        btime: Option<u64>,
    ) {
        // Clock update first so displays track the server.
        {
            let mut times = shared.times.lock().unwrap();
            if let Some(wtime) = wtime {
                times.0 = (wtime / 1000) as i64;
            }
            if let Some(btime) = btime {
                times.1 = (btime / 1000) as i64;
            }
            if let Some(clock) = core.callbacks().clock {
                clock(times.0, times.1);
            }
        }

        {
            let mut remote = shared.remote_moves.lock().unwrap();
            if *remote != moves {
                *remote = moves.to_string();
                drop(remote);
                Self::check_for_remote_move(core, shared);
            }
        }

        let status = status.to_lowercase();
        let terminal = [
            "mate",
            "resign",
            "draw",
            "aborted",
            "outoftime",
            "timeout",
            "stalemate",
        ];
        if terminal.contains(&status.as_str()) {
            info!("[LichessPlayer] Game ended: {}", status);
            let _ = core.set_state(PlayerState::Stopped);
        }
    }

    fn check_for_remote_move(core: &Arc<PlayerCore>, shared: &Arc<LichessShared>) {
        let moves = shared.remote_moves.lock().unwrap().clone();
        if moves.is_empty() {
            return;
        }
        {
            let mut last = shared.last_processed_moves.lock().unwrap();
            if *last == moves {
                return;
            }
            *last = moves.clone();
        }

        let moves_list: Vec<&str> = moves.split_whitespace().collect();
        let Some(&last_move) = moves_list.last() else {
            return;
        };
        let last_move_was_white = moves_list.len() % 2 == 1;

        // Ignore echoes of the local player's own moves.
        if let Some(local_is_white) = *shared.local_is_white.lock().unwrap() {
            if local_is_white == last_move_was_white {
                debug!("[LichessPlayer] Ignoring echo of local move: {}", last_move);
                return;
            }
        }

        info!("[LichessPlayer] Remote move from server: {}", last_move);
        match BoardMove::parse(&last_move.to_lowercase()) {
            Ok(mv) => {
                *shared.pending.lock().unwrap() = Some(mv);
                core.fire_pending_move(mv);
            }
            Err(e) => error!(
                "[LichessPlayer] Invalid move from Lichess: {}: {}",
                last_move, e
            ),
        }
    }

    fn send_move_to_server(&self, mv: &BoardMove) {
        if self.state() != PlayerState::Ready {
            warn!(
                "[LichessPlayer] Cannot send move - state is {}",
                self.state()
            );
            return;
        }
        let (Some(client), Some(game_id)) = (self.shared.client(), self.shared.game_id()) else {
            warn!("[LichessPlayer] Cannot send move - no active game");
            return;
        };

        let uci = mv.uci();
        for attempt in 1..=SEND_MOVE_RETRIES {
            match client.make_move(&game_id, &uci) {
                Ok(()) => {
                    debug!("[LichessPlayer] Move sent successfully");
                    return;
                }
                Err(e) => {
                    warn!("[LichessPlayer] Move attempt {} failed: {}", attempt, e);
                    if attempt < SEND_MOVE_RETRIES {
                        thread::sleep(Duration::from_millis(500));
                    }
                }
            }
        }
        error!(
            "[LichessPlayer] Failed to send move after {} attempts",
            SEND_MOVE_RETRIES
        );
    }
}

impl Player for LichessPlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    fn player_type(&self) -> PlayerType {
        PlayerType::Lichess
    }

    fn pending_move(&self) -> Option<BoardMove> {
        *self.shared.pending.lock().unwrap()
    }

    fn start(&self) -> bool {
        info!("[LichessPlayer] Starting Lichess player");
        let _ = self.core.set_state(PlayerState::Initializing);
        self.core.report_status("Connecting to Lichess...");

        if self.shared.config.token.trim().is_empty() {
            error!("[LichessPlayer] No valid API token configured");
            self.core.set_error("No API token configured");
            return false;
        }

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("lichess-seek".to_string())
            .spawn(move || Self::connect(&core, &shared))
            .expect("spawn lichess connect thread");
        true
    }

    fn stop(&self) {
        info!("[LichessPlayer] Stopping Lichess player");
        self.shared.should_stop.store(true, Ordering::SeqCst);
        let _ = self.core.set_state(PlayerState::Stopped);
    }

    fn do_request_move(&self, _position: &Chess) {
        self.core.reset_lifted();
        if let Some(pending) = *self.shared.pending.lock().unwrap() {
            info!("[LichessPlayer] Displaying pending move: {}", pending);
            self.core.fire_pending_move(pending);
        } else {
            debug!("[LichessPlayer] request_move called - waiting for server move");
        }
    }

    fn validate_formed(&self, mv: BoardMove, _position: &Chess) -> PieceEventOutcome {
        let pending = *self.shared.pending.lock().unwrap();
        let Some(expected) = pending else {
            warn!("[LichessPlayer] Move formed but no pending move from server");
            return PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch);
        };
        if mv.same_squares(&expected) {
            PieceEventOutcome::Submit(expected)
        } else {
            warn!(
                "[LichessPlayer] Move {} does not match server {} - correction needed",
                mv, expected
            );
            PieceEventOutcome::Error(PlayerErrorKind::MoveMismatch)
        }
    }

    fn on_move_made(&self, mv: &BoardMove, position_after: &Chess) {
        *self.shared.pending.lock().unwrap() = None;
        self.core.reset_lifted();

        // After the local player's move the turn belongs to this (remote)
        // instance; that move must be forwarded. Our own moves came FROM the
        // server and are not echoed back.
        if Some(position_after.turn()) == self.color() {
            info!("[LichessPlayer] Sending local player's move to server: {}", mv);
            self.send_move_to_server(mv);
        } else {
            debug!("[LichessPlayer] Our move executed: {}", mv);
        }
    }

    fn on_resign(&self, _color: Color) {
        if self.state() != PlayerState::Ready {
            info!("[LichessPlayer] Cannot resign - state is {}", self.state());
            return;
        }
        let (Some(client), Some(game_id)) = (self.shared.client(), self.shared.game_id()) else {
            warn!("[LichessPlayer] Cannot resign - no active game");
            return;
        };
        info!("[LichessPlayer] Resigning game");
        if let Err(e) = client.resign(&game_id) {
            error!("[LichessPlayer] Failed to resign: {}", e);
        }
    }

    fn on_draw_offer(&self) {
        let (Some(client), Some(game_id)) = (self.shared.client(), self.shared.game_id()) else {
            warn!("[LichessPlayer] Cannot offer draw - no active game");
            return;
        };
        info!("[LichessPlayer] Offering draw");
        if let Err(e) = client.offer_draw(&game_id) {
            error!("[LichessPlayer] Failed to offer draw: {}", e);
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_resign: true,
            // A move sent to the server cannot be undone.
            supports_takeback: false,
            supports_late_castling: false,
        }
    }

    fn get_info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name(),
            color: self.color(),
            player_type: self.player_type(),
            state: self.state(),
            error: self.core.error_message(),
            description: "Lichess online game".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> LichessPlayer {
        let config = LichessPlayerConfigBuilder::default()
            .token("test-token")
            .build()
            .unwrap();
        LichessPlayer::new("Lichess", config)
    }

    #[test]
    fn remote_move_becomes_pending_and_echoes_are_ignored() {
        let p = player();
        *p.shared.username.lock().unwrap() = "localuser".to_string();
        let white = StreamPlayer {
            id: Some("localuser".to_string()),
            name: Some("localuser".to_string()),
            rating: Some(1500),
            ai_level: None,
        };
        let black = StreamPlayer {
            id: Some("remote".to_string()),
            name: Some("remote".to_string()),
            rating: Some(1480),
            ai_level: None,
        };
        let _ = p.core.set_state(PlayerState::Initializing);
        LichessPlayer::extract_player_info(&p.core, &p.shared, &white, &black);
        assert_eq!(p.color(), Some(Color::Black));
        assert!(!p.board_flip());
        assert!(p.is_ready());

        // Local (white) move echo: ignored.
        LichessPlayer::process_state(&p.core, &p.shared, "e2e4", "started", None, None);
        assert!(p.pending_move().is_none());

        // Remote (black) reply: becomes pending.
        LichessPlayer::process_state(&p.core, &p.shared, "e2e4 e7e5", "started", None, None);
        assert_eq!(p.pending_move().map(|m| m.uci()), Some("e7e5".to_string()));
    }

    #[test]
    fn clock_updates_reach_the_callback() {
        let p = player();
        let seen = Arc::new(Mutex::new((0i64, 0i64)));
        let sink = seen.clone();
        p.core.set_callbacks(super::super::base::PlayerCallbacks {
            clock: Some(Arc::new(move |w, b| *sink.lock().unwrap() = (w, b))),
            ..Default::default()
        });
        LichessPlayer::process_state(
            &p.core,
            &p.shared,
            "",
            "started",
            Some(540_000),
            Some(583_000),
        );
        assert_eq!(*seen.lock().unwrap(), (540, 583));
    }

    #[test]
    fn terminal_status_stops_the_player() {
        let p = player();
        LichessPlayer::process_state(&p.core, &p.shared, "", "mate", None, None);
        assert_eq!(p.state(), PlayerState::Stopped);
    }

    #[test]
    fn lichess_capabilities_restrict_takeback_and_late_castling() {
        let caps = player().capabilities();
        assert!(caps.can_resign);
        assert!(!caps.supports_takeback);
        assert!(!caps.supports_late_castling);
    }

    #[test]
    fn empty_token_fails_start() {
        let config = LichessPlayerConfigBuilder::default()
            .token("")
            .build()
            .unwrap();
        let p = LichessPlayer::new("Lichess", config);
        assert!(!p.start());
        assert_eq!(p.state(), PlayerState::Error);
    }
}
