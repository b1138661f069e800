//! Shared test doubles: a scripted board driver, a recording LED sink and
//! a harness that wires a full GameManager with two human players.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use board_core::board_driver::{BeepContext, BoardDriver, Sound};
use board_core::clock::SharedClock;
use board_core::events::GameEvent;
use board_core::game_manager::{GameManager, GameManagerConfigBuilder};
use board_core::led::LedCallbacks;
use board_core::players::{HumanPlayer, Player, PlayerManager};
use board_core::shakmaty::Square;
use board_core::state::{PresenceState, STARTING_PRESENCE};

/// Physical board stand-in; occupancy is mutated by the test script.
pub struct MockBoard {
    state: Mutex<PresenceState>,
    pub beeps: Mutex<Vec<Sound>>,
}

impl MockBoard {
    pub fn new() -> Self {
        MockBoard {
            state: Mutex::new(*STARTING_PRESENCE),
            beeps: Mutex::new(Vec::new()),
        }
    }

    pub fn lift(&self, square: Square) {
        self.state.lock().unwrap()[usize::from(square)] = 0;
    }

    pub fn place(&self, square: Square) {
        self.state.lock().unwrap()[usize::from(square)] = 1;
    }

    pub fn set_state(&self, state: PresenceState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn wrong_beeps(&self) -> usize {
        self.beeps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == Sound::WrongMove)
            .count()
    }
}

impl BoardDriver for MockBoard {
    fn chess_state(&self) -> Option<PresenceState> {
        Some(*self.state.lock().unwrap())
    }

    fn chess_state_low_priority(&self) -> Option<PresenceState> {
        Some(*self.state.lock().unwrap())
    }

    fn beep(&self, sound: Sound, _context: BeepContext) {
        self.beeps.lock().unwrap().push(sound);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedEvent {
    Off,
    Single(Square),
    FromTo(Square, Square),
    FromToFast(Square, Square),
    FromToHint(Square, Square),
    Array(Vec<Square>),
}

#[derive(Default)]
pub struct RecordingLed {
    pub events: Mutex<Vec<LedEvent>>,
}

impl RecordingLed {
    pub fn contains(&self, event: &LedEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }
}

impl LedCallbacks for RecordingLed {
    fn off(&self) {
        self.events.lock().unwrap().push(LedEvent::Off);
    }
    fn single_fast(&self, square: Square, _repeat: u32) {
        self.events.lock().unwrap().push(LedEvent::Single(square));
    }
    fn from_to(&self, from: Square, to: Square, _repeat: u32) {
        self.events.lock().unwrap().push(LedEvent::FromTo(from, to));
    }
    fn from_to_fast(&self, from: Square, to: Square, _repeat: u32) {
        self.events
            .lock()
            .unwrap()
            .push(LedEvent::FromToFast(from, to));
    }
    fn from_to_hint(&self, from: Square, to: Square, _repeat: u32) {
        self.events
            .lock()
            .unwrap()
            .push(LedEvent::FromToHint(from, to));
    }
    fn array_fast(&self, squares: &[Square], _repeat: u32) {
        self.events
            .lock()
            .unwrap()
            .push(LedEvent::Array(squares.to_vec()));
    }
}

static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn temp_db_path() -> PathBuf {
    let unique = format!(
        "board_core_test_{}_{}.sqlite",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    std::env::temp_dir().join(unique)
}

pub struct Harness {
    pub gm: GameManager,
    pub board: Arc<MockBoard>,
    pub led: Arc<RecordingLed>,
    pub events: Arc<Mutex<Vec<GameEvent>>>,
    pub moves: Arc<Mutex<Vec<String>>>,
    pub takebacks: Arc<AtomicUsize>,
    pub db_path: Option<PathBuf>,
}

impl Harness {
    /// Full manager with two human players; king-lift timeout far enough
    /// out that it never fires unless a test wants it to.
    pub fn new(db_path: Option<PathBuf>) -> Self {
        Self::with_king_lift_timeout(db_path, Duration::from_secs(60))
    }

    pub fn with_king_lift_timeout(db_path: Option<PathBuf>, timeout: Duration) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let board = Arc::new(MockBoard::new());
        let led = Arc::new(RecordingLed::default());

        let config = GameManagerConfigBuilder::default()
            .save_to_database(db_path.is_some())
            .database_path(db_path.clone())
            .king_lift_timeout(timeout)
            .sensor_settle(Duration::from_millis(0))
            .build()
            .unwrap();

        let gm = GameManager::new(board.clone(), config);
        gm.set_led_callbacks(led.clone());
        gm.set_clock_service(Arc::new(SharedClock::new(600, 600)));

        let white: Arc<dyn Player> = Arc::new(HumanPlayer::new("White"));
        let black: Arc<dyn Player> = Arc::new(HumanPlayer::new("Black"));
        let players = PlayerManager::new(white, black);
        gm.set_player_manager(players.clone());
        players.start();

        let events = Arc::new(Mutex::new(Vec::new()));
        let moves = Arc::new(Mutex::new(Vec::new()));
        let takebacks = Arc::new(AtomicUsize::new(0));

        let event_sink = events.clone();
        let move_sink = moves.clone();
        let takeback_sink = takebacks.clone();
        gm.subscribe_game(
            Arc::new(move |event| event_sink.lock().unwrap().push(event)),
            Arc::new(move |uci| move_sink.lock().unwrap().push(uci)),
            Arc::new(|_key| {}),
            Some(Arc::new(move || {
                takeback_sink.fetch_add(1, Ordering::SeqCst);
            })),
        );
        gm.drain();

        Harness {
            gm,
            board,
            led,
            events,
            moves,
            takebacks,
            db_path,
        }
    }

    /// Send a LIFT event, updating the physical state first.
    pub fn lift(&self, square: Square) {
        self.board.lift(square);
        self.gm
            .receive_field(board_core::events::PieceEvent::Lift, square, 0.0);
        self.gm.drain();
    }

    /// Send a PLACE event, updating the physical state first.
    pub fn place(&self, square: Square) {
        self.board.place(square);
        self.gm
            .receive_field(board_core::events::PieceEvent::Place, square, 0.0);
        self.gm.drain();
    }

    /// Execute a simple (non-capture) move through piece events.
    pub fn play(&self, from: Square, to: Square) {
        self.lift(from);
        self.place(to);
    }

    /// Execute a capture: lift the captured piece, lift the capturing one,
    /// place the capturing piece on the target square.
    pub fn play_capture(&self, from: Square, to: Square) {
        self.lift(to);
        self.lift(from);
        self.place(to);
    }

    pub fn recorded_moves(&self) -> Vec<String> {
        self.moves.lock().unwrap().clone()
    }

    pub fn recorded_events(&self) -> Vec<GameEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.gm.unsubscribe_game();
        if let Some(path) = &self.db_path {
            let _ = std::fs::remove_file(path);
        }
    }
}
