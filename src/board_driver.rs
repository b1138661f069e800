//! Physical board driver interface consumed by the game core.
//!
//! The real driver talks to the sensor grid over serial; tests use a scripted
//! implementation. The core treats beeps as fire-and-forget.

use crate::state::PresenceState;

/// Sounds the core asks the board to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    General,
    WrongMove,
}

/// Why a sound is being played, for driver-side filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepContext {
    GameEvent,
    Error,
}

/// Keys under the display, forwarded through the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Back,
    Up,
    Down,
    Tick,
    Help,
    Play,
}

pub trait BoardDriver: Send + Sync {
    /// Read the full 64-square occupancy. Blocks until the board answers.
    fn chess_state(&self) -> Option<PresenceState>;

    /// Occupancy read that yields to piece-event polling.
    ///
    /// Returns `None` when the board is busy; callers skip their validation
    /// in that case.
    fn chess_state_low_priority(&self) -> Option<PresenceState>;

    fn beep(&self, sound: Sound, context: BeepContext);
}
