//! Clock and analysis interfaces consumed for move persistence.

use std::sync::Mutex;

/// Remaining time per side, managed by the clock service.
pub trait ClockService: Send + Sync {
    /// Returns `(white_seconds, black_seconds)`.
    fn get_times(&self) -> (i64, i64);

    fn set_times(&self, white_seconds: i64, black_seconds: i64);
}

/// Source of the live evaluation score in pawns (white's perspective).
///
/// The core converts to centipawns for persistence.
pub trait ScoreSource: Send + Sync {
    fn score_pawns(&self) -> Option<f64>;
}

/// In-memory clock used when no external clock service is wired.
#[derive(Default)]
pub struct SharedClock {
    times: Mutex<(i64, i64)>,
}

impl SharedClock {
    pub fn new(white_seconds: i64, black_seconds: i64) -> Self {
        SharedClock {
            times: Mutex::new((white_seconds, black_seconds)),
        }
    }
}

impl ClockService for SharedClock {
    fn get_times(&self) -> (i64, i64) {
        *self.times.lock().unwrap()
    }

    fn set_times(&self, white_seconds: i64, black_seconds: i64) {
        *self.times.lock().unwrap() = (white_seconds, black_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_clock_round_trips() {
        let clock = SharedClock::new(600, 600);
        clock.set_times(540, 583);
        assert_eq!(clock.get_times(), (540, 583));
    }
}
