//! LED guidance for restoring physical/logical correspondence.
//!
//! Computes missing/extra squares from two presence states, detects the
//! kings-in-center gesture, and picks one piece to guide. Kept independent
//! from the session so it can be tested in isolation.

use log::{info, warn};
use shakmaty::Square;

use crate::led::LedCallbacks;
use crate::state::{manhattan_distance, LogicalBoard, PresenceState, BOARD_SIZE};

use super::move_state::CENTER_SQUARES;

/// What the guidance pass decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceOutcome {
    /// Physical board already matches; LEDs were turned off.
    Clean,
    /// The kings-in-center gesture was detected; the caller owns the menu.
    KingsInCenter,
    /// LEDs now guide the user.
    Guided,
}

/// Compute `(missing, extra)` squares between the current physical state and
/// the expected logical state.
pub fn compute_state_deltas(
    current: &PresenceState,
    expected: &PresenceState,
) -> (Vec<Square>, Vec<Square>) {
    let mut missing = Vec::new();
    let mut extra = Vec::new();
    for i in 0..BOARD_SIZE {
        match (expected[i], current[i]) {
            (1, 0) => missing.push(Square::new(i as u32)),
            (0, 1) => extra.push(Square::new(i as u32)),
            _ => {}
        }
    }
    (missing, extra)
}

/// Kings-in-center gesture: both kings lifted, at least two of d4/d5/e4/e5
/// occupied by extra pieces, and the game not already over.
pub fn check_kings_in_center(
    board: &LogicalBoard,
    missing: &[Square],
    extra: &[Square],
) -> bool {
    if board.outcome().is_some() {
        return false;
    }
    let (white_king, black_king) = match (
        board.king_square(shakmaty::Color::White),
        board.king_square(shakmaty::Color::Black),
    ) {
        (Some(w), Some(b)) => (w, b),
        _ => return false,
    };
    if !(missing.contains(&white_king) && missing.contains(&black_king)) {
        return false;
    }
    let center_extras = extra
        .iter()
        .filter(|sq| CENTER_SQUARES.contains(sq))
        .count();
    center_extras >= 2
}

/// Pick the `(from, to)` pair that minimizes Manhattan distance across all
/// extra/missing pairings, first minimizer in row-major order.
///
/// The single extra + single missing case is the common one and short
/// circuits; there is no assignment library in the stack, so the general
/// case scans the full cost matrix for the global minimum pair.
pub fn choose_guidance_pair(extra: &[Square], missing: &[Square]) -> (Square, Square) {
    if extra.len() == 1 && missing.len() == 1 {
        return (extra[0], missing[0]);
    }

    let mut best = (extra[0], missing[0]);
    let mut best_cost = u32::MAX;
    for &from in extra {
        for &to in missing {
            let cost = manhattan_distance(from, to);
            if cost < best_cost {
                best_cost = cost;
                best = (from, to);
            }
        }
    }
    best
}

/// Drive LED guidance for correcting misplaced pieces.
pub fn provide_correction_guidance(
    led: &dyn LedCallbacks,
    board: &LogicalBoard,
    current: &PresenceState,
    expected: &PresenceState,
    detect_kings_in_center: bool,
) -> GuidanceOutcome {
    let (missing, extra) = compute_state_deltas(current, expected);

    if missing.is_empty() && extra.is_empty() {
        led.off();
        return GuidanceOutcome::Clean;
    }

    if detect_kings_in_center && check_kings_in_center(board, &missing, &extra) {
        info!("[GameManager.provide_correction_guidance] Kings-in-center gesture detected");
        return GuidanceOutcome::KingsInCenter;
    }

    warn!(
        "[GameManager.provide_correction_guidance] Found {} wrong pieces, {} missing pieces",
        extra.len(),
        missing.len()
    );

    if !extra.is_empty() && !missing.is_empty() {
        let (from, to) = choose_guidance_pair(&extra, &missing);
        led.off();
        led.from_to_fast(from, to, 0);
        warn!(
            "[GameManager.provide_correction_guidance] Guiding piece from {} to {}",
            from, to
        );
        return GuidanceOutcome::Guided;
    }

    if !missing.is_empty() {
        led.off();
        for &square in &missing {
            led.single_fast(square, 0);
        }
        return GuidanceOutcome::Guided;
    }

    led.off();
    led.array_fast(&extra, 0);
    GuidanceOutcome::Guided
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::presence_of;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLed {
        calls: Mutex<Vec<String>>,
    }

    impl LedCallbacks for RecordingLed {
        fn off(&self) {
            self.calls.lock().unwrap().push("off".to_string());
        }
        fn single_fast(&self, square: Square, _repeat: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("single:{}", square));
        }
        fn from_to(&self, from: Square, to: Square, _repeat: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("from_to:{}{}", from, to));
        }
        fn from_to_fast(&self, from: Square, to: Square, _repeat: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fast:{}{}", from, to));
        }
        fn from_to_hint(&self, from: Square, to: Square, _repeat: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("hint:{}{}", from, to));
        }
        fn array_fast(&self, squares: &[Square], _repeat: u32) {
            let names: Vec<String> = squares.iter().map(|s| s.to_string()).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("array:{}", names.join(",")));
        }
    }

    #[test]
    fn deltas_between_presence_states() {
        let mut current = *crate::state::STARTING_PRESENCE;
        current[usize::from(Square::E2)] = 0; // lifted e2
        current[usize::from(Square::E5)] = 1; // placed on e5
        let expected = *crate::state::STARTING_PRESENCE;
        let (missing, extra) = compute_state_deltas(&current, &expected);
        assert_eq!(missing, vec![Square::E2]);
        assert_eq!(extra, vec![Square::E5]);
    }

    #[test]
    fn single_pair_guides_from_extra_to_missing() {
        let led = RecordingLed::default();
        let board = LogicalBoard::new();
        let mut current = board.presence();
        current[usize::from(Square::D2)] = 0;
        current[usize::from(Square::D3)] = 1;
        let expected = board.presence();
        let outcome = provide_correction_guidance(&led, &board, &current, &expected, true);
        assert_eq!(outcome, GuidanceOutcome::Guided);
        let calls = led.calls.lock().unwrap();
        assert!(calls.contains(&"fast:d3d2".to_string()));
    }

    #[test]
    fn matching_states_turn_leds_off() {
        let led = RecordingLed::default();
        let board = LogicalBoard::new();
        let state = board.presence();
        let outcome = provide_correction_guidance(&led, &board, &state, &state, true);
        assert_eq!(outcome, GuidanceOutcome::Clean);
        assert_eq!(*led.calls.lock().unwrap(), vec!["off".to_string()]);
    }

    #[test]
    fn missing_only_flashes_each_square() {
        let led = RecordingLed::default();
        let board = LogicalBoard::new();
        let mut current = board.presence();
        current[usize::from(Square::B1)] = 0;
        current[usize::from(Square::G1)] = 0;
        let expected = board.presence();
        provide_correction_guidance(&led, &board, &current, &expected, true);
        let calls = led.calls.lock().unwrap();
        assert!(calls.contains(&"single:b1".to_string()));
        assert!(calls.contains(&"single:g1".to_string()));
    }

    #[test]
    fn kings_in_center_gesture_detected() {
        let board = LogicalBoard::new();
        let mut current = board.presence();
        current[usize::from(Square::E1)] = 0;
        current[usize::from(Square::E8)] = 0;
        current[usize::from(Square::E4)] = 1;
        current[usize::from(Square::D5)] = 1;
        let expected = board.presence();
        let led = RecordingLed::default();
        let outcome = provide_correction_guidance(&led, &board, &current, &expected, true);
        assert_eq!(outcome, GuidanceOutcome::KingsInCenter);
    }

    #[test]
    fn kings_in_center_not_detected_when_game_over() {
        let mut board = LogicalBoard::new();
        for uci in ["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"] {
            board.push_uci(uci).unwrap();
        }
        let expected = board.presence();
        let mut current = expected;
        current[usize::from(Square::E1)] = 0;
        current[usize::from(Square::E8)] = 0;
        current[usize::from(Square::E4)] = 1;
        current[usize::from(Square::D5)] = 1;
        let (missing, extra) = compute_state_deltas(&current, &expected);
        assert!(!check_kings_in_center(&board, &missing, &extra));
    }

    #[test]
    fn guidance_pair_minimizes_manhattan_distance() {
        let extra = vec![Square::A1, Square::H8];
        let missing = vec![Square::G8, Square::B2];
        let (from, to) = choose_guidance_pair(&extra, &missing);
        assert_eq!((from, to), (Square::H8, Square::G8));
    }

    #[test]
    fn presence_round_trip_is_stable() {
        let board = LogicalBoard::new();
        let a = presence_of(board.position());
        let b = presence_of(board.position());
        assert_eq!(a, b);
    }
}
