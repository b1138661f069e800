//! Piece-presence projection of a chess position.
//!
//! Both the physical sensor grid and the logical board reduce to the same
//! 64-byte occupancy vector, which makes physical/logical comparison O(1).

use once_cell::sync::Lazy;
use shakmaty::{Chess, Position, Square};

pub const BOARD_SIZE: usize = 64;
pub const BOARD_WIDTH: usize = 8;

/// 64 bytes, element `i` is 1 if a piece sits on square `i` (a1 = 0).
pub type PresenceState = [u8; BOARD_SIZE];

/// Occupancy of the standard starting position (ranks 1, 2, 7 and 8).
pub static STARTING_PRESENCE: Lazy<PresenceState> = Lazy::new(|| {
    let mut state = [0u8; BOARD_SIZE];
    for (square, value) in state.iter_mut().enumerate() {
        let rank = square / BOARD_WIDTH;
        if rank <= 1 || rank >= 6 {
            *value = 1;
        }
    }
    state
});

/// Project a position onto its piece-presence state.
pub fn presence_of(position: &Chess) -> PresenceState {
    let mut state = [0u8; BOARD_SIZE];
    let occupied = position.board().occupied();
    for (square, value) in state.iter_mut().enumerate() {
        if occupied.contains(Square::new(square as u32)) {
            *value = 1;
        }
    }
    state
}

pub fn states_match(a: &PresenceState, b: &PresenceState) -> bool {
    a == b
}

pub fn is_starting_position(state: &PresenceState) -> bool {
    states_match(state, &STARTING_PRESENCE)
}

/// Manhattan distance between two squares, used by correction guidance.
pub fn manhattan_distance(a: Square, b: Square) -> u32 {
    let (ar, af) = (u32::from(a.rank()), u32::from(a.file()));
    let (br, bf) = (u32::from(b.rank()), u32::from(b.file()));
    ar.abs_diff(br) + af.abs_diff(bf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_matches_default_board() {
        let state = presence_of(&Chess::default());
        assert!(is_starting_position(&state));
    }

    #[test]
    fn empty_board_is_not_starting_position() {
        let state = [0u8; BOARD_SIZE];
        assert!(!is_starting_position(&state));
    }

    #[test]
    fn manhattan_distance_is_symmetric() {
        assert_eq!(manhattan_distance(Square::A1, Square::H8), 14);
        assert_eq!(manhattan_distance(Square::H8, Square::A1), 14);
        assert_eq!(manhattan_distance(Square::E4, Square::E4), 0);
        assert_eq!(manhattan_distance(Square::D2, Square::E2), 1);
    }
}
