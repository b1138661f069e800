//! Castling (king-first, rook-first late castling) and correction-mode
//! round trips.

mod common;

use std::sync::atomic::Ordering;

use board_core::shakmaty::{Position, Role, Square};
use common::{Harness, LedEvent};

fn prepare_white_kingside_castle(harness: &Harness) {
    harness.play(Square::G1, Square::F3);
    harness.play(Square::B8, Square::C6);
    harness.play(Square::G2, Square::G3);
    harness.play(Square::C6, Square::B8);
    harness.play(Square::F1, Square::G2);
    harness.play(Square::B8, Square::C6);
}

#[test]
fn king_first_castling_executes_as_one_move() {
    let harness = Harness::new(None);
    prepare_white_kingside_castle(&harness);

    // The rook slides over without its own sensor events registering.
    harness.board.lift(Square::H1);
    harness.board.place(Square::F1);
    harness.play(Square::E1, Square::G1);

    assert_eq!(
        harness.recorded_moves().last().map(String::as_str),
        Some("e1g1")
    );
    let position = harness.gm.position();
    assert_eq!(
        position.board().piece_at(Square::G1).map(|p| p.role),
        Some(Role::King)
    );
    assert_eq!(
        position.board().piece_at(Square::F1).map(|p| p.role),
        Some(Role::Rook)
    );
}

#[test]
fn rook_first_castling_completes_after_opponent_reply() {
    let harness = Harness::new(None);
    prepare_white_kingside_castle(&harness);

    // Rook h1 -> f1 executes as a regular move but is tracked.
    harness.play(Square::H1, Square::F1);
    assert_eq!(
        harness.recorded_moves().last().map(String::as_str),
        Some("h1f1")
    );

    // Opponent replies in between.
    harness.play(Square::C6, Square::B8);

    // The king then completes the castle; the rook move and the reply are
    // undone and the real castling move is played.
    harness.lift(Square::E1);
    harness.place(Square::G1);

    assert_eq!(
        harness.recorded_moves().last().map(String::as_str),
        Some("e1g1")
    );
    let position = harness.gm.position();
    assert_eq!(
        position.board().piece_at(Square::G1).map(|p| p.role),
        Some(Role::King)
    );
    assert_eq!(
        position.board().piece_at(Square::F1).map(|p| p.role),
        Some(Role::Rook)
    );
    // The reply was undone, so the knight is logically back on c6 and the
    // takeback callback asked the opponent to reconsider.
    assert_eq!(
        position.board().piece_at(Square::C6).map(|p| p.role),
        Some(Role::Knight)
    );
    assert!(harness.takebacks.load(Ordering::SeqCst) >= 1);
}

#[test]
fn rook_returned_to_home_cancels_castling_tracking() {
    let harness = Harness::new(None);
    prepare_white_kingside_castle(&harness);

    harness.lift(Square::H1);
    harness.place(Square::H1);

    // No move was made; the rook lift/replace is not an error.
    assert_eq!(harness.recorded_moves().len(), 6);
    // A normal castle still works afterwards.
    harness.board.lift(Square::H1);
    harness.board.place(Square::F1);
    harness.play(Square::E1, Square::G1);
    assert_eq!(
        harness.recorded_moves().last().map(String::as_str),
        Some("e1g1")
    );
}

#[test]
fn orphan_place_enters_correction_and_restoring_exits() {
    let harness = Harness::new(None);

    // A spare piece appears on d4.
    harness.place(Square::D4);

    assert!(harness.board.wrong_beeps() >= 1);
    assert!(harness.led.contains(&LedEvent::Array(vec![Square::D4])));

    // Removing it restores correspondence and ends correction mode.
    harness.lift(Square::D4);

    // Normal play resumes.
    harness.play(Square::E2, Square::E4);
    assert_eq!(harness.recorded_moves(), vec!["e2e4".to_string()]);
}

#[test]
fn correction_guides_minimum_distance_pair() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);

    // Black knight dropped on b6, where it cannot legally land.
    harness.lift(Square::B8);
    harness.place(Square::B6);

    // Illegal placement: correction guides from the extra square b6 to the
    // missing square b8.
    assert!(harness.board.wrong_beeps() >= 1);
    assert!(harness
        .led
        .contains(&LedEvent::FromToFast(Square::B6, Square::B8)));

    // Undo the mistake and play a legal knight move.
    harness.lift(Square::B6);
    harness.place(Square::B8);
    harness.play(Square::B8, Square::C6);
    assert_eq!(
        harness.recorded_moves(),
        vec!["e2e4".to_string(), "b8c6".to_string()]
    );
}

#[test]
fn pinned_piece_lift_triggers_correction() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);
    harness.play(Square::D1, Square::H5);

    // The f7 pawn sits on the h5-e8 diagonal and is pinned by the queen;
    // it has no legal moves.
    harness.lift(Square::F7);

    assert!(harness.board.wrong_beeps() >= 1);
    // Restore and continue.
    harness.place(Square::F7);
    harness.play(Square::B8, Square::C6);
    assert_eq!(
        harness.recorded_moves().last().map(String::as_str),
        Some("b8c6")
    );
}
