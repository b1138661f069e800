//! End-to-end flows through the game manager: scripted sensor events in,
//! logical state + callbacks + LEDs out.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use board_core::database::GameStore;
use board_core::events::GameEvent;
use board_core::shakmaty::Square;
use board_core::state::BoardMove;
use common::{Harness, LedEvent};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[test]
fn basic_opening_move() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);

    assert_eq!(harness.recorded_moves(), vec!["e2e4".to_string()]);
    assert_eq!(
        harness.gm.get_fen(),
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
    );
    assert!(harness
        .recorded_events()
        .contains(&GameEvent::BlackTurn));
    // Immediate feedback lit the target square.
    assert!(harness.led.contains(&LedEvent::Single(Square::E4)));
    assert_eq!(harness.board.wrong_beeps(), 0);
}

#[test]
fn opening_move_is_persisted_with_initial_record() {
    let db_path = common::temp_db_path();
    let harness = Harness::new(Some(db_path.clone()));
    harness.play(Square::E2, Square::E4);

    let store = GameStore::open(&db_path).unwrap();
    let game_id = store.latest_game_id().unwrap().expect("game row created");
    let moves = store.moves_for_game(game_id).unwrap();
    assert_eq!(moves.len(), 2);
    assert_eq!(moves[0].mv, "");
    assert_eq!(moves[0].fen, START_FEN);
    assert_eq!(moves[1].mv, "e2e4");
    assert_eq!(moves[1].white_clock, Some(600));
    assert_eq!(moves[1].black_clock, Some(600));
}

#[test]
fn capture_with_two_lift_order() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);
    harness.play(Square::D7, Square::D5);

    // Captured piece lifted first, capturing piece placed on its square.
    harness.play_capture(Square::E4, Square::D5);

    assert_eq!(
        harness.recorded_moves(),
        vec!["e2e4".to_string(), "d7d5".to_string(), "e4d5".to_string()]
    );
    assert_eq!(harness.board.wrong_beeps(), 0);
    assert_eq!(
        harness.gm.get_fen(),
        "rnbqkbnr/ppp1pppp/8/3P4/8/8/PPPP1PPP/RNBQKBNR b KQkq - 0 2"
    );
}

#[test]
fn missed_lift_recovery_for_forced_move() {
    let harness = Harness::new(None);
    harness.gm.computer_move("g1f3", true);
    harness.gm.drain();
    assert!(harness
        .led
        .contains(&LedEvent::FromTo(Square::G1, Square::F3)));

    // The lift was never observed; only the PLACE arrives, with the board
    // already in the post-move occupancy.
    harness.board.lift(Square::G1);
    harness.place(Square::F3);

    assert_eq!(harness.recorded_moves(), vec!["g1f3".to_string()]);
    assert!(harness.recorded_events().contains(&GameEvent::BlackTurn));
}

#[test]
fn wrong_piece_during_forced_move_enters_correction() {
    let harness = Harness::new(None);
    harness.gm.computer_move("e2e4", true);
    harness.gm.drain();

    harness.lift(Square::D2);

    assert!(harness.board.wrong_beeps() >= 1);
    // Guidance flashes the square the lifted piece must return to.
    assert!(harness.led.contains(&LedEvent::Single(Square::D2)));
    assert_eq!(harness.gm.get_fen(), START_FEN);

    // No move executes until the board is restored.
    harness.place(Square::D2); // restores the position, exits correction
    harness.play(Square::E2, Square::E4); // forced move completes normally
    assert_eq!(harness.recorded_moves(), vec!["e2e4".to_string()]);
}

#[test]
fn takeback_after_one_ply() {
    let db_path = common::temp_db_path();
    let harness = Harness::new(Some(db_path.clone()));
    harness.play(Square::E2, Square::E4);

    {
        let store = GameStore::open(&db_path).unwrap();
        let game_id = store.latest_game_id().unwrap().unwrap();
        assert_eq!(store.move_count(game_id).unwrap(), 2);
    }

    // The pawn goes back without an observed LIFT: only PLACE(e2) arrives
    // while e4 is already empty.
    harness.board.lift(Square::E4);
    harness.place(Square::E2);

    assert_eq!(harness.gm.get_fen(), START_FEN);
    assert_eq!(harness.takebacks.load(Ordering::SeqCst), 1);

    let store = GameStore::open(&db_path).unwrap();
    let game_id = store.latest_game_id().unwrap().unwrap();
    let moves = store.moves_for_game(game_id).unwrap();
    assert_eq!(moves.len(), 1, "the e2e4 row was deleted");
    assert_eq!(moves[0].mv, "");
}

#[test]
fn lifted_piece_takeback_attempt_is_corrected() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);

    // Lifting the black pawn during white's turn trips the no-legal-move
    // guard; moving it backwards lands in correction mode, which guides
    // the pawn back to e5 rather than rolling the move back.
    harness.lift(Square::E5);
    harness.place(Square::E7);

    assert!(harness.board.wrong_beeps() >= 1);
    assert_eq!(harness.takebacks.load(Ordering::SeqCst), 0);
    assert!(harness
        .led
        .contains(&LedEvent::FromToFast(Square::E7, Square::E5)));

    // Restoring the post-move position exits correction and play resumes.
    harness.lift(Square::E7);
    harness.place(Square::E5);
    harness.play(Square::G1, Square::F3);
    assert_eq!(
        harness.recorded_moves(),
        vec!["e2e4".to_string(), "e7e5".to_string(), "g1f3".to_string()]
    );
}

#[test]
fn kings_in_center_gesture_shows_resign_menu() {
    let harness = Harness::new(None);
    let gesture = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));
    {
        let gesture = gesture.clone();
        harness.gm.set_on_kings_in_center(Arc::new(move || {
            gesture.fetch_add(1, Ordering::SeqCst);
        }));
        let cancelled = cancelled.clone();
        harness
            .gm
            .set_on_kings_in_center_cancel(Arc::new(move || {
                cancelled.fetch_add(1, Ordering::SeqCst);
            }));
    }

    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);

    // Both kings to the central squares.
    harness.lift(Square::E1);
    harness.lift(Square::E8);
    harness.place(Square::D4);
    harness.place(Square::D5);

    assert_eq!(gesture.load(Ordering::SeqCst), 1, "resign menu offered once");

    // A further lift while the menu shows cancels it and guides the user
    // back into correction mode.
    harness.lift(Square::D4);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[test]
fn king_lift_resign_fires_after_timeout() {
    let harness =
        Harness::with_king_lift_timeout(None, Duration::from_millis(80));
    let resigns = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    {
        let resigns = resigns.clone();
        harness.gm.set_on_king_lift_resign(Arc::new(move |_color| {
            resigns.fetch_add(1, Ordering::SeqCst);
        }));
        let cancels = cancels.clone();
        harness
            .gm
            .set_on_king_lift_resign_cancel(Arc::new(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            }));
    }

    // Give the king mobility first.
    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);

    harness.lift(Square::E1);
    std::thread::sleep(Duration::from_millis(250));
    harness.gm.drain();
    assert_eq!(resigns.load(Ordering::SeqCst), 1);

    // Placing the king back dismisses the menu.
    harness.place(Square::E1);
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
}

#[test]
fn king_lift_place_within_window_cancels_timer() {
    let harness =
        Harness::with_king_lift_timeout(None, Duration::from_millis(120));
    let resigns = Arc::new(AtomicUsize::new(0));
    {
        let resigns = resigns.clone();
        harness.gm.set_on_king_lift_resign(Arc::new(move |_color| {
            resigns.fetch_add(1, Ordering::SeqCst);
        }));
    }

    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);

    harness.lift(Square::E1);
    harness.place(Square::E1);
    std::thread::sleep(Duration::from_millis(300));
    harness.gm.drain();
    assert_eq!(resigns.load(Ordering::SeqCst), 0);
}

#[test]
fn promotion_defaults_to_queen_without_callback() {
    let harness = Harness::new(None);
    // March the a-pawn through b7 to a8.
    harness.play(Square::A2, Square::A4);
    harness.play(Square::H7, Square::H6);
    harness.play(Square::A4, Square::A5);
    harness.play(Square::H6, Square::H5);
    harness.play(Square::A5, Square::A6);
    harness.play(Square::H5, Square::H4);
    harness.play_capture(Square::A6, Square::B7);
    harness.play(Square::H4, Square::H3);
    harness.play_capture(Square::B7, Square::A8);

    let moves = harness.recorded_moves();
    assert_eq!(moves.last().map(String::as_str), Some("b7a8q"));
}

#[test]
fn promotion_uses_selected_piece() {
    let harness = Harness::new(None);
    harness.gm.set_on_promotion_needed(Arc::new(|_is_white| 'n'));

    harness.play(Square::A2, Square::A4);
    harness.play(Square::H7, Square::H6);
    harness.play(Square::A4, Square::A5);
    harness.play(Square::H6, Square::H5);
    harness.play(Square::A5, Square::A6);
    harness.play(Square::H5, Square::H4);
    harness.play_capture(Square::A6, Square::B7);
    harness.play(Square::H4, Square::H3);
    harness.play_capture(Square::B7, Square::A8);

    let moves = harness.recorded_moves();
    assert_eq!(moves.last().map(String::as_str), Some("b7a8n"));
}

#[test]
fn external_move_submission() {
    let harness = Harness::new(None);
    // Physical board reflects the move before the submission arrives.
    harness.board.lift(Square::E2);
    harness.board.place(Square::E4);

    assert!(harness.gm.submit_move(BoardMove::parse("e2e4").unwrap()));
    harness.gm.drain();
    assert_eq!(harness.recorded_moves(), vec!["e2e4".to_string()]);

    // An illegal submission is rejected and the board state is untouched.
    assert!(!harness.gm.submit_move(BoardMove::parse("a1a5").unwrap()));
}

#[test]
fn starting_position_reset_abandons_game() {
    let db_path = common::temp_db_path();
    let harness = Harness::new(Some(db_path.clone()));
    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);

    // Physically restore the full starting position, then one stray PLACE.
    harness.board.set_state(*board_core::state::STARTING_PRESENCE);
    harness.place(Square::E2);

    assert_eq!(harness.gm.get_fen(), START_FEN);
    assert!(harness.recorded_events().contains(&GameEvent::NewGame));

    let store = GameStore::open(&db_path).unwrap();
    let game_id = store.latest_game_id().unwrap().unwrap();
    assert_eq!(
        store.game_result(game_id).unwrap().as_deref(),
        Some("*"),
        "abandoned game marked unfinished"
    );
}

#[test]
fn resignation_records_result() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);

    harness
        .gm
        .handle_resign(Some(board_core::shakmaty::Color::Black));
    harness.gm.drain();

    assert_eq!(harness.gm.get_result(), "1-0");
    assert!(harness
        .recorded_events()
        .iter()
        .any(|event| matches!(event, GameEvent::Termination(t) if t.to_string() == "RESIGN")));

    // Moves after the end of the game are refused.
    harness.play(Square::E7, Square::E5);
    assert_eq!(harness.recorded_moves(), vec!["e2e4".to_string()]);
}

#[test]
fn scholars_mate_ends_the_game() {
    let harness = Harness::new(None);
    harness.play(Square::E2, Square::E4);
    harness.play(Square::E7, Square::E5);
    harness.play(Square::D1, Square::H5);
    harness.play(Square::B8, Square::C6);
    harness.play(Square::F1, Square::C4);
    harness.play(Square::G8, Square::F6);
    harness.play_capture(Square::H5, Square::F7);

    assert_eq!(harness.gm.get_result(), "1-0");
    assert!(harness
        .recorded_events()
        .iter()
        .any(|event| matches!(event, GameEvent::Termination(t) if t.to_string() == "CHECKMATE")));
}

#[test]
fn forced_move_leds_stay_armed_until_executed() {
    let harness = Harness::new(None);
    harness.gm.computer_move("e2e4", true);
    harness.gm.drain();
    assert!(harness
        .led
        .contains(&LedEvent::FromTo(Square::E2, Square::E4)));

    harness.gm.restore_pending_move_leds();
    harness.gm.drain();
    let count = harness
        .led
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| **e == LedEvent::FromTo(Square::E2, Square::E4))
        .count();
    assert_eq!(count, 2);
}

#[test]
fn illegal_computer_move_is_refused() {
    let harness = Harness::new(None);
    harness.gm.computer_move("e2e5", true);
    harness.gm.drain();
    assert!(harness.board.wrong_beeps() >= 1);
    assert!(!harness
        .led
        .contains(&LedEvent::FromTo(Square::E2, Square::E5)));
}
