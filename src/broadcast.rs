//! Pending-move broadcast slot for out-of-process displays.
//!
//! The web UI shows the move the player is expected to execute as an arrow.
//! `MoveState::reset` clears the slot whenever a move completes or fails.

use once_cell::sync::Lazy;
use std::sync::Mutex;

static PENDING_MOVE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

/// Publish the pending move as a UCI string, or clear it with `None`.
pub fn set_pending_move(uci: Option<String>) {
    *PENDING_MOVE.lock().unwrap() = uci;
}

pub fn pending_move() -> Option<String> {
    PENDING_MOVE.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_set_and_clear() {
        set_pending_move(Some("e2e4".to_string()));
        assert_eq!(pending_move().as_deref(), Some("e2e4"));
        set_pending_move(None);
        assert!(pending_move().is_none());
    }
}
