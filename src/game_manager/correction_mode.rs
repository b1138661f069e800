//! Correction mode: physical and logical boards disagree.

use crate::state::PresenceState;

/// The snapshot taken on entry is refreshed from the logical board on every
/// correction event, because the logical position may advance (forced move
/// execution, takeback) while correction is active.
pub struct CorrectionMode {
    active: bool,
    expected_state: Option<PresenceState>,
    just_exited: bool,
}

impl CorrectionMode {
    pub fn new() -> Self {
        CorrectionMode {
            active: false,
            expected_state: None,
            just_exited: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One-shot flag suppressing the first stale PLACE event after exit.
    pub fn just_exited(&self) -> bool {
        self.just_exited
    }

    pub fn enter(&mut self, expected_state: PresenceState) {
        self.active = true;
        self.expected_state = Some(expected_state);
        self.just_exited = false;
    }

    pub fn exit(&mut self) {
        self.active = false;
        self.expected_state = None;
        self.just_exited = true;
    }

    pub fn clear_exit_flag(&mut self) {
        self.just_exited = false;
    }

    pub fn expected_state(&self) -> Option<&PresenceState> {
        self.expected_state.as_ref()
    }

    pub fn refresh_expected_state(&mut self, expected_state: PresenceState) {
        if self.active {
            self.expected_state = Some(expected_state);
        }
    }
}

impl Default for CorrectionMode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_exit_cycle_sets_one_shot_flag() {
        let mut mode = CorrectionMode::new();
        assert!(!mode.is_active());
        mode.enter([0u8; 64]);
        assert!(mode.is_active());
        assert!(!mode.just_exited());
        mode.exit();
        assert!(!mode.is_active());
        assert!(mode.just_exited());
        mode.clear_exit_flag();
        assert!(!mode.just_exited());
    }

    #[test]
    fn entering_clears_exit_flag() {
        let mut mode = CorrectionMode::new();
        mode.enter([0u8; 64]);
        mode.exit();
        mode.enter([1u8; 64]);
        assert!(!mode.just_exited());
    }
}
