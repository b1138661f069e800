//! LED feedback interface consumed by the game core.
//!
//! The board driver owns speed and intensity settings; the core only names
//! the pattern it wants. `repeat == 0` means "continuous until cancelled".

use shakmaty::Square;

pub trait LedCallbacks: Send + Sync {
    /// Turn all LEDs off.
    fn off(&self);

    /// Fast blink on a single square.
    fn single_fast(&self, square: Square, repeat: u32);

    /// Steady from/to indication for a move the user should execute.
    fn from_to(&self, from: Square, to: Square, repeat: u32);

    /// Fast from/to blink used by correction guidance.
    fn from_to_fast(&self, from: Square, to: Square, repeat: u32);

    /// Hint-styled from/to indication (dimmer than a forced move).
    fn from_to_hint(&self, from: Square, to: Square, repeat: u32);

    /// Fast blink on an arbitrary set of squares ("remove these").
    fn array_fast(&self, squares: &[Square], repeat: u32);
}
