//! Game events emitted to the subscriber's event callback.

use shakmaty::Square;
use std::fmt;

/// A physical piece event reported by the square sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceEvent {
    Lift,
    Place,
}

impl PieceEvent {
    pub fn is_lift(&self) -> bool {
        matches!(self, PieceEvent::Lift)
    }
}

/// Why a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoves,
    ThreefoldRepetition,
    Resign,
    Draw,
    TimeForfeit,
    Abandoned,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Termination::Checkmate => "CHECKMATE",
            Termination::Stalemate => "STALEMATE",
            Termination::InsufficientMaterial => "INSUFFICIENT_MATERIAL",
            Termination::FiftyMoves => "FIFTY_MOVES",
            Termination::ThreefoldRepetition => "THREEFOLD_REPETITION",
            Termination::Resign => "RESIGN",
            Termination::Draw => "DRAW",
            Termination::TimeForfeit => "TIME_FORFEIT",
            Termination::Abandoned => "ABANDONED",
        };
        write!(f, "{}", name)
    }
}

/// Events delivered to the game event callback.
///
/// Piece events carry the square and the board timestamp in seconds so the
/// display layer can animate lifts and places.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    NewGame,
    WhiteTurn,
    BlackTurn,
    RequestDraw,
    ResignGame,
    PieceLifted { square: Square, seconds: f64 },
    PiecePlaced { square: Square, seconds: f64 },
    Termination(Termination),
}
