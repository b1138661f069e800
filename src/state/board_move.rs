//! Source/target move representation used at the physical-board boundary.
//!
//! Players and remote protocols describe moves as `(from, to, promotion)`,
//! the UCI wire shape. Conversion to a fully qualified chess-library move
//! happens when the move is validated against the logical board.

use shakmaty::{Role, Square};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("uci move too short: {0:?}")]
    TooShort(String),
    #[error("invalid square in uci move: {0:?}")]
    InvalidSquare(String),
    #[error("invalid promotion piece in uci move: {0:?}")]
    InvalidPromotion(String),
}

/// A move as seen by the board: source, destination, optional promotion.
///
/// `from == to` is a valid *destination-only* submission, produced when a
/// LIFT event was missed; the game manager reconstructs the source square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl BoardMove {
    pub fn new(from: Square, to: Square) -> Self {
        BoardMove {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(from: Square, to: Square, promotion: Role) -> Self {
        BoardMove {
            from,
            to,
            promotion: Some(promotion),
        }
    }

    /// Parse a 4 or 5 character UCI move string.
    pub fn parse(uci: &str) -> Result<Self, MoveParseError> {
        if uci.len() < 4 {
            return Err(MoveParseError::TooShort(uci.to_string()));
        }
        let from = uci
            .get(0..2)
            .and_then(|s| s.parse::<Square>().ok())
            .ok_or_else(|| MoveParseError::InvalidSquare(uci.to_string()))?;
        let to = uci
            .get(2..4)
            .and_then(|s| s.parse::<Square>().ok())
            .ok_or_else(|| MoveParseError::InvalidSquare(uci.to_string()))?;
        let promotion = match uci.len() {
            4 => None,
            _ => {
                let c = uci.as_bytes()[4] as char;
                Some(
                    Role::from_char(c.to_ascii_lowercase())
                        .ok_or_else(|| MoveParseError::InvalidPromotion(uci.to_string()))?,
                )
            }
        };
        Ok(BoardMove {
            from,
            to,
            promotion,
        })
    }

    pub fn uci(&self) -> String {
        match self.promotion {
            Some(role) => format!("{}{}{}", self.from, self.to, role.char()),
            None => format!("{}{}", self.from, self.to),
        }
    }

    /// True for a destination-only submission (missed LIFT).
    pub fn is_destination_only(&self) -> bool {
        self.from == self.to
    }

    /// Same squares regardless of promotion piece.
    pub fn same_squares(&self, other: &BoardMove) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl fmt::Display for BoardMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uci())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip() {
        let mv = BoardMove::parse("e2e4").unwrap();
        assert_eq!(mv.from, Square::E2);
        assert_eq!(mv.to, Square::E4);
        assert_eq!(mv.uci(), "e2e4");

        let promo = BoardMove::parse("a7a8q").unwrap();
        assert_eq!(promo.promotion, Some(Role::Queen));
        assert_eq!(promo.uci(), "a7a8q");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            BoardMove::parse("e2"),
            Err(MoveParseError::TooShort(_))
        ));
        assert!(matches!(
            BoardMove::parse("z9e4"),
            Err(MoveParseError::InvalidSquare(_))
        ));
        assert!(matches!(
            BoardMove::parse("a7a8x"),
            Err(MoveParseError::InvalidPromotion(_))
        ));
    }

    #[test]
    fn destination_only_detection() {
        assert!(BoardMove::parse("f3f3").unwrap().is_destination_only());
        assert!(!BoardMove::parse("g1f3").unwrap().is_destination_only());
    }
}
