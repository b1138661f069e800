//! The authoritative chess position with an undo stack.
//!
//! Rule enforcement (legal move generation, check and mate detection, UCI
//! and FEN handling) is delegated to `shakmaty`. This wrapper adds the move
//! stack needed for takebacks and late castling, draw claims over the stack
//! (fifty-move rule, threefold repetition) and the presence projection.

use shakmaty::fen::{Epd, Fen};
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Outcome, Piece, Position, Square};
use thiserror::Error;

use crate::events::Termination;
use crate::state::board_move::BoardMove;
use crate::state::presence::{presence_of, PresenceState};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("illegal move: {0}")]
    IllegalMove(String),
    #[error("invalid fen: {0}")]
    InvalidFen(String),
    #[error("no move to undo")]
    EmptyMoveStack,
}

struct StackEntry {
    previous: Chess,
    /// Repetition key of `previous` (EPD: placement, turn, castling, ep).
    previous_key: String,
    uci: String,
}

pub struct LogicalBoard {
    position: Chess,
    stack: Vec<StackEntry>,
}

fn repetition_key(position: &Chess) -> String {
    Epd::from_position(position.clone(), EnPassantMode::Legal).to_string()
}

/// FEN of an arbitrary position.
pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
}

impl LogicalBoard {
    pub fn new() -> Self {
        LogicalBoard {
            position: Chess::default(),
            stack: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| BoardError::InvalidFen(fen.to_string()))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| BoardError::InvalidFen(fen.to_string()))?;
        Ok(LogicalBoard {
            position,
            stack: Vec::new(),
        })
    }

    pub fn reset(&mut self) {
        self.position = Chess::default();
        self.stack.clear();
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    pub fn color_at(&self, square: Square) -> Option<Color> {
        self.piece_at(square).map(|piece| piece.color)
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.position.board().king_of(color)
    }

    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    pub fn presence(&self) -> PresenceState {
        presence_of(&self.position)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn last_move_uci(&self) -> Option<&str> {
        self.stack.last().map(|entry| entry.uci.as_str())
    }

    /// UCI strings of the newest `n` moves, newest first.
    pub fn recent_moves(&self, n: usize) -> Vec<String> {
        self.stack
            .iter()
            .rev()
            .take(n)
            .map(|entry| entry.uci.clone())
            .collect()
    }

    /// Resolve a `(from, to, promotion)` move against the legal moves of the
    /// current position. Castling submitted as a king move (e1g1) resolves to
    /// the library's castling move; promotion must match exactly.
    pub fn find_legal(&self, mv: &BoardMove) -> Option<Move> {
        let wanted = mv.uci();
        self.position
            .legal_moves()
            .iter()
            .find(|candidate| candidate.to_uci(CastlingMode::Standard).to_string() == wanted)
            .cloned()
    }

    pub fn is_legal(&self, mv: &BoardMove) -> bool {
        self.find_legal(mv).is_some()
    }

    pub fn is_capture(&self, mv: &BoardMove) -> bool {
        self.find_legal(mv)
            .map(|legal| legal.is_capture())
            .unwrap_or(false)
    }

    /// Destination squares reachable from `from`, as the user would place the
    /// piece (castling reported as the king's target square).
    pub fn legal_destinations(&self, from: Square) -> Vec<Square> {
        let mut destinations = Vec::new();
        for mv in self.position.legal_moves().iter() {
            if mv.from() != Some(from) {
                continue;
            }
            let uci = mv.to_uci(CastlingMode::Standard).to_string();
            if let Ok(parsed) = BoardMove::parse(&uci) {
                if !destinations.contains(&parsed.to) {
                    destinations.push(parsed.to);
                }
            }
        }
        destinations
    }

    pub fn has_legal_move_from(&self, from: Square) -> bool {
        self.position
            .legal_moves()
            .iter()
            .any(|mv| mv.from() == Some(from))
    }

    /// True when some legal move of the side to move captures on `square`.
    /// Lifting such a piece is a normal part of executing the capture.
    pub fn is_capture_target(&self, square: Square) -> bool {
        self.position.legal_moves().iter().any(|mv| {
            if !mv.is_capture() {
                return false;
            }
            let uci = mv.to_uci(CastlingMode::Standard).to_string();
            BoardMove::parse(&uci)
                .map(|parsed| parsed.to == square)
                .unwrap_or(false)
        })
    }

    pub fn push(&mut self, mv: &BoardMove) -> Result<String, BoardError> {
        let legal = self
            .find_legal(mv)
            .ok_or_else(|| BoardError::IllegalMove(mv.uci()))?;
        let uci = legal.to_uci(CastlingMode::Standard).to_string();
        let previous = self.position.clone();
        let previous_key = repetition_key(&previous);
        self.position.play_unchecked(&legal);
        self.stack.push(StackEntry {
            previous,
            previous_key,
            uci: uci.clone(),
        });
        Ok(uci)
    }

    pub fn push_uci(&mut self, uci: &str) -> Result<String, BoardError> {
        let mv = BoardMove::parse(uci).map_err(|_| BoardError::IllegalMove(uci.to_string()))?;
        self.push(&mv)
    }

    pub fn pop(&mut self) -> Result<String, BoardError> {
        let entry = self.stack.pop().ok_or(BoardError::EmptyMoveStack)?;
        self.position = entry.previous;
        Ok(entry.uci)
    }

    /// Presence state one ply back, without mutating the board.
    pub fn previous_presence(&self) -> Option<PresenceState> {
        self.stack.last().map(|entry| presence_of(&entry.previous))
    }

    /// Presence state after applying `mv` to the current position, if legal.
    pub fn presence_after(&self, mv: &BoardMove) -> Option<PresenceState> {
        let legal = self.find_legal(mv)?;
        let mut next = self.position.clone();
        next.play_unchecked(&legal);
        Some(presence_of(&next))
    }

    fn repetition_count(&self) -> usize {
        let current = repetition_key(&self.position);
        1 + self
            .stack
            .iter()
            .filter(|entry| entry.previous_key == current)
            .count()
    }

    /// Game outcome with draw claims (fifty-move rule, threefold repetition).
    pub fn outcome(&self) -> Option<(String, Termination)> {
        if let Some(outcome) = self.position.outcome() {
            let termination = if self.position.is_checkmate() {
                Termination::Checkmate
            } else if self.position.is_stalemate() {
                Termination::Stalemate
            } else {
                Termination::InsufficientMaterial
            };
            let result = match outcome {
                Outcome::Decisive { winner } => match winner {
                    Color::White => "1-0",
                    Color::Black => "0-1",
                },
                Outcome::Draw => "1/2-1/2",
            };
            return Some((result.to_string(), termination));
        }
        if self.position.halfmoves() >= 100 {
            return Some(("1/2-1/2".to_string(), Termination::FiftyMoves));
        }
        if self.repetition_count() >= 3 {
            return Some(("1/2-1/2".to_string(), Termination::ThreefoldRepetition));
        }
        None
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }

    /// Resolve a UCI string against this position (legality not required).
    pub fn parse_uci(&self, uci: &str) -> Result<BoardMove, BoardError> {
        // Validate with the chess library first so castling notation and
        // promotion characters are normalized the same way everywhere.
        if let Ok(parsed) = uci.parse::<Uci>() {
            if let Ok(legal) = parsed.to_move(&self.position) {
                let normalized = legal.to_uci(CastlingMode::Standard).to_string();
                return BoardMove::parse(&normalized)
                    .map_err(|_| BoardError::IllegalMove(uci.to_string()));
            }
        }
        BoardMove::parse(uci).map_err(|_| BoardError::IllegalMove(uci.to_string()))
    }
}

impl Default for LogicalBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_restores_fen() {
        let mut board = LogicalBoard::new();
        let before = board.fen();
        board.push(&BoardMove::parse("e2e4").unwrap()).unwrap();
        assert_ne!(board.fen(), before);
        board.pop().unwrap();
        assert_eq!(board.fen(), before);
    }

    #[test]
    fn castling_resolves_from_king_move() {
        let mut board = LogicalBoard::new();
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"] {
            board.push_uci(uci).unwrap();
        }
        let castle = BoardMove::parse("e1g1").unwrap();
        assert!(board.is_legal(&castle));
        let pushed = board.push(&castle).unwrap();
        assert_eq!(pushed, "e1g1");
        // Rook landed on f1, king on g1.
        assert_eq!(
            board.piece_at(Square::G1).map(|p| p.role),
            Some(shakmaty::Role::King)
        );
        assert_eq!(
            board.piece_at(Square::F1).map(|p| p.role),
            Some(shakmaty::Role::Rook)
        );
    }

    #[test]
    fn capture_detection() {
        let mut board = LogicalBoard::new();
        for uci in ["e2e4", "d7d5"] {
            board.push_uci(uci).unwrap();
        }
        assert!(board.is_capture(&BoardMove::parse("e4d5").unwrap()));
        assert!(!board.is_capture(&BoardMove::parse("e4e5").unwrap()));
    }

    #[test]
    fn scholars_mate_outcome() {
        let mut board = LogicalBoard::new();
        for uci in ["e2e4", "e7e5", "d1h5", "b8c6", "f1c4", "g8f6", "h5f7"] {
            board.push_uci(uci).unwrap();
        }
        let (result, termination) = board.outcome().expect("mate");
        assert_eq!(result, "1-0");
        assert_eq!(termination, Termination::Checkmate);
    }

    #[test]
    fn threefold_repetition_is_claimed() {
        let mut board = LogicalBoard::new();
        for uci in [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ] {
            board.push_uci(uci).unwrap();
        }
        let (result, termination) = board.outcome().expect("repetition");
        assert_eq!(result, "1/2-1/2");
        assert_eq!(termination, Termination::ThreefoldRepetition);
    }

    #[test]
    fn legal_destinations_include_castling_target() {
        let mut board = LogicalBoard::new();
        for uci in ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"] {
            board.push_uci(uci).unwrap();
        }
        let destinations = board.legal_destinations(Square::E1);
        assert!(destinations.contains(&Square::G1));
        assert!(destinations.contains(&Square::E2));
    }

    #[test]
    fn illegal_move_is_rejected() {
        let mut board = LogicalBoard::new();
        let err = board.push(&BoardMove::parse("e2e5").unwrap());
        assert!(err.is_err());
        assert_eq!(board.stack_len(), 0);
    }
}
