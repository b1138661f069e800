pub mod board_move;
pub mod chess_game;
pub mod logical_board;
pub mod presence;

pub use board_move::{BoardMove, MoveParseError};
pub use chess_game::{ChessGameState, StateChange, StateObserver};
pub use logical_board::{fen_of, BoardError, LogicalBoard};
pub use presence::{
    is_starting_position, manhattan_distance, presence_of, states_match, PresenceState, BOARD_SIZE,
    BOARD_WIDTH, STARTING_PRESENCE,
};
