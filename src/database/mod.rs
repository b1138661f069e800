pub mod init;
pub mod models;
pub mod store;

pub use init::{get_db_path, init_db};
pub use models::{GameMoveRecord, GameRecord};
pub use store::{GameStore, STARTING_FEN};
