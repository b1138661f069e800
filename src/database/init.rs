use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;
use rusqlite::Connection;

/// Get the default path for the game database
pub fn get_db_path() -> PathBuf {
    // App's parameters
    let qualifier = "com";
    let organization = "board-core";
    let application = "board_core";

    // Get the platform-specific data directory
    if let Some(proj_dirs) = ProjectDirs::from(qualifier, organization, application) {
        let data_dir = proj_dirs.data_dir();

        // Create the directory if it doesn't exist
        std::fs::create_dir_all(data_dir).expect("Failed to create data directory");

        data_dir.join("games.sqlite")
    } else {
        panic!("Could not determine the data directory.");
    }
}

/// Initialize the database connection.
///
/// Must be called from the thread that will use the connection; the game
/// thread creates and tears down its own session.
pub fn init_db(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    create_tables(&conn)?;
    Ok(conn)
}

pub(crate) fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            event TEXT NOT NULL,
            site TEXT NOT NULL,
            round TEXT NOT NULL,
            white TEXT NOT NULL,
            black TEXT NOT NULL,
            result TEXT
        );",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS game_moves (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            gameid INTEGER NOT NULL,
            move TEXT NOT NULL,
            fen TEXT NOT NULL,
            white_clock INTEGER,
            black_clock INTEGER,
            eval_score INTEGER,
            FOREIGN KEY (gameid) REFERENCES games (id) ON DELETE CASCADE
        );",
        [],
    )?;

    Ok(())
}
