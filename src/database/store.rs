//! Game persistence operations.
//!
//! The store is owned by the game thread (the connection is created and
//! closed there), so no internal locking is needed. A game row is created
//! only when the first move is persisted; until then the game id is -1.

use std::path::Path;

use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use super::init::{create_tables, get_db_path, init_db};
use super::models::{GameMoveRecord, GameRecord};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub struct GameStore {
    conn: Connection,
}

impl GameStore {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = init_db(db_path)?;
        Ok(GameStore { conn })
    }

    pub fn open_default() -> Result<Self, rusqlite::Error> {
        Self::open(&get_db_path())
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(GameStore { conn })
    }

    pub fn insert_game(&self, game: &GameRecord) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO games (source, event, site, round, white, black, result)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                game.source,
                game.event,
                game.site,
                game.round,
                game.white,
                game.black,
                game.result,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_move(&self, record: &GameMoveRecord) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO game_moves (gameid, move, fen, white_clock, black_clock, eval_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.gameid,
                record.mv,
                record.fen,
                record.white_clock,
                record.black_clock,
                record.eval_score,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update the game result; returns false when the row does not exist.
    pub fn update_result(&self, game_id: i64, result: &str) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE games SET result = ?1 WHERE id = ?2",
            params![result, game_id],
        )?;
        Ok(changed > 0)
    }

    pub fn game_result(&self, game_id: i64) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT result FROM games WHERE id = ?1",
                params![game_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(|row| row.flatten())
    }

    /// Id of the most recently created game.
    pub fn latest_game_id(&self) -> Result<Option<i64>, rusqlite::Error> {
        self.conn
            .query_row("SELECT id FROM games ORDER BY id DESC LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Result column of the most recently created game.
    pub fn last_game_result(&self) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT result FROM games ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(|row| row.flatten())
    }

    /// Delete the most recent move of a game (takeback). Returns the deleted
    /// move text if a row was removed.
    pub fn delete_last_move(&self, game_id: i64) -> Result<Option<String>, rusqlite::Error> {
        let last: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, move FROM game_moves WHERE gameid = ?1 ORDER BY id DESC LIMIT 1",
                params![game_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match last {
            Some((row_id, mv)) => {
                self.conn
                    .execute("DELETE FROM game_moves WHERE id = ?1", params![row_id])?;
                Ok(Some(mv))
            }
            None => Ok(None),
        }
    }

    pub fn move_count(&self, game_id: i64) -> Result<i64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM game_moves WHERE gameid = ?1",
            params![game_id],
            |row| row.get(0),
        )
    }

    pub fn moves_for_game(&self, game_id: i64) -> Result<Vec<GameMoveRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, gameid, move, fen, white_clock, black_clock, eval_score
             FROM game_moves WHERE gameid = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![game_id], |row| {
            Ok(GameMoveRecord {
                id: row.get(0)?,
                gameid: row.get(1)?,
                mv: row.get(2)?,
                fen: row.get(3)?,
                white_clock: row.get(4)?,
                black_clock: row.get(5)?,
                eval_score: row.get(6)?,
            })
        })?;
        rows.collect()
    }

    /// Persist a move, creating the game row (plus the initial-position
    /// record) when this is the first move of the game.
    ///
    /// # Returns
    /// The game id the move was attached to.
    #[allow(clippy::too_many_arguments)]
    pub fn persist_move(
        &self,
        is_first_move: bool,
        current_game_id: i64,
        game: &GameRecord,
        fen_before_move: &str,
        move_uci: &str,
        fen_after_move: &str,
        white_clock: Option<i64>,
        black_clock: Option<i64>,
        eval_score: Option<i64>,
    ) -> Result<i64, rusqlite::Error> {
        let game_id = if is_first_move || current_game_id < 0 {
            let id = self.insert_game(game)?;
            info!("[GameStore.persist_move] Created game row id={}", id);
            // Initial position record carries no clocks or score.
            self.insert_move(&GameMoveRecord {
                id: None,
                gameid: id,
                mv: String::new(),
                fen: fen_before_move.to_string(),
                white_clock: None,
                black_clock: None,
                eval_score: None,
            })?;
            id
        } else {
            current_game_id
        };

        self.insert_move(&GameMoveRecord {
            id: None,
            gameid: game_id,
            mv: move_uci.to_string(),
            fen: fen_after_move.to_string(),
            white_clock,
            black_clock,
            eval_score,
        })?;
        Ok(game_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GameStore {
        GameStore::open_in_memory().unwrap()
    }

    fn game_record() -> GameRecord {
        GameRecord {
            id: None,
            source: "test".to_string(),
            event: String::new(),
            site: String::new(),
            round: String::new(),
            white: "Human".to_string(),
            black: "Engine".to_string(),
            result: None,
        }
    }

    #[test]
    fn first_move_creates_game_and_initial_record() {
        let store = store();
        let game_id = store
            .persist_move(
                true,
                -1,
                &game_record(),
                STARTING_FEN,
                "e2e4",
                "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
                Some(600),
                Some(600),
                Some(30),
            )
            .unwrap();
        assert!(game_id > 0);
        let moves = store.moves_for_game(game_id).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].mv, "");
        assert_eq!(moves[0].fen, STARTING_FEN);
        assert_eq!(moves[1].mv, "e2e4");
        assert_eq!(moves[1].white_clock, Some(600));
    }

    #[test]
    fn later_moves_attach_to_existing_game() {
        let store = store();
        let game_id = store
            .persist_move(true, -1, &game_record(), STARTING_FEN, "e2e4", "fen1", None, None, None)
            .unwrap();
        let same_id = store
            .persist_move(false, game_id, &game_record(), "fen1", "e7e5", "fen2", None, None, None)
            .unwrap();
        assert_eq!(game_id, same_id);
        assert_eq!(store.move_count(game_id).unwrap(), 3);
    }

    #[test]
    fn delete_last_move_removes_only_latest() {
        let store = store();
        let game_id = store
            .persist_move(true, -1, &game_record(), STARTING_FEN, "e2e4", "fen1", None, None, None)
            .unwrap();
        let deleted = store.delete_last_move(game_id).unwrap();
        assert_eq!(deleted.as_deref(), Some("e2e4"));
        let moves = store.moves_for_game(game_id).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].mv, "");
    }

    #[test]
    fn update_result_reports_missing_rows() {
        let store = store();
        assert!(!store.update_result(99, "1-0").unwrap());
        let game_id = store.insert_game(&game_record()).unwrap();
        assert!(store.update_result(game_id, "0-1").unwrap());
        assert_eq!(store.game_result(game_id).unwrap().as_deref(), Some("0-1"));
        assert_eq!(store.last_game_result().unwrap().as_deref(), Some("0-1"));
    }
}
