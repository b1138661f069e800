//! Minimal UCI client over a child process.
//!
//! Covers the slice of the protocol the players need: handshake, option
//! configuration, `position fen` + `go movetime`, and `bestmove` parsing.
//! `go searchmoves` restricts the search for the hand-brain assistant.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static BESTMOVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bestmove\s+(\S+)").expect("bestmove regex"));

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch engine: {0}")]
    Launch(std::io::Error),
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("engine terminated unexpectedly")]
    Terminated,
    #[error("engine returned no best move")]
    NoBestMove,
}

pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    name: String,
}

impl UciEngine {
    /// Spawn the engine process and perform the `uci`/`uciok` handshake.
    pub fn launch(path: &Path) -> Result<Self, EngineError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "engine".to_string());
        info!("[UciEngine.launch] Starting engine: {}", path.display());

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(EngineError::Launch)?;

        let stdin = child.stdin.take().ok_or(EngineError::Terminated)?;
        let stdout = child.stdout.take().ok_or(EngineError::Terminated)?;

        let mut engine = UciEngine {
            child,
            stdin,
            reader: BufReader::new(stdout),
            name,
        };
        engine.send("uci")?;
        engine.wait_for("uciok")?;
        Ok(engine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, command: &str) -> Result<(), EngineError> {
        debug!("[UciEngine.send] {} <- {}", self.name, command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, EngineError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Err(EngineError::Terminated);
        }
        Ok(line.trim_end().to_string())
    }

    fn wait_for(&mut self, token: &str) -> Result<(), EngineError> {
        loop {
            let line = self.read_line()?;
            if line == token {
                return Ok(());
            }
        }
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(&format!("setoption name {} value {}", name, value))
    }

    /// Apply a full option map. Engines may reset between games, so this is
    /// re-run before every move request.
    pub fn configure(&mut self, options: &BTreeMap<String, String>) -> Result<(), EngineError> {
        for (name, value) in options {
            self.set_option(name, value)?;
        }
        if !options.is_empty() {
            self.send("isready")?;
            self.wait_for("readyok")?;
        }
        Ok(())
    }

    pub fn new_game(&mut self) -> Result<(), EngineError> {
        self.send("ucinewgame")?;
        self.send("isready")?;
        self.wait_for("readyok")
    }

    /// Ask for the best move from a position, with a fixed time limit.
    ///
    /// # Arguments
    /// * `fen` - position to search from
    /// * `movetime` - search time limit
    /// * `searchmoves` - optional restriction of the root moves
    ///
    /// # Returns
    /// The `bestmove` UCI string.
    pub fn best_move(
        &mut self,
        fen: &str,
        movetime: Duration,
        searchmoves: Option<&[String]>,
    ) -> Result<String, EngineError> {
        self.send(&format!("position fen {}", fen))?;
        let mut go = format!("go movetime {}", movetime.as_millis());
        if let Some(moves) = searchmoves {
            if !moves.is_empty() {
                go.push_str(" searchmoves ");
                go.push_str(&moves.join(" "));
            }
        }
        self.send(&go)?;

        loop {
            let line = self.read_line()?;
            if let Some(caps) = BESTMOVE_RE.captures(&line) {
                let mv = caps[1].to_string();
                if mv == "(none)" || mv == "0000" {
                    return Err(EngineError::NoBestMove);
                }
                debug!("[UciEngine.best_move] {} -> {}", self.name, mv);
                return Ok(mv);
            }
        }
    }

    /// Ask the engine to quit, then reap the process.
    pub fn quit(&mut self) {
        if let Err(e) = self.send("quit") {
            debug!("[UciEngine.quit] Error sending quit: {}", e);
        }
        match self.child.wait() {
            Ok(status) => info!("[UciEngine.quit] {} exited: {}", self.name, status),
            Err(e) => {
                warn!("[UciEngine.quit] Wait failed for {}: {}, killing", self.name, e);
                let _ = self.child.kill();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bestmove_regex_extracts_move() {
        let caps = BESTMOVE_RE.captures("bestmove g1f3 ponder d7d5").unwrap();
        assert_eq!(&caps[1], "g1f3");
        assert!(BESTMOVE_RE.captures("info depth 12 score cp 30").is_none());
    }
}
