//! Blocking Lichess board-API client.
//!
//! The stream endpoint delivers one JSON document per line and stays open
//! for the lifetime of the game, so the client is built without a request
//! timeout and the stream is consumed from a dedicated thread.

use std::io::{BufRead, BufReader, Read};

use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};

use super::api_error::ApiError;
use super::models::{AccountInfo, GameStreamEvent, OngoingGame, OngoingGames};

const BASE_URL: &str = "https://lichess.org";

pub struct LichessClient {
    client: Client,
    token: String,
    base_url: String,
}

impl LichessClient {
    pub fn new(token: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(None)
            .build()
            .map_err(|err| ApiError::HttpError(err.to_string()))?;
        Ok(LichessClient {
            client,
            token: token.to_string(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at a different server (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(ApiError::Auth(body));
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn get(&self, path: &str) -> Result<Response, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| ApiError::HttpError(err.to_string()))?;
        self.check(response)
    }

    fn post(&self, path: &str, form: &[(&str, String)]) -> Result<Response, ApiError> {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json");
        let request = if form.is_empty() {
            request
        } else {
            request.form(&form.to_vec())
        };
        let response = request
            .send()
            .map_err(|err| ApiError::HttpError(err.to_string()))?;
        self.check(response)
    }

    fn json<T: serde::de::DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        let content = response.text().map_err(|_| ApiError::OpenContentError)?;
        serde_json::from_str(&content).map_err(|err| ApiError::JsonError(err.to_string()))
    }

    /// Fetch the authenticated account; also serves as the token check.
    pub fn account(&self) -> Result<AccountInfo, ApiError> {
        let response = self.get("/api/account")?;
        self.json(response)
    }

    /// Create a seek. The request blocks while the seek is active and
    /// returns once an opponent has been found (or the seek is dropped).
    pub fn seek(
        &self,
        minutes: u32,
        increment: u32,
        rated: bool,
        color: Option<&str>,
        rating_range: &str,
    ) -> Result<(), ApiError> {
        let mut form: Vec<(&str, String)> = vec![
            ("time", minutes.to_string()),
            ("increment", increment.to_string()),
            ("rated", rated.to_string()),
        ];
        if let Some(color) = color {
            form.push(("color", color.to_string()));
        }
        if !rating_range.is_empty() {
            form.push(("ratingRange", rating_range.to_string()));
        }
        let mut response = self.post("/api/board/seek", &form)?;
        // Drain the long poll; the server holds the connection while seeking.
        let mut sink = Vec::new();
        let _ = response.read_to_end(&mut sink);
        Ok(())
    }

    pub fn ongoing(&self, nb: u32) -> Result<Vec<OngoingGame>, ApiError> {
        let response = self.get(&format!("/api/account/playing?nb={}", nb))?;
        let games: OngoingGames = self.json(response)?;
        Ok(games.now_playing)
    }

    /// Open the ND-JSON game state stream.
    pub fn stream_game(&self, game_id: &str) -> Result<GameStream, ApiError> {
        let path = format!("/api/board/game/stream/{}", urlencoding::encode(game_id));
        let response = self.get(&path)?;
        Ok(GameStream {
            lines: BufReader::new(response),
        })
    }

    pub fn make_move(&self, game_id: &str, uci: &str) -> Result<(), ApiError> {
        let path = format!(
            "/api/board/game/{}/move/{}",
            urlencoding::encode(game_id),
            urlencoding::encode(uci)
        );
        self.post(&path, &[]).map(|_| ())
    }

    pub fn resign(&self, game_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/board/game/{}/resign", urlencoding::encode(game_id));
        self.post(&path, &[]).map(|_| ())
    }

    pub fn offer_draw(&self, game_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/board/game/{}/draw/yes", urlencoding::encode(game_id));
        self.post(&path, &[]).map(|_| ())
    }

    pub fn abort(&self, game_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/board/game/{}/abort", urlencoding::encode(game_id));
        self.post(&path, &[]).map(|_| ())
    }

    pub fn accept_challenge(&self, challenge_id: &str) -> Result<(), ApiError> {
        let path = format!(
            "/api/challenge/{}/accept",
            urlencoding::encode(challenge_id)
        );
        self.post(&path, &[]).map(|_| ())
    }
}

/// Iterator over streamed game events. Keepalive newlines are skipped.
pub struct GameStream {
    lines: BufReader<Response>,
}

impl Iterator for GameStream {
    type Item = Result<GameStreamEvent, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut line = String::new();
            match self.lines.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        debug!("[LichessClient.stream] keepalive");
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<GameStreamEvent>(trimmed)
                            .map_err(|err| ApiError::JsonError(err.to_string())),
                    );
                }
                Err(err) => return Some(Err(ApiError::HttpError(err.to_string()))),
            }
        }
    }
}
