use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    HttpError(String), // Error from reqwest
    #[error("could not read response content")]
    OpenContentError, // Error from reqwest
    #[error("json error: {0}")]
    JsonError(String), // Error from serde_json
    #[error("api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
}
