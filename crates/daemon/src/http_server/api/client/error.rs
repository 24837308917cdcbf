use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("daemon answered {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("invalid daemon URL {0}")]
    InvalidUrl(String),
}
