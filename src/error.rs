use thiserror::Error;

/// Failure fetching one resource from the activity API.
///
/// Callers generally recover by skipping the resource.
#[derive(Error, Debug)]
pub enum FetchError {
    #[cfg(feature = "http")]
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Max retries exceeded ({0})")]
    RetriesExhausted(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// The token was refused (401) or lacks the scope for the resource (403).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status(401 | 403))
    }
}

/// Failure authenticating the athlete. Terminal for the request.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authorization code")]
    MissingCode,

    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Token exchange rejected (HTTP {0})")]
    Rejected(u16),

    #[error("Token response carried no access token")]
    MissingToken,

    #[error("Token exchange failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Access token refused by the activity API (HTTP {0})")]
    TokenRefused(u16),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} not set")]
    MissingVar(&'static str),

    #[error("Invalid {key} value: {reason}")]
    InvalidVar { key: &'static str, reason: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
