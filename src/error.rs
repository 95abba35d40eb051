use thiserror::Error;

/// Type alias for Result with HubSpotError
pub type Result<T> = std::result::Result<T, HubSpotError>;

/// Error types for the HubSpot archiver
#[derive(Error, Debug)]
pub enum HubSpotError {
    /// Identifier value is null, empty, or a NaN sentinel
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status from the API
    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Response body could not be decoded as the expected JSON shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Summarizer call failed or is unavailable
    #[error("Summarization failed: {0}")]
    SummarizationError(String),
}

impl HubSpotError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HubSpotError::NetworkError(_) | HubSpotError::RateLimitExceeded { .. }
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Parse the Retry-After header from a 429 response
///
/// Only the delay-seconds format (e.g., "5") is honored; the API signals
/// rate-limit backoff with an integer. Returns a default of 10 seconds if
/// the header is missing or not a valid integer.
pub(crate) fn parse_retry_after_header(headers: &reqwest::header::HeaderMap) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 10;

    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
