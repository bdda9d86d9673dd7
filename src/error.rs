use thiserror::Error;

/// Failures of the market data layer. Indicator and screening code never
/// produces these; missing history there is an `Option::None`.
#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by exchange, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("unexpected response format: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScreenerError>;
