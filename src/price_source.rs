use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceSourceError {
    /// Transient fetch failure; the next poll may succeed.
    #[error("price unavailable: {0}")]
    Unavailable(String),

    /// The exchange refused the request (unknown symbol, banned key, ...).
    #[error("price request rejected (code {code}): {msg}")]
    Rejected { code: i64, msg: String },
}

impl PriceSourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PriceSourceError::Unavailable(_))
    }
}

/// Anything that can report the latest price of a symbol.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError>;
}
