#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub symbol: String,
    pub price: f64,
    /// Wall-clock milliseconds when the reading arrived.
    pub timestamp_ms: u64,
}

impl PriceObservation {
    pub fn new(symbol: impl Into<String>, price: f64, timestamp_ms: u64) -> Self {
        Self {
            symbol: symbol.into().trim().to_ascii_uppercase(),
            price,
            timestamp_ms,
        }
    }

    /// Stamp a reading with the current wall clock.
    pub fn now(symbol: impl Into<String>, price: f64) -> Self {
        let ts = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::new(symbol, price, ts)
    }
}
