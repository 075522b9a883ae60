use std::fmt;

use crate::model::order::OrderSide;

/// Direction of the price move that completed a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Entry side follows the move; the close uses the opposite side.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Up => OrderSide::Buy,
            Direction::Down => OrderSide::Sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEvent {
    pub symbol: String,
    /// Accumulated value at the instant of crossing.
    pub amount: f64,
    pub trade_count: u64,
    pub price: f64,
    pub direction: Direction,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealizationStatus {
    Filled,
    DryRun,
    Failed,
    Skipped,
}

impl RealizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealizationStatus::Filled => "FILLED",
            RealizationStatus::DryRun => "DRY_RUN",
            RealizationStatus::Failed => "FAILED",
            RealizationStatus::Skipped => "SKIPPED",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "FILLED" => RealizationStatus::Filled,
            "DRY_RUN" => RealizationStatus::DryRun,
            "SKIPPED" => RealizationStatus::Skipped,
            _ => RealizationStatus::Failed,
        }
    }

    /// Whether the net amount was credited to capital.
    pub fn is_realized(&self) -> bool {
        matches!(self, RealizationStatus::Filled | RealizationStatus::DryRun)
    }
}

impl fmt::Display for RealizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release after the executor has acted on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedRelease {
    pub event: ReleaseEvent,
    pub quantity: f64,
    pub fee: f64,
    pub net: f64,
    /// Capital after this release was applied.
    pub capital: f64,
    pub status: RealizationStatus,
}
