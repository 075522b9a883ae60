//! Accumulate-then-release trigger.
//!
//! An [`AccumulatorTrigger`] folds a stream of prices into a running magnitude
//! and emits a single [`ReleaseDecision::Release`] each time that magnitude
//! reaches the configured threshold, resetting to zero afterwards.

pub mod book;
pub mod contribution;

use thiserror::Error;

use crate::model::release::{Direction, ReleaseEvent};
use crate::sink::ReleaseSink;

pub use book::AccumulatorBook;
pub use contribution::Contribution;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccumulatorError {
    #[error("invalid accumulator config: {0}")]
    InvalidConfig(String),

    #[error("invalid price input: {0}")]
    InvalidInput(f64),
}

#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    pub threshold: f64,
    /// Deltas strictly below this are treated as no movement.
    pub min_delta: f64,
    pub contribution: Contribution,
}

impl AccumulatorConfig {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            min_delta: 0.0,
            contribution: Contribution::Identity,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    pub fn with_contribution(mut self, contribution: Contribution) -> Self {
        self.contribution = contribution;
        self
    }

    pub fn validate(&self) -> Result<(), AccumulatorError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(AccumulatorError::InvalidConfig(format!(
                "threshold must be a positive finite number, got {}",
                self.threshold
            )));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(AccumulatorError::InvalidConfig(format!(
                "min_delta must be a non-negative finite number, got {}",
                self.min_delta
            )));
        }
        self.contribution.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccumulatorState {
    accumulated: f64,
    previous_price: Option<f64>,
    trade_count: u64,
}

impl AccumulatorState {
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    pub fn previous_price(&self) -> Option<f64> {
        self.previous_price
    }

    /// Non-zero deltas accumulated since the last release.
    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReleaseDecision {
    NoRelease,
    Release { amount: f64, trade_count: u64 },
}

impl ReleaseDecision {
    pub fn is_release(&self) -> bool {
        matches!(self, ReleaseDecision::Release { .. })
    }
}

/// Observable lifecycle phase. Releasing is transient inside a single
/// `observe` call, so after every call the trigger is in one of these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Uninitialized,
    Accumulating,
}

pub(crate) fn validate_price(price: f64) -> Result<(), AccumulatorError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(AccumulatorError::InvalidInput(price))
    }
}

#[derive(Debug, Clone)]
pub struct AccumulatorTrigger {
    config: AccumulatorConfig,
    state: AccumulatorState,
}

impl AccumulatorTrigger {
    pub fn new(config: AccumulatorConfig) -> Result<Self, AccumulatorError> {
        config.validate()?;
        Ok(Self {
            config,
            state: AccumulatorState::default(),
        })
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn phase(&self) -> TriggerPhase {
        if self.state.previous_price.is_none() {
            TriggerPhase::Uninitialized
        } else {
            TriggerPhase::Accumulating
        }
    }

    /// Feed one price reading. Invalid prices leave the state untouched.
    pub fn observe(&mut self, price: f64) -> Result<ReleaseDecision, AccumulatorError> {
        validate_price(price)?;

        let Some(previous) = self.state.previous_price.replace(price) else {
            return Ok(ReleaseDecision::NoRelease);
        };

        let delta = (price - previous).abs();
        if delta == 0.0 || delta < self.config.min_delta {
            return Ok(ReleaseDecision::NoRelease);
        }

        self.state.accumulated += self.config.contribution.apply(delta);
        self.state.trade_count += 1;

        if self.state.accumulated >= self.config.threshold {
            let amount = self.state.accumulated;
            let trade_count = self.state.trade_count;
            self.state.accumulated = 0.0;
            self.state.trade_count = 0;
            return Ok(ReleaseDecision::Release {
                amount,
                trade_count,
            });
        }

        Ok(ReleaseDecision::NoRelease)
    }

    /// Observe `price` and, on release, hand the event to `sink` before
    /// returning. The sink runs on the caller's stack.
    pub fn observe_into<S>(
        &mut self,
        symbol: &str,
        price: f64,
        timestamp_ms: u64,
        sink: &mut S,
    ) -> Result<ReleaseDecision, AccumulatorError>
    where
        S: ReleaseSink + ?Sized,
    {
        let prior = self.state.previous_price;
        let decision = self.observe(price)?;
        if let ReleaseDecision::Release {
            amount,
            trade_count,
        } = decision
        {
            let direction = match prior {
                Some(p) if price < p => Direction::Down,
                _ => Direction::Up,
            };
            sink.on_release(&ReleaseEvent {
                symbol: symbol.to_string(),
                amount,
                trade_count,
                price,
                direction,
                timestamp_ms,
            });
        }
        Ok(decision)
    }
}
