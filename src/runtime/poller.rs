use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::accumulator::{AccumulatorTrigger, ReleaseDecision};
use crate::model::observation::PriceObservation;
use crate::price_source::{PriceSource, PriceSourceError};
use crate::release_stats::ReleaseStats;
use crate::sink::ReleaseSink;

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Stop after this many consecutive fetch failures. `0` polls forever.
    pub max_consecutive_failures: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Shutdown,
    FailureLimit,
}

/// What a poller hands back when it stops: its trigger (with whatever is
/// still pending) and why it stopped.
#[derive(Debug)]
pub struct PollerReport {
    pub symbol: String,
    pub trigger: AccumulatorTrigger,
    pub exit: PollerExit,
    pub observations: u64,
    pub fetch_failures: u64,
}

/// Poll one symbol and feed its trigger until shutdown.
///
/// Each poller owns its trigger outright; the sink is the only thing
/// that leaves the task.
pub async fn run_symbol_poller<S>(
    source: Arc<dyn PriceSource>,
    symbol: String,
    mut trigger: AccumulatorTrigger,
    mut sink: S,
    settings: PollerSettings,
    stats: Arc<ReleaseStats>,
    mut shutdown: watch::Receiver<bool>,
) -> PollerReport
where
    S: ReleaseSink + Send,
{
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures: u32 = 0;
    let mut observations: u64 = 0;
    let mut fetch_failures: u64 = 0;

    tracing::info!(symbol = %symbol, interval_ms = settings.interval.as_millis() as u64, "Poller started");

    let exit = loop {
        if *shutdown.borrow() {
            break PollerExit::Shutdown;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break PollerExit::Shutdown;
                }
                continue;
            }
        }

        let price = match source.current_price(&symbol).await {
            Ok(price) => {
                consecutive_failures = 0;
                price
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                fetch_failures += 1;
                match &e {
                    PriceSourceError::Unavailable(_) => {
                        tracing::warn!(symbol = %symbol, error = %e, consecutive_failures, "Price fetch failed")
                    }
                    PriceSourceError::Rejected { .. } => {
                        tracing::error!(symbol = %symbol, error = %e, consecutive_failures, "Price request rejected")
                    }
                }
                if settings.max_consecutive_failures > 0
                    && consecutive_failures >= settings.max_consecutive_failures
                {
                    tracing::error!(symbol = %symbol, consecutive_failures, "Failure limit reached, poller stopping");
                    break PollerExit::FailureLimit;
                }
                continue;
            }
        };

        let obs = PriceObservation::now(symbol.as_str(), price);
        let before = trigger.state().trade_count();
        match trigger.observe_into(&obs.symbol, obs.price, obs.timestamp_ms, &mut sink) {
            Ok(decision) => {
                observations += 1;
                let contributed =
                    decision.is_release() || trigger.state().trade_count() > before;
                if let Err(e) = stats.record_tick(&obs.symbol, contributed) {
                    tracing::warn!(error = %e, "Failed to update tick stats");
                }
                match decision {
                    ReleaseDecision::Release { amount, trade_count } => tracing::info!(
                        symbol = %obs.symbol,
                        price = obs.price,
                        amount,
                        trade_count,
                        "Threshold crossed"
                    ),
                    ReleaseDecision::NoRelease => tracing::debug!(
                        symbol = %obs.symbol,
                        price = obs.price,
                        accumulated = trigger.state().accumulated(),
                        "Tick observed"
                    ),
                }
            }
            Err(e) => {
                tracing::warn!(symbol = %obs.symbol, error = %e, "Skipping invalid tick");
            }
        }
    };

    tracing::info!(
        symbol = %symbol,
        exit = ?exit,
        observations,
        pending = trigger.state().accumulated(),
        "Poller stopped"
    );

    PollerReport {
        symbol,
        trigger,
        exit,
        observations,
        fetch_failures,
    }
}
