use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use anyhow::Result;

use crate::model::release::{RealizationStatus, RealizedRelease};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SymbolStats {
    /// Valid price readings fed to the trigger.
    pub ticks: u64,
    /// Non-zero moves that contributed to the accumulator.
    pub virtual_trades: u64,
    pub releases: u32,
    pub failures: u32,
    pub skipped: u32,
    /// Base-asset quantity traded across entries.
    pub volume: f64,
    pub realized_net: f64,
    pub fees: f64,
}

impl SymbolStats {
    pub fn attempts(&self) -> u32 {
        self.releases + self.failures + self.skipped
    }

    pub fn success_rate_percent(&self) -> f64 {
        let total = self.attempts();
        if total == 0 {
            0.0
        } else {
            (self.releases as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StatsInner {
    initial_capital: f64,
    capital: f64,
    per_symbol: BTreeMap<String, SymbolStats>,
}

/// Shared counters for pollers and the executor. Cheap to lock; nothing is
/// held across an await.
#[derive(Debug, Default)]
pub struct ReleaseStats {
    data: Mutex<StatsInner>,
}

impl ReleaseStats {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            data: Mutex::new(StatsInner {
                initial_capital,
                capital: initial_capital,
                per_symbol: BTreeMap::new(),
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut StatsInner) -> R) -> Result<R> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("release stats lock poisoned"))?;
        Ok(f(&mut guard))
    }

    pub fn capital(&self) -> Result<f64> {
        self.with(|d| d.capital)
    }

    pub fn record_tick(&self, symbol: &str, contributed: bool) -> Result<()> {
        self.with(|d| {
            let entry = d.per_symbol.entry(symbol.to_string()).or_default();
            entry.ticks = entry.ticks.saturating_add(1);
            if contributed {
                entry.virtual_trades = entry.virtual_trades.saturating_add(1);
            }
        })
    }

    /// Apply `net` to capital and return the new capital.
    pub fn credit(&self, net: f64) -> Result<f64> {
        self.with(|d| {
            d.capital += net;
            d.capital
        })
    }

    pub fn record_release(&self, release: &RealizedRelease) -> Result<()> {
        self.with(|d| {
            let entry = d
                .per_symbol
                .entry(release.event.symbol.clone())
                .or_default();
            match release.status {
                RealizationStatus::Filled | RealizationStatus::DryRun => {
                    entry.releases = entry.releases.saturating_add(1);
                    entry.volume += release.quantity;
                    entry.realized_net += release.net;
                    entry.fees += release.fee;
                }
                RealizationStatus::Failed => entry.failures = entry.failures.saturating_add(1),
                RealizationStatus::Skipped => entry.skipped = entry.skipped.saturating_add(1),
            }
        })
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, SymbolStats>> {
        self.with(|d| d.per_symbol.clone())
    }

    /// Plain-text exit summary.
    pub fn render_summary(&self, elapsed_secs: f64, pending: &BTreeMap<String, f64>) -> Result<String> {
        let inner = self.with(|d| d.clone())?;
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(72));
        let _ = writeln!(out, "Session summary");
        let _ = writeln!(out, "{}", "=".repeat(72));
        let _ = writeln!(out, "Elapsed:          {:.2} min", elapsed_secs / 60.0);
        let _ = writeln!(out, "Initial capital:  {:.6}", inner.initial_capital);
        let _ = writeln!(out, "Final capital:    {:.6}", inner.capital);
        let gain = inner.capital - inner.initial_capital;
        if inner.initial_capital > 0.0 {
            let _ = writeln!(
                out,
                "Net gain:         {:.6} ({:.2}%)",
                gain,
                gain / inner.initial_capital * 100.0
            );
        } else {
            let _ = writeln!(out, "Net gain:         {:.6}", gain);
        }
        for (symbol, s) in &inner.per_symbol {
            let _ = writeln!(out, "{}", "-".repeat(72));
            let _ = writeln!(out, "{}", symbol);
            let _ = writeln!(
                out,
                "  ticks {} | virtual trades {} | releases {} | failed {} | skipped {}",
                s.ticks, s.virtual_trades, s.releases, s.failures, s.skipped
            );
            let _ = writeln!(
                out,
                "  volume {:.6} | net {:.6} | fees {:.6} | pending {:.6}",
                s.volume,
                s.realized_net,
                s.fees,
                pending.get(symbol).copied().unwrap_or(0.0)
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::release::{Direction, ReleaseEvent};

    fn realized(status: RealizationStatus, net: f64) -> RealizedRelease {
        RealizedRelease {
            event: ReleaseEvent {
                symbol: "BTCUSDT".to_string(),
                amount: net,
                trade_count: 3,
                price: 30_000.0,
                direction: Direction::Up,
                timestamp_ms: 0,
            },
            quantity: 0.003,
            fee: 0.0,
            net,
            capital: 0.0,
            status,
        }
    }

    #[test]
    fn success_rate_counts_every_attempt() {
        let stats = ReleaseStats::new(1.0);
        stats.record_release(&realized(RealizationStatus::Filled, 2.0)).unwrap();
        stats.record_release(&realized(RealizationStatus::DryRun, 1.0)).unwrap();
        stats.record_release(&realized(RealizationStatus::Failed, 0.0)).unwrap();
        stats.record_release(&realized(RealizationStatus::Skipped, 0.0)).unwrap();

        let s = stats.snapshot().unwrap()["BTCUSDT"];
        assert_eq!(s.attempts(), 4);
        assert!((s.success_rate_percent() - 50.0).abs() < 1e-9);
        assert!((s.volume - 0.006).abs() < 1e-12);
        assert!((s.realized_net - 3.0).abs() < 1e-12);
    }

    #[test]
    fn credit_accumulates_capital() {
        let stats = ReleaseStats::new(0.5);
        assert!((stats.credit(1.0).unwrap() - 1.5).abs() < 1e-12);
        assert!((stats.credit(0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((stats.capital().unwrap() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn summary_lists_symbols_and_pending() {
        let stats = ReleaseStats::new(10.0);
        stats.record_tick("ETHUSDT", false).unwrap();
        stats.record_tick("ETHUSDT", true).unwrap();
        stats.credit(5.0).unwrap();
        let pending = BTreeMap::from([("ETHUSDT".to_string(), 3.5)]);

        let text = stats.render_summary(120.0, &pending).unwrap();
        assert!(text.contains("Elapsed:          2.00 min"));
        assert!(text.contains("Final capital:    15.000000"));
        assert!(text.contains("(50.00%)"));
        assert!(text.contains("ticks 2 | virtual trades 1"));
        assert!(text.contains("pending 3.500000"));
    }
}
