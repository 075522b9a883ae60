use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::model::order::{OrderAck, OrderSide};
use crate::model::release::{RealizationStatus, RealizedRelease, ReleaseEvent};
use crate::release_stats::ReleaseStats;
use crate::release_store::ReleaseLedger;

/// Places market orders. Implemented by the Binance futures client and by
/// test doubles.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
        client_order_id: &str,
    ) -> Result<OrderAck>;
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub dry_run: bool,
    /// Order notional in quote currency; quantity is `notional / price`.
    pub notional_usdt: f64,
    pub qty_precision: u32,
    pub close_delay_ms: u64,
    pub fee_rate: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            notional_usdt: 100.0,
            qty_precision: 3,
            close_delay_ms: 500,
            fee_rate: 0.001,
        }
    }
}

impl ExecutionSettings {
    /// `notional / price` rounded to `qty_precision` decimals.
    pub fn order_quantity(&self, price: f64) -> f64 {
        if !(price.is_finite() && price > 0.0) {
            return 0.0;
        }
        let scale = 10f64.powi(self.qty_precision.min(12) as i32);
        (self.notional_usdt / price * scale).round() / scale
    }

    pub fn fee(&self, amount: f64) -> f64 {
        amount * self.fee_rate
    }
}

fn client_order_id(symbol: &str, leg: &str) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("acb-{}-{}-{}", symbol.to_ascii_lowercase(), leg, &nonce[..8])
}

/// Turns releases into a paired entry + reduce-only close. One executor
/// consumes the queue of every poller, so orders never interleave.
///
/// With a ledger attached every release lives only in SQLite; the in-memory
/// history is kept for ledger-less (replay) runs.
pub struct ReleaseExecutor {
    gateway: Option<Arc<dyn OrderGateway>>,
    settings: ExecutionSettings,
    stats: Arc<ReleaseStats>,
    ledger: Option<ReleaseLedger>,
    history: Vec<RealizedRelease>,
    started_ms: i64,
}

impl ReleaseExecutor {
    pub fn new(
        gateway: Option<Arc<dyn OrderGateway>>,
        settings: ExecutionSettings,
        stats: Arc<ReleaseStats>,
    ) -> Self {
        Self {
            gateway,
            settings,
            stats,
            ledger: None,
            history: Vec::new(),
            started_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn dry_run(settings: ExecutionSettings, stats: Arc<ReleaseStats>) -> Self {
        Self::new(None, settings, stats)
    }

    pub fn with_ledger(mut self, ledger: ReleaseLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn history(&self) -> &[RealizedRelease] {
        &self.history
    }

    fn is_dry_run(&self) -> bool {
        self.settings.dry_run || self.gateway.is_none()
    }

    async fn place_pair(
        gateway: &dyn OrderGateway,
        close_delay_ms: u64,
        event: &ReleaseEvent,
        quantity: f64,
    ) -> Result<()> {
        let entry_side = event.direction.entry_side();
        let entry = gateway
            .market_order(
                &event.symbol,
                entry_side,
                quantity,
                false,
                &client_order_id(&event.symbol, "in"),
            )
            .await?;
        if !entry.status.is_accepted() {
            return Err(AppError::Order(format!(
                "entry order {} came back {}",
                entry.order_id, entry.status
            ))
            .into());
        }

        if close_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(close_delay_ms)).await;
        }

        let close = gateway
            .market_order(
                &event.symbol,
                entry_side.opposite(),
                quantity,
                true,
                &client_order_id(&event.symbol, "out"),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    symbol = %event.symbol,
                    entry_order_id = entry.order_id,
                    quantity,
                    error = %e,
                    "Close leg failed, position may remain open"
                );
                e
            })?;
        if !close.status.is_accepted() {
            return Err(AppError::Order(format!(
                "close order {} came back {}",
                close.order_id, close.status
            ))
            .into());
        }
        Ok(())
    }

    pub async fn realize(&mut self, event: ReleaseEvent) -> RealizedRelease {
        let quantity = self.settings.order_quantity(event.price);

        let status = if quantity <= 0.0 {
            tracing::warn!(
                symbol = %event.symbol,
                price = event.price,
                notional = self.settings.notional_usdt,
                "Order quantity rounds to zero, release skipped"
            );
            RealizationStatus::Skipped
        } else if self.is_dry_run() {
            RealizationStatus::DryRun
        } else if let Some(gateway) = self.gateway.clone() {
            let delay = self.settings.close_delay_ms;
            match Self::place_pair(gateway.as_ref(), delay, &event, quantity).await {
                Ok(()) => RealizationStatus::Filled,
                Err(e) => {
                    tracing::error!(symbol = %event.symbol, error = %format!("{:#}", e), "Release execution failed");
                    RealizationStatus::Failed
                }
            }
        } else {
            RealizationStatus::DryRun
        };

        let (fee, net) = if status.is_realized() {
            let fee = self.settings.fee(event.amount);
            (fee, event.amount - fee)
        } else {
            (0.0, 0.0)
        };
        let capital = if status.is_realized() {
            self.stats.credit(net)
        } else {
            self.stats.capital()
        }
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Capital unavailable");
            0.0
        });

        let realized = RealizedRelease {
            event,
            quantity: if status == RealizationStatus::Skipped { 0.0 } else { quantity },
            fee,
            net,
            capital,
            status,
        };

        tracing::info!(
            symbol = %realized.event.symbol,
            status = %realized.status,
            amount = realized.event.amount,
            trade_count = realized.event.trade_count,
            quantity = realized.quantity,
            fee = realized.fee,
            net = realized.net,
            capital = realized.capital,
            "Release realized"
        );

        if let Err(e) = self.stats.record_release(&realized) {
            tracing::warn!(error = %e, "Failed to update release stats");
        }
        match &self.ledger {
            Some(ledger) => {
                if let Err(e) = ledger.record(&realized) {
                    tracing::warn!(error = %format!("{:#}", e), "Failed to persist release");
                }
            }
            None => self.history.push(realized.clone()),
        }
        realized
    }

    /// Everything realized since this executor was built, read back from the
    /// ledger when there is one.
    pub fn session_releases(&self) -> Vec<RealizedRelease> {
        match &self.ledger {
            Some(ledger) => ledger.load_since(self.started_ms).unwrap_or_else(|e| {
                tracing::warn!(error = %format!("{:#}", e), "Failed to read session releases");
                Vec::new()
            }),
            None => self.history.clone(),
        }
    }

    /// Drain the release queue until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ReleaseEvent>) -> Vec<RealizedRelease> {
        while let Some(event) = rx.recv().await {
            self.realize(event).await;
        }
        let releases = self.session_releases();
        tracing::info!(releases = releases.len(), "Release queue closed, executor exiting");
        releases
    }
}
