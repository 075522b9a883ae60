pub mod poller;
pub mod replay;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::accumulator::{AccumulatorConfig, AccumulatorError, AccumulatorTrigger};
use crate::price_source::PriceSource;
use crate::release_stats::ReleaseStats;
use crate::sink::QueueSink;

pub use poller::{run_symbol_poller, PollerExit, PollerReport, PollerSettings};
pub use replay::{replay_file, replay_reader, ReplayReport};

/// Spawn one poller task per symbol, all feeding the same release queue.
///
/// Every task gets its own trigger built from `config`; the returned handles
/// yield each trigger back on shutdown.
pub fn spawn_pollers(
    source: Arc<dyn PriceSource>,
    symbols: &[String],
    config: &AccumulatorConfig,
    sink: &QueueSink,
    settings: PollerSettings,
    stats: &Arc<ReleaseStats>,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<PollerReport>>, AccumulatorError> {
    let mut handles = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let trigger = AccumulatorTrigger::new(config.clone())?;
        handles.push(tokio::spawn(run_symbol_poller(
            source.clone(),
            symbol.clone(),
            trigger,
            sink.clone(),
            settings,
            stats.clone(),
            shutdown.clone(),
        )));
    }
    Ok(handles)
}
