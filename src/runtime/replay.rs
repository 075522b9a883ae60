use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::accumulator::{AccumulatorBook, AccumulatorConfig};
use crate::model::observation::PriceObservation;
use crate::model::release::ReleaseEvent;
use crate::sink::ReleaseSink;

#[derive(Debug, Deserialize)]
struct ReplayRow {
    symbol: String,
    timestamp_ms: u64,
    price: f64,
}

#[derive(Debug)]
pub struct ReplayReport {
    pub book: AccumulatorBook,
    pub releases: Vec<ReleaseEvent>,
    pub observations: u64,
    pub rejected: u64,
}

/// Records every release while forwarding it to the caller's sink.
struct Tee<'a, S: ?Sized> {
    inner: &'a mut S,
    seen: Vec<ReleaseEvent>,
}

impl<S: ReleaseSink + ?Sized> ReleaseSink for Tee<'_, S> {
    fn on_release(&mut self, event: &ReleaseEvent) {
        self.seen.push(event.clone());
        self.inner.on_release(event);
    }
}

/// Replay `symbol,timestamp_ms,price` rows in file order through one trigger
/// per symbol. Rows with unusable prices are counted and skipped.
pub fn replay_reader<R, S>(reader: R, config: AccumulatorConfig, sink: &mut S) -> Result<ReplayReport>
where
    R: Read,
    S: ReleaseSink + ?Sized,
{
    let mut book = AccumulatorBook::new(config)?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut tee = Tee {
        inner: sink,
        seen: Vec::new(),
    };
    let mut observations = 0u64;
    let mut rejected = 0u64;

    for (line, row) in rdr.deserialize::<ReplayRow>().enumerate() {
        let row = row.with_context(|| format!("malformed replay row {}", line + 2))?;
        let obs = PriceObservation::new(row.symbol, row.price, row.timestamp_ms);
        match book.observe_into(&obs.symbol, obs.price, obs.timestamp_ms, &mut tee) {
            Ok(_) => observations += 1,
            Err(e) => {
                rejected += 1;
                tracing::warn!(symbol = %obs.symbol, row = line + 2, error = %e, "Skipping replay row");
            }
        }
    }

    Ok(ReplayReport {
        book,
        releases: tee.seen,
        observations,
        rejected,
    })
}

pub fn replay_file<S>(path: &Path, config: AccumulatorConfig, sink: &mut S) -> Result<ReplayReport>
where
    S: ReleaseSink + ?Sized,
{
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open replay file {}", path.display()))?;
    replay_reader(file, config, sink)
}
