use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::{validate_price, AccumulatorConfig, AccumulatorError, AccumulatorTrigger, ReleaseDecision};
use crate::sink::ReleaseSink;

/// One independent trigger per symbol, created lazily from a shared config.
///
/// Triggers never see each other's prices; the book only routes.
#[derive(Debug)]
pub struct AccumulatorBook {
    config: AccumulatorConfig,
    triggers: BTreeMap<String, AccumulatorTrigger>,
}

impl AccumulatorBook {
    pub fn new(config: AccumulatorConfig) -> Result<Self, AccumulatorError> {
        config.validate()?;
        Ok(Self {
            config,
            triggers: BTreeMap::new(),
        })
    }

    fn trigger_mut(&mut self, symbol: &str) -> Result<&mut AccumulatorTrigger, AccumulatorError> {
        let key = symbol.trim().to_ascii_uppercase();
        match self.triggers.entry(key) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(AccumulatorTrigger::new(self.config.clone())?)),
        }
    }

    /// An invalid price is rejected before an unseen symbol gets a trigger.
    pub fn observe(&mut self, symbol: &str, price: f64) -> Result<ReleaseDecision, AccumulatorError> {
        validate_price(price)?;
        self.trigger_mut(symbol)?.observe(price)
    }

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
        validate_price(price)?;
        let key = symbol.trim().to_ascii_uppercase();
        self.trigger_mut(&key)?
            .observe_into(&key, price, timestamp_ms, sink)
    }

    pub fn get(&self, symbol: &str) -> Option<&AccumulatorTrigger> {
        self.triggers.get(&symbol.trim().to_ascii_uppercase())
    }

    /// Tracked symbols in deterministic lexical order.
    pub fn symbols(&self) -> Vec<String> {
        self.triggers.keys().cloned().collect()
    }

    /// Remove a symbol's trigger, returning what it had accumulated.
    pub fn remove(&mut self, symbol: &str) -> Option<AccumulatorTrigger> {
        self.triggers.remove(&symbol.trim().to_ascii_uppercase())
    }
}
