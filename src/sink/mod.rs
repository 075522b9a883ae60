use tokio::sync::mpsc;

use crate::model::release::ReleaseEvent;

/// Receives releases synchronously, the instant a trigger crosses its
/// threshold. Implementations must not block: anything slow belongs behind
/// a [`QueueSink`].
pub trait ReleaseSink {
    fn on_release(&mut self, event: &ReleaseEvent);
}

impl<S: ReleaseSink + ?Sized> ReleaseSink for Box<S> {
    fn on_release(&mut self, event: &ReleaseEvent) {
        (**self).on_release(event)
    }
}

impl ReleaseSink for Vec<ReleaseEvent> {
    fn on_release(&mut self, event: &ReleaseEvent) {
        self.push(event.clone());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReleaseSink for LogSink {
    fn on_release(&mut self, event: &ReleaseEvent) {
        tracing::info!(
            symbol = %event.symbol,
            amount = event.amount,
            trade_count = event.trade_count,
            price = event.price,
            direction = %event.direction,
            "Accumulator released"
        );
    }
}

/// Single-writer hand-off into the executor task.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::UnboundedSender<ReleaseEvent>,
    dropped: u64,
}

impl QueueSink {
    pub fn new(tx: mpsc::UnboundedSender<ReleaseEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReleaseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Releases that could not be queued because the consumer is gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl ReleaseSink for QueueSink {
    fn on_release(&mut self, event: &ReleaseEvent) {
        if self.tx.send(event.clone()).is_err() {
            self.dropped += 1;
            tracing::error!(
                symbol = %event.symbol,
                amount = event.amount,
                "Release queue closed, release not delivered"
            );
        }
    }
}

#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ReleaseSink + Send>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReleaseSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReleaseSink for FanoutSink {
    fn on_release(&mut self, event: &ReleaseEvent) {
        for sink in &mut self.sinks {
            sink.on_release(event);
        }
    }
}
