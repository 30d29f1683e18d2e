//! Timer-driven producer.
//!
//! Emits a synthesized measurement into the broadcast feed on every worker
//! tick, independent of any consumer-side retry logic.

use std::sync::Arc;

use async_trait::async_trait;
use sensorlink_core::{ClockSource, Measurement};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::worker::BackgroundRunnable;

/// On-demand work for the [`TickingProducer`].
#[derive(Debug)]
pub enum ProducerTask {
    /// Emit one measurement now, outside the tick schedule. Requested when a
    /// stream subscriber connects.
    EmitNow,
}

/// Publishes a fresh measurement to every stream subscriber per tick.
pub struct TickingProducer {
    clock: Arc<dyn ClockSource>,
    feed: broadcast::Sender<Measurement>,
    emitted: u64,
}

impl TickingProducer {
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>, feed: broadcast::Sender<Measurement>) -> Self {
        Self {
            clock,
            feed,
            emitted: 0,
        }
    }

    fn emit(&mut self) {
        let measurement = Measurement::synthesize(self.clock.as_ref());
        self.emitted += 1;
        // A send error only means nobody is subscribed right now.
        match self.feed.send(measurement) {
            Ok(subscribers) => debug!(subscribers, "measurement emitted"),
            Err(_) => debug!("measurement emitted with no subscribers"),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for TickingProducer {
    type Task = ProducerTask;

    async fn run(&mut self, task: ProducerTask) {
        match task {
            ProducerTask::EmitNow => self.emit(),
        }
    }

    async fn on_tick(&mut self) {
        self.emit();
    }

    async fn shutdown(&mut self) {
        info!(emitted = self.emitted, "ticking producer stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sensorlink_core::ManualClock;

    use super::*;
    use crate::worker::BackgroundWorker;

    #[tokio::test(start_paused = true)]
    async fn emits_on_every_tick() {
        let clock = Arc::new(ManualClock::new(3_000));
        let (tx, mut rx) = broadcast::channel(8);
        let mut worker = BackgroundWorker::start(
            TickingProducer::new(clock.clone(), tx),
            Duration::from_secs(2),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.timestamp_millis(), 3_000);

        clock.set(5_000);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.timestamp_millis(), 5_000);

        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn emit_now_bypasses_the_schedule() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut worker = BackgroundWorker::start(
            TickingProducer::new(Arc::new(ManualClock::new(1)), tx),
            Duration::from_secs(3_600),
        );

        let tasks = worker.task_sender().unwrap();
        tasks.send(ProducerTask::EmitNow).await.unwrap();
        let m = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("emitted before the first tick")
            .unwrap();
        assert_eq!(m.timestamp_millis(), 1);

        worker.stop().await;
    }

    #[tokio::test]
    async fn emitting_without_subscribers_is_harmless() {
        let (tx, rx) = broadcast::channel(1);
        drop(rx);
        let mut producer = TickingProducer::new(Arc::new(ManualClock::new(0)), tx);
        producer.on_tick().await;
        producer.run(ProducerTask::EmitNow).await;
        assert_eq!(producer.emitted, 2);
    }
}
