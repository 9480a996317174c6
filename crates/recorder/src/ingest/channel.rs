#![forbid(unsafe_code)]

use crate::error::Error;
use flume::TrySendError;
use metrics::{MetricKind, SensorSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

/// Bounded sample queue between sensor callbacks and the engine.
///
/// Producers never block: when the queue is full the oldest queued sample is
/// discarded to make room and counted as dropped.
pub fn sample_channel(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    let shared = Arc::new(Shared::default());
    let producer = SampleProducer {
        tx,
        evict: rx.clone(),
        shared: Arc::clone(&shared),
    };
    (producer, SampleConsumer { rx, shared })
}

#[derive(Debug, Default)]
struct Shared {
    dropped: AtomicU64,
    closed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct SampleProducer {
    tx: flume::Sender<SensorSample>,
    evict: flume::Receiver<SensorSample>,
    shared: Arc<Shared>,
}

impl SampleProducer {
    pub fn submit(&self, sample: SensorSample) -> Result<(), Error> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed);
        }
        let mut sample = sample;
        loop {
            match self.tx.try_send(sample) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.evict.try_recv() {
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(metric = %oldest.metric, timestamp_ms = oldest.timestamp_ms, "sample queue full, dropped oldest");
                    }
                    sample = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::ChannelClosed),
            }
        }
    }

    pub fn submit_reading(
        &self,
        metric: MetricKind,
        value: f64,
        timestamp_ms: u64,
        source_id: impl Into<String>,
    ) -> Result<(), Error> {
        self.submit(SensorSample::new(metric, value, timestamp_ms, source_id))
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct SampleConsumer {
    rx: flume::Receiver<SensorSample>,
    shared: Arc<Shared>,
}

impl SampleConsumer {
    pub async fn recv(&self) -> Option<SensorSample> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<SensorSample> {
        self.rx.try_recv().ok()
    }

    pub fn receiver(&self) -> flume::Receiver<SensorSample> {
        self.rx.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for SampleConsumer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power(ts: u64) -> SensorSample {
        SensorSample::new(MetricKind::Power, 200.0, ts, "pm")
    }

    #[test]
    fn full_queue_drops_oldest_first() {
        let (producer, consumer) = sample_channel(3);
        for ts in 0..5 {
            producer.submit(power(ts)).unwrap();
        }
        assert_eq!(producer.dropped(), 2);
        let kept: Vec<_> = std::iter::from_fn(|| consumer.try_recv())
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn submit_after_consumer_dropped_fails() {
        let (producer, consumer) = sample_channel(3);
        drop(consumer);
        assert!(matches!(producer.submit(power(0)), Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn concurrent_producers_keep_per_producer_order() {
        let (producer, consumer) = sample_channel(10_000);
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|source| {
                let producer = producer.clone();
                tokio::spawn(async move {
                    for ts in 0..500 {
                        producer
                            .submit(SensorSample::new(MetricKind::Cadence, 90.0, ts, source))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut last = std::collections::HashMap::new();
        let mut total = 0;
        while let Some(sample) = consumer.try_recv() {
            if let Some(prev) = last.insert(sample.source_id.clone(), sample.timestamp_ms) {
                assert!(prev < sample.timestamp_ms);
            }
            total += 1;
        }
        assert_eq!(total, 1_500);
        assert_eq!(consumer.dropped(), 0);
    }
}
