#![forbid(unsafe_code)]

use crate::persistence::{ChunkPoint, StreamChunk};
use metrics::{MetricKind, SensorSample};
use std::collections::BTreeMap;

/// Accepted samples waiting to be cut into chunks.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    pending: BTreeMap<MetricKind, Vec<ChunkPoint>>,
    pending_len: usize,
    max_pending: usize,
    next_sequence: u32,
}

impl StreamBuffer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            pending_len: 0,
            max_pending: max_pending.max(1),
            next_sequence: 0,
        }
    }

    /// Buffers a sample. Returns `true` once enough samples are pending that
    /// a flush should happen without waiting for the timer.
    pub fn append(&mut self, sample: &SensorSample, moving_ms: Option<u64>) -> bool {
        self.pending.entry(sample.metric).or_default().push(ChunkPoint {
            t: sample.timestamp_ms,
            v: sample.value,
            m: moving_ms,
        });
        self.pending_len += 1;
        self.pending_len >= self.max_pending
    }

    /// Cuts one chunk per metric with pending samples, numbered from the
    /// session's sequence counter.
    pub fn cut(&mut self) -> Vec<StreamChunk> {
        let pending = std::mem::take(&mut self.pending);
        self.pending_len = 0;
        pending
            .into_iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(metric, samples)| {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                StreamChunk {
                    sequence,
                    metric,
                    samples,
                }
            })
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    /// Number of chunks cut so far, which is also the next sequence number.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn sequences_are_contiguous_across_flushes() {
        let mut buffer = StreamBuffer::new(100);
        buffer.append(&SensorSample::new(MetricKind::Power, 200.0, 0, "pm"), Some(0));
        buffer.append(&SensorSample::new(MetricKind::HeartRate, 130.0, 0, "hr"), Some(0));
        buffer.append(&SensorSample::new(MetricKind::Power, 210.0, 1_000, "pm"), Some(1_000));

        let first = buffer.cut();
        assert_eq!(
            first.iter().map(|c| (c.sequence, c.metric, c.samples.len())).collect::<Vec<_>>(),
            vec![(0, MetricKind::HeartRate, 1), (1, MetricKind::Power, 2)]
        );

        assert!(buffer.cut().is_empty());

        buffer.append(&SensorSample::new(MetricKind::Power, 220.0, 2_000, "pm"), None);
        let second = buffer.cut();
        assert_eq!(second[0].sequence, 2);
        assert_eq!(second[0].samples[0].m, None);
        assert_eq!(buffer.next_sequence(), 3);
    }

    #[test]
    fn size_trigger_fires_at_limit() {
        let mut buffer = StreamBuffer::new(2);
        assert!(!buffer.append(&SensorSample::new(MetricKind::Power, 1.0, 0, "pm"), None));
        assert!(buffer.append(&SensorSample::new(MetricKind::Power, 1.0, 1, "pm"), None));
        buffer.cut();
        assert_eq!(buffer.pending_len(), 0);
    }

    fn metric_for(index: u8) -> MetricKind {
        match index % 3 {
            0 => MetricKind::Power,
            1 => MetricKind::HeartRate,
            _ => MetricKind::Cadence,
        }
    }

    proptest! {
        #[test]
        fn cuts_keep_order_and_contiguous_sequences(
            ops in prop::collection::vec((0u8..3, any::<bool>()), 1..200),
        ) {
            let mut buffer = StreamBuffer::new(1_000);
            let mut chunks = Vec::new();
            let mut appended: BTreeMap<MetricKind, Vec<u64>> = BTreeMap::new();
            for (t, (index, cut)) in ops.iter().enumerate() {
                let metric = metric_for(*index);
                let t = t as u64 * 1_000;
                buffer.append(&SensorSample::new(metric, 1.0, t, "src"), Some(t));
                appended.entry(metric).or_default().push(t);
                if *cut {
                    chunks.extend(buffer.cut());
                }
            }
            chunks.extend(buffer.cut());

            let sequences: Vec<u32> = chunks.iter().map(|c| c.sequence).collect();
            prop_assert_eq!(sequences, (0..chunks.len() as u32).collect::<Vec<_>>());
            prop_assert_eq!(buffer.next_sequence(), chunks.len() as u32);

            let mut replayed: BTreeMap<MetricKind, Vec<u64>> = BTreeMap::new();
            for chunk in &chunks {
                prop_assert!(!chunk.samples.is_empty());
                replayed
                    .entry(chunk.metric)
                    .or_default()
                    .extend(chunk.samples.iter().map(|p| p.t));
            }
            prop_assert_eq!(replayed, appended);
        }
    }
}
