#![forbid(unsafe_code)]

use metrics::{MetricKind, SensorSample, SourceId};
use std::collections::BTreeMap;

/// Tracks which sources are currently delivering data and the freshest
/// reading per metric.
#[derive(Debug, Clone)]
pub struct SensorPresence {
    stale_after_ms: u64,
    last_seen: BTreeMap<SourceId, u64>,
    latest: BTreeMap<MetricKind, (u64, f64)>,
    connected: Vec<SourceId>,
}

impl SensorPresence {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            stale_after_ms,
            last_seen: BTreeMap::new(),
            latest: BTreeMap::new(),
            connected: Vec::new(),
        }
    }

    pub fn observe(&mut self, sample: &SensorSample) {
        let seen = self
            .last_seen
            .entry(sample.source_id.clone())
            .or_insert(sample.timestamp_ms);
        *seen = (*seen).max(sample.timestamp_ms);

        let latest = self
            .latest
            .entry(sample.metric)
            .or_insert((sample.timestamp_ms, sample.value));
        if sample.timestamp_ms >= latest.0 {
            *latest = (sample.timestamp_ms, sample.value);
        }
    }

    /// Readings no older than the staleness window.
    pub fn current(&self, now_ms: u64) -> BTreeMap<MetricKind, f64> {
        self.latest
            .iter()
            .filter(|(_, (ts, _))| now_ms.saturating_sub(*ts) <= self.stale_after_ms)
            .map(|(metric, (_, value))| (*metric, *value))
            .collect()
    }

    /// Forgets stale sources. Returns the connected set when it differs from
    /// the previous call.
    pub fn refresh(&mut self, now_ms: u64) -> Option<Vec<SourceId>> {
        let window = self.stale_after_ms;
        self.last_seen
            .retain(|_, last| now_ms.saturating_sub(*last) <= window);
        let connected: Vec<_> = self.last_seen.keys().cloned().collect();
        if connected == self.connected {
            return None;
        }
        self.connected = connected.clone();
        Some(connected)
    }

    pub fn connected(&self) -> &[SourceId] {
        &self.connected
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
        self.latest.clear();
        self.connected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stale_readings_are_hidden() {
        let mut presence = SensorPresence::new(5_000);
        presence.observe(&SensorSample::new(MetricKind::Power, 210.0, 1_000, "pm"));
        presence.observe(&SensorSample::new(MetricKind::HeartRate, 140.0, 4_000, "strap"));

        let current = presence.current(7_000);
        assert_eq!(current.get(&MetricKind::Power), None);
        assert_eq!(current.get(&MetricKind::HeartRate), Some(&140.0));
    }

    #[test]
    fn connected_set_reports_changes_only() {
        let mut presence = SensorPresence::new(5_000);
        presence.observe(&SensorSample::new(MetricKind::Power, 210.0, 0, "pm"));
        assert_eq!(presence.refresh(1_000), Some(vec![SourceId::new("pm")]));
        assert_eq!(presence.refresh(2_000), None);
        assert_eq!(presence.refresh(6_000), Some(Vec::new()));
    }
}
