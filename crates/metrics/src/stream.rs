#![forbid(unsafe_code)]

use crate::window::RollingWindow;

/// Running statistics for one metric.
///
/// Every update is O(1). Only the power stream carries a [`RollingWindow`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedStream {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub first_timestamp_ms: Option<u64>,
    pub last_timestamp_ms: Option<u64>,
    window: Option<RollingWindow>,
}

impl AggregatedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: RollingWindow) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    /// Fold one value in. Returns the time elapsed since the previous sample
    /// of this stream, or `None` for the first one.
    pub fn push(&mut self, value: f64, timestamp_ms: u64) -> Option<u64> {
        let dt = self
            .last_timestamp_ms
            .map(|last| timestamp_ms.saturating_sub(last));

        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.first.get_or_insert(value);
        self.first_timestamp_ms.get_or_insert(timestamp_ms);
        self.last = Some(value);
        self.last_timestamp_ms = Some(timestamp_ms);

        if let Some(window) = self.window.as_mut() {
            window.push(timestamp_ms, value);
        }

        dt
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Wall-clock time between the first and the last sample.
    pub fn span_ms(&self) -> u64 {
        match (self.first_timestamp_ms, self.last_timestamp_ms) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }

    pub fn window(&self) -> Option<&RollingWindow> {
        self.window.as_ref()
    }
}
