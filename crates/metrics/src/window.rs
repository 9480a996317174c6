#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::time::Duration;

/// Time-bounded ring of `(timestamp_ms, value)` pairs.
///
/// Entries older than the span are evicted on insert. Once the window has
/// seen a full span of data, every insert feeds the window mean into a
/// fourth-power accumulator, which is what normalized power is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    span_ms: u64,
    entries: VecDeque<(u64, f64)>,
    sum: f64,
    first_ms: Option<u64>,
    fourth_power_sum: f64,
    fourth_power_count: u64,
}

impl RollingWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span_ms: span.as_millis() as u64,
            entries: VecDeque::new(),
            sum: 0.0,
            first_ms: None,
            fourth_power_sum: 0.0,
            fourth_power_count: 0,
        }
    }

    pub fn push(&mut self, timestamp_ms: u64, value: f64) {
        let first = *self.first_ms.get_or_insert(timestamp_ms);
        self.entries.push_back((timestamp_ms, value));
        self.sum += value;

        if let Some(cutoff) = timestamp_ms.checked_sub(self.span_ms) {
            while let Some(&(t, v)) = self.entries.front() {
                if t > cutoff {
                    break;
                }
                self.entries.pop_front();
                self.sum -= v;
            }
        }

        if timestamp_ms.saturating_sub(first) >= self.span_ms
            && let Some(mean) = self.mean()
        {
            self.fourth_power_sum += mean.powi(4);
            self.fourth_power_count += 1;
        }
    }

    /// True once the window covers at least one full span of data.
    pub fn is_full(&self) -> bool {
        match (self.first_ms, self.entries.back()) {
            (Some(first), Some(&(newest, _))) => newest.saturating_sub(first) >= self.span_ms,
            _ => false,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.sum / self.entries.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fourth root of the mean fourth power of every full-window mean.
    pub fn normalized(&self) -> Option<f64> {
        if self.fourth_power_count == 0 {
            return None;
        }
        Some((self.fourth_power_sum / self.fourth_power_count as f64).powf(0.25))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_entries_outside_span() {
        let mut window = RollingWindow::new(Duration::from_secs(30));
        for s in 0..=30u64 {
            window.push(s * 1000, s as f64);
        }
        // (0, 30s] survives
        assert_eq!(window.len(), 30);
        assert_eq!(window.mean(), Some((1..=30).sum::<u64>() as f64 / 30.0));
    }

    #[test]
    fn early_samples_are_not_evicted() {
        let mut window = RollingWindow::new(Duration::from_secs(30));
        window.push(0, 100.0);
        window.push(1000, 200.0);
        assert_eq!(window.len(), 2);
        assert!(!window.is_full());
        assert_eq!(window.normalized(), None);
    }

    #[test]
    fn constant_input_normalizes_to_itself() {
        let mut window = RollingWindow::new(Duration::from_secs(30));
        for s in 0..600u64 {
            window.push(s * 1000, 250.0);
        }
        assert!(window.is_full());
        let np = window.normalized().unwrap();
        assert!((np - 250.0).abs() < 1e-9);
    }

    #[test]
    fn gap_larger_than_span_keeps_latest_entry() {
        let mut window = RollingWindow::new(Duration::from_secs(30));
        window.push(0, 100.0);
        window.push(120_000, 300.0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.mean(), Some(300.0));
        assert_eq!(window.normalized(), Some(300.0));
    }
}
