#![forbid(unsafe_code)]

//! Streaming aggregation and derived training metrics.
//!
//! Nothing in this crate performs I/O or reads a clock: callers feed samples
//! with their timestamps and read results back.

pub mod aggregator;
pub mod calibration;
pub mod decoupling;
pub mod derived;
pub mod elevation;
pub mod sample;
pub mod stream;
pub mod window;
pub mod zones;

pub use aggregator::{AggregatorSettings, RollingAggregator};
pub use calibration::Calibration;
pub use derived::DerivedMetrics;
pub use sample::{MetricKind, SampleError, SensorSample, SourceId};
pub use stream::AggregatedStream;
pub use window::RollingWindow;
pub use zones::{ZoneModel, ZoneTime};
