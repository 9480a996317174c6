#![forbid(unsafe_code)]

//! Recording engine: session lifecycle, live aggregation, structured plan
//! execution and durable chunked persistence of sensor streams.

pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod ingest;
pub mod lifecycle;
pub mod persistence;
pub mod plan;
pub mod report;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{RecorderEngine, Services};
pub use error::{Action, Error, ErrorKind};
pub use events::{EventBus, RecorderEvent, Subscription};
pub use handle::{ControlCommand, RecorderHandle};
pub use lifecycle::{SessionGate, Transition};
pub use report::{MetricsSnapshot, SubmissionPayload};
