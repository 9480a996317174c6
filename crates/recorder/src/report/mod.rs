#![forbid(unsafe_code)]

mod snapshot;
mod submission;

pub use snapshot::{MetricsSnapshot, StreamSummary};
pub use submission::SubmissionPayload;
