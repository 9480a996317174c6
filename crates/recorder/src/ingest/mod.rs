#![forbid(unsafe_code)]

mod channel;
mod presence;

pub use channel::{SampleConsumer, SampleProducer, sample_channel};
pub use presence::SensorPresence;
