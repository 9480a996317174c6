#![forbid(unsafe_code)]

mod bus;
mod event;

pub use bus::{EventBus, Subscription};
pub use event::RecorderEvent;
