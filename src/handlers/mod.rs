//! [crate::dispatcher::Handler]s driving the time acquisition,
//! the assistance handshake and the message monitor.

mod ack;
mod monitor;
mod time;

pub use ack::AckCorrelator;
pub use monitor::Monitor;
pub use time::{AcquiredTime, TimeAcquisition};
