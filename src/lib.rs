//! Fixed-capacity ring byte buffer for journal data, plus a small journal writer
//! that owns one buffer and exports snapshots of it to durable sinks.

pub mod config;
pub mod error;
pub mod journal;
pub mod ring_buffer;
pub mod sink;

pub use error::Error;
pub use journal::Journal;
pub use ring_buffer::{RingBuffer, WrapObserverId};
