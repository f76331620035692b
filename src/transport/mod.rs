//! Diagnostic transport capability.
//!
//! The session only ever sends a frame and waits a bounded time for the next
//! one. Bus setup (bitrate, channel, adapter) belongs to whoever builds the
//! transport.

mod bus;
mod loopback;
mod scripted;

pub use bus::BusTransport;
pub use loopback::LoopbackTransport;
pub use scripted::{ScriptedTransport, SentLog};

use crate::errors::TransportError;
use crate::types::CanFrame;
use std::time::Duration;

pub trait DiagnosticTransport {
    /// Put a frame on the bus
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Next frame seen on the bus, or `None` once `timeout` has passed
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, TransportError>;

    /// Release the underlying handle. Called exactly once by the owning session.
    fn shutdown(&mut self) {}
}

fn check_frame(frame: &CanFrame) -> Result<(), TransportError> {
    if frame.is_valid() {
        Ok(())
    } else {
        Err(TransportError::FrameTooLong(frame.data.len()))
    }
}
