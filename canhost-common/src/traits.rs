//! Transport traits
//!
//! The client is generic over the CAN transport: anything that can transmit
//! a [`CanFrame`] and produce a stream of inbound frames will do. No flow
//! control is assumed in either direction.

use core::future::Future;

use snafu::Snafu;

use crate::frame::CanFrame;

/// Error returned by [`AsyncCanSender::send`]
#[derive(Debug, Snafu)]
pub enum SendError {
    /// The transport has been closed and cannot transmit
    #[snafu(display("CAN transport closed"))]
    Closed,
    /// An I/O error reported by the underlying device
    #[snafu(display("I/O error sending CAN frame: {source}"))]
    Io {
        /// The device error
        source: std::io::Error,
    },
}

/// An async CAN sender
pub trait AsyncCanSender: Send {
    /// Send a frame to the bus
    fn send(&mut self, frame: CanFrame)
        -> impl Future<Output = Result<(), SendError>> + Send;
}

/// An async CAN receiver
pub trait AsyncCanReceiver: Send {
    /// Error meaning the transport has failed or closed; no further frames
    /// will arrive once `recv` returns it
    type Error: core::fmt::Debug + Send;

    /// Return an already buffered frame without waiting
    fn try_recv(&mut self) -> Option<CanFrame>;

    /// Wait for the next frame from the bus
    fn recv(&mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + Send;

    /// Discard any buffered frames
    fn flush(&mut self) {
        while self.try_recv().is_some() {}
    }
}
