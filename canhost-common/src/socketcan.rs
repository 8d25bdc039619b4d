use std::sync::Arc;

use snafu::Snafu;
use socketcan::{
    tokio::CanSocket, CanFrame as SocketFrame, EmbeddedFrame, Frame, IoError, ShouldRetry,
    StandardId,
};

use crate::frame::CanFrame;
use crate::traits::{AsyncCanReceiver, AsyncCanSender, SendError};

fn socket_frame_to_frame(frame: SocketFrame) -> Option<CanFrame> {
    match frame {
        SocketFrame::Data(data) => match data.can_id() {
            socketcan::CanId::Standard(id) => {
                CanFrame::new(id.as_raw() as u32, data.data()).ok()
            }
            socketcan::CanId::Extended(_) => {
                log::trace!("ignoring extended-id frame");
                None
            }
        },
        SocketFrame::Remote(_) => None,
        SocketFrame::Error(_) => {
            log::warn!("CAN error frame received");
            None
        }
    }
}

fn frame_to_socket_frame(frame: &CanFrame) -> SocketFrame {
    let id = StandardId::new(frame.arbitration_id() as u16).unwrap();
    SocketFrame::new(id, frame.payload()).unwrap()
}

/// Receiving half of a shared SocketCAN socket
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

/// Error returned by [`SocketCanReceiver`]
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// I/O error reading from the socket
    Io {
        /// The device error
        source: IoError,
    },
}

impl AsyncCanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    /// Always `None`; the tokio socket only exposes an async read path
    fn try_recv(&mut self) -> Option<CanFrame> {
        None
    }

    async fn recv(&mut self) -> Result<CanFrame, ReceiveError> {
        loop {
            match self.socket.read_frame().await {
                Ok(raw) => {
                    if let Some(frame) = socket_frame_to_frame(raw) {
                        return Ok(frame);
                    }
                }
                Err(e) => {
                    if !e.should_retry() {
                        return Err(ReceiveError::Io { source: e });
                    }
                }
            }
        }
    }
}

/// Sending half of a shared SocketCAN socket
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
}

impl AsyncCanSender for SocketCanSender {
    async fn send(&mut self, frame: CanFrame) -> Result<(), SendError> {
        let raw = frame_to_socket_frame(&frame);
        self.socket
            .write_frame(raw)
            .await
            .map_err(|source| SendError::Io { source })
    }
}

/// Open a SocketCAN device and split it into sender and receiver halves
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0" or "can0"
///
/// Both halves share one socket, so the receiver does not see frames the
/// sender transmits.
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
) -> Result<(SocketCanSender, SocketCanReceiver), IoError> {
    let socket = Arc::new(CanSocket::open(device.as_ref())?);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
