//! Error types surfaced by the client

use canhost_common::SendError;
use snafu::Snafu;

/// Errors surfaced by network, node, and SDO operations
///
/// The SDO retry machinery recovers only from response timeouts; transport
/// failures and protocol violations are returned to the caller immediately.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    /// The node is not attached to a network
    #[snafu(display("node is not attached to a network"))]
    NoNetwork,
    /// The underlying transport failed to transmit
    #[snafu(display("CAN transport send failed: {source}"))]
    Transport {
        /// The transport's own error
        source: SendError,
    },
    /// Every retry elapsed without a matching response
    #[snafu(display("timed out waiting for an SDO response"))]
    Timeout,
    /// A segmented response violated the toggle-bit discipline
    #[snafu(display("SDO segment toggle bit mismatch"))]
    ToggleMismatch,
    /// The subscriber was released while a response was awaited
    #[snafu(display("wait cancelled: subscriber released"))]
    Cancelled,
    /// A frame was malformed: wrong length, reserved bits, or an
    /// out-of-range field
    #[snafu(display("malformed frame"))]
    Protocol,
}

/// Result alias used throughout the client
pub type Result<T> = std::result::Result<T, ClientError>;
