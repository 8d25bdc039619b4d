//! Shared vocabulary for the canhost workspace: the CAN frame value type,
//! CANopen COB-ID and SDO constants, object data types, and the transport
//! traits the client builds on.

pub mod constants;
pub mod data_type;
pub mod frame;
pub mod node_id;
pub mod sdo;
pub mod traits;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
pub use socketcan::{open_socketcan, ReceiveError, SocketCanReceiver, SocketCanSender};

pub use data_type::DataType;
pub use frame::CanFrame;
pub use node_id::NodeId;
pub use traits::{AsyncCanReceiver, AsyncCanSender, SendError};
