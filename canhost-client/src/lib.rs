//! A host-side client for CANopen buses
//!
//! The crate provides the pieces a master application needs to talk to remote
//! CANopen nodes:
//!
//! - A [`Network`] owning a CAN transport: one reader task demultiplexes
//!   every inbound frame to filtered [`Subscription`]s, and a shared send
//!   path serializes transmissions
//! - A [`Node`] facade binding a node id to the network
//! - An [`SdoClient`] for reading and writing a node's object dictionary via
//!   expedited and segmented SDO transfers, with per-attempt timeouts that
//!   double on every retry
//! - An [`NmtMaster`] for commanding node states and observing heartbeats
//! - An [`ObjectDictionary`] for addressing entries by name
//!
//! The library is tokio-based. Transports implement the
//! [`AsyncCanSender`](canhost_common::AsyncCanSender) and
//! [`AsyncCanReceiver`](canhost_common::AsyncCanReceiver) traits; with the
//! `socketcan` feature (default) a Linux SocketCAN adapter is included.
#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod dictionary;
mod dispatch;
mod error;
mod network;
mod nmt_master;
mod node;
mod sdo_client;
mod sdo_reader;
mod sdo_writer;

pub use canhost_common as common;

pub use dictionary::{ObjectDictionary, ObjectEntry, ObjectRef, Value};
pub use dispatch::{FrameFilter, Subscription, SubscriptionClosed, SubscriptionId};
pub use error::{ClientError, Result};
pub use network::Network;
pub use nmt_master::{Heartbeat, NmtCommand, NmtMaster, NmtState};
pub use node::Node;
pub use sdo_client::SdoClient;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use canhost_common::open_socketcan;
