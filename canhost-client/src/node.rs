//! Node facade

use std::fmt;
use std::sync::Arc;

use canhost_common::{traits::AsyncCanSender, NodeId};
use snafu::OptionExt;

use crate::dictionary::{ObjectDictionary, ObjectRef};
use crate::dispatch::{FrameFilter, Subscription, SubscriptionId};
use crate::error::{NoNetworkSnafu, Result};
use crate::network::NetworkLink;
use crate::nmt_master::NmtMaster;
use crate::sdo_client::SdoClient;

/// A remote CANopen node reachable through a [`Network`](crate::Network)
///
/// Nodes are cheap handles: clones refer to the same remote device and share
/// the same network. A node created with [`Node::new`] is not attached to any
/// network and every bus operation fails with
/// [`NoNetwork`](crate::ClientError::NoNetwork) until a bound handle is
/// obtained from [`Network::add_node`](crate::Network::add_node).
pub struct Node<S> {
    id: NodeId,
    link: Option<NetworkLink<S>>,
    dictionary: Option<Arc<ObjectDictionary>>,
}

impl<S> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            link: self.link.clone(),
            dictionary: self.dictionary.clone(),
        }
    }
}

impl<S> Node<S> {
    /// Create a node that is not attached to any network
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            link: None,
            dictionary: None,
        }
    }

    pub(crate) fn bound(
        id: NodeId,
        link: NetworkLink<S>,
        dictionary: Option<Arc<ObjectDictionary>>,
    ) -> Self {
        Self {
            id,
            link: Some(link),
            dictionary,
        }
    }

    /// This node's id
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn link(&self) -> Result<&NetworkLink<S>> {
        self.link.as_ref().context(NoNetworkSnafu)
    }

    /// Acquire a filtered subscriber from the network's dispatch fabric
    pub fn subscribe(&self, filter: FrameFilter) -> Result<Subscription> {
        Ok(self.link()?.subscribe(filter))
    }

    /// Release a subscriber previously acquired through this node
    ///
    /// A no-op for unknown ids or when the node is unattached.
    pub fn release(&self, id: SubscriptionId) {
        if let Some(link) = &self.link {
            link.release(id);
        }
    }
}

impl<S: AsyncCanSender> Node<S> {
    /// Send a frame through the node's network
    pub async fn send(&self, arbitration_id: u32, data: &[u8]) -> Result<()> {
        self.link()?.send(arbitration_id, data).await
    }

    /// An SDO client for this node's default SDO server
    pub fn sdo(&self) -> SdoClient<S> {
        SdoClient::new(self.clone())
    }

    /// An NMT master for commanding and observing this node
    pub fn nmt(&self) -> NmtMaster<S> {
        NmtMaster::new(self.clone())
    }

    /// Look up a dictionary entry by name, wired to this node's SDO client
    ///
    /// Returns `None` when the node has no attached dictionary or the name is
    /// unknown.
    pub fn find_name(&self, name: &str) -> Option<ObjectRef<S>> {
        let entry = self.dictionary.as_ref()?.find_name(name)?.clone();
        Some(ObjectRef::new(entry, self.sdo()))
    }
}

impl<S> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("attached", &self.link.is_some())
            .finish_non_exhaustive()
    }
}
