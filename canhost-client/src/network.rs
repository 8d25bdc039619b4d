//! Network ownership: the shared send path, the dispatch reader, and the set
//! of known nodes

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use canhost_common::{
    constants::cob,
    sdo,
    traits::{AsyncCanReceiver, AsyncCanSender},
    CanFrame, NodeId,
};
use snafu::{OptionExt, ResultExt};
use tokio::task::JoinHandle;

use crate::dictionary::ObjectDictionary;
use crate::dispatch::{FrameDispatcher, FrameFilter, Subscription, SubscriptionId};
use crate::error::{ProtocolSnafu, Result, TransportSnafu};
use crate::node::Node;

/// Cheap-clone handle giving nodes access to a network's send path and
/// dispatch fabric
pub(crate) struct NetworkLink<S> {
    sender: Arc<tokio::sync::Mutex<S>>,
    dispatcher: FrameDispatcher,
}

impl<S> Clone for NetworkLink<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<S> NetworkLink<S> {
    pub(crate) fn subscribe(&self, filter: FrameFilter) -> Subscription {
        self.dispatcher.subscribe(filter)
    }

    pub(crate) fn release(&self, id: SubscriptionId) {
        self.dispatcher.release(id);
    }
}

impl<S: AsyncCanSender> NetworkLink<S> {
    pub(crate) async fn send(&self, arbitration_id: u32, data: &[u8]) -> Result<()> {
        let frame = CanFrame::new(arbitration_id, data)
            .ok()
            .context(ProtocolSnafu)?;
        let mut sender = self.sender.lock().await;
        sender.send(frame).await.context(TransportSnafu)
    }
}

impl<S> fmt::Debug for NetworkLink<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkLink")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Owns a CAN bus on behalf of the application
///
/// A network wraps a transport into a mutex-serialized send path, runs the
/// reader task that feeds the dispatch fabric, and keeps a registry of the
/// nodes added to it. Dropping the network stops the reader and closes every
/// subscriber, cancelling any transaction still in flight.
pub struct Network<S: AsyncCanSender> {
    link: NetworkLink<S>,
    nodes: StdMutex<HashMap<NodeId, Node<S>>>,
    reader: JoinHandle<()>,
}

impl<S: AsyncCanSender> Network<S> {
    /// Create a network over a transport and start the dispatch reader
    pub fn new(sender: S, receiver: impl AsyncCanReceiver + 'static) -> Self {
        let dispatcher = FrameDispatcher::new();
        let reader = dispatcher.start(receiver);
        Self {
            link: NetworkLink {
                sender: Arc::new(tokio::sync::Mutex::new(sender)),
                dispatcher,
            },
            nodes: StdMutex::new(HashMap::new()),
            reader,
        }
    }

    /// Send a raw frame to the bus
    pub async fn send(&self, arbitration_id: u32, data: &[u8]) -> Result<()> {
        self.link.send(arbitration_id, data).await
    }

    /// Register a subscriber on the dispatch fabric
    pub fn subscribe(&self, filter: FrameFilter) -> Subscription {
        self.link.subscribe(filter)
    }

    /// Release a subscriber; unknown ids are ignored
    pub fn release(&self, id: SubscriptionId) {
        self.link.release(id);
    }

    /// Create a node bound to this network and remember it
    ///
    /// An existing node with the same id is replaced.
    pub fn add_node(&self, id: NodeId, dictionary: Option<Arc<ObjectDictionary>>) -> Node<S> {
        let node = Node::bound(id, self.link.clone(), dictionary);
        self.nodes.lock().unwrap().insert(id, node.clone());
        node
    }

    /// Look up a previously added node
    pub fn node(&self, id: NodeId) -> Option<Node<S>> {
        self.nodes.lock().unwrap().get(&id).cloned()
    }

    /// Probe the bus for live nodes
    ///
    /// Sends a device-type read (object 0x1000) to every node id in
    /// `1..=limit` and collects the ids that answer on their SDO response
    /// COB-ID before `timeout` elapses. Found nodes are not added
    /// automatically; pair with [`add_node`](Self::add_node).
    pub async fn search(&self, limit: u8, timeout: Duration) -> Result<Vec<NodeId>> {
        let limit = limit.min(NodeId::MAX);
        let window = limit as u32;
        let mut responses = self.subscribe(Box::new(move |frame| {
            let id = frame.arbitration_id();
            id > cob::SDO_RESPONSE && id <= cob::SDO_RESPONSE + window
        }));

        let request = [sdo::REQUEST_UPLOAD, 0x00, 0x10, 0x00, 0, 0, 0, 0];
        for id in 1..=limit {
            self.send(cob::SDO_REQUEST + id as u32, &request).await?;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut found = Vec::new();
        while let Ok(Ok(frame)) = tokio::time::timeout_at(deadline, responses.recv()).await {
            let raw = (frame.arbitration_id() - cob::SDO_RESPONSE) as u8;
            if let Ok(id) = NodeId::new(raw) {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        found.sort_unstable();
        Ok(found)
    }

    /// Stop the dispatch reader and close every subscriber
    ///
    /// Pending waiters observe a closed sink; SDO transactions in flight
    /// surface [`Cancelled`](crate::ClientError::Cancelled). The send path
    /// stays usable by nodes that still hold a handle.
    pub fn shutdown(&self) {
        self.reader.abort();
        self.link.dispatcher.close();
    }
}

impl<S: AsyncCanSender> Drop for Network<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: AsyncCanSender> fmt::Debug for Network<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("dispatcher", &self.link.dispatcher)
            .field("nodes", &self.nodes.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}
