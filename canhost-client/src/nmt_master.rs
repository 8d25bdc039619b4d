//! NMT master for commanding a node's state and observing its heartbeats

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use canhost_common::{constants::cob, traits::AsyncCanSender};
use int_enum::IntEnum;
use tokio::task::JoinHandle;

use crate::dispatch::{FrameFilter, SubscriptionId};
use crate::error::{CancelledSnafu, Result, TimeoutSnafu};
use crate::node::Node;

/// The NMT state transition command specifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommand {
    /// Transition to the Operational state
    Start = 1,
    /// Transition to the Stopped state
    Stop = 2,
    /// Transition to the PreOperational state
    EnterPreOperational = 128,
    /// Perform an application reset
    ResetNode = 129,
    /// Perform a communications reset
    ResetCommunication = 130,
}

/// States a node reports in its heartbeat messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntEnum)]
#[repr(u8)]
pub enum NmtState {
    /// Transmitted once when the node finishes booting
    BootUp = 0,
    /// The node is stopped and only processes NMT commands
    Stopped = 4,
    /// The node is fully operational
    Operational = 5,
    /// The node is configured but PDO transfer is disabled
    PreOperational = 127,
}

/// A single observed heartbeat
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// The reported state
    pub state: NmtState,
    /// When the heartbeat arrived
    pub at: Instant,
}

struct Listener {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

/// Sends NMT commands to a single node and tracks its heartbeats
///
/// Heartbeat tracking is opt-in: call
/// [`listen_for_heartbeat`](Self::listen_for_heartbeat) to start a background
/// task that records the node's most recent state.
pub struct NmtMaster<S> {
    node: Node<S>,
    last: Arc<StdMutex<Option<Heartbeat>>>,
    listener: Option<Listener>,
}

impl<S> NmtMaster<S> {
    /// Create an NMT master for `node`
    pub fn new(node: Node<S>) -> Self {
        Self {
            node,
            last: Arc::new(StdMutex::new(None)),
            listener: None,
        }
    }

    fn heartbeat_filter(&self) -> FrameFilter {
        let cob_id = cob::HEARTBEAT + self.node.id().raw() as u32;
        Box::new(move |frame| frame.arbitration_id() == cob_id)
    }

    /// Stop recording heartbeats
    ///
    /// Releasing the subscriber terminates the listener task.
    pub fn unlisten_for_heartbeat(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.node.release(listener.subscription);
            listener.task.abort();
        }
    }

    /// The most recently recorded heartbeat, if listening
    pub fn last_heartbeat(&self) -> Option<Heartbeat> {
        *self.last.lock().unwrap()
    }
}

impl<S: AsyncCanSender> NmtMaster<S> {
    /// Command a state transition
    ///
    /// NMT commands are unconfirmed; observe the effect through heartbeats.
    pub async fn set_state(&self, command: NmtCommand) -> Result<()> {
        self.node
            .send(cob::NMT_COMMAND, &[command as u8, self.node.id().raw()])
            .await
    }

    /// Start recording this node's heartbeats
    ///
    /// A no-op when already listening.
    pub fn listen_for_heartbeat(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let mut heartbeats = self.node.subscribe(self.heartbeat_filter())?;
        let subscription = heartbeats.id();
        let last = Arc::clone(&self.last);
        let task = tokio::spawn(async move {
            while let Ok(frame) = heartbeats.recv().await {
                // bit 7 is the legacy node-guarding toggle
                match NmtState::try_from(frame.data()[0] & 0x7F) {
                    Ok(state) => {
                        *last.lock().unwrap() = Some(Heartbeat {
                            state,
                            at: Instant::now(),
                        });
                    }
                    Err(_) => {
                        log::debug!("heartbeat with unknown state {:#x}", frame.data()[0]);
                    }
                }
            }
        });
        self.listener = Some(Listener { subscription, task });
        Ok(())
    }

    /// Wait for the node to report boot-up
    ///
    /// Useful after [`ResetNode`](NmtCommand::ResetNode) to wait until the
    /// node is back.
    pub async fn wait_for_bootup(&self, timeout: Duration) -> Result<()> {
        let mut heartbeats = self.node.subscribe(self.heartbeat_filter())?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, heartbeats.recv()).await {
                Err(_) => return TimeoutSnafu.fail(),
                Ok(Err(_)) => return CancelledSnafu.fail(),
                Ok(Ok(frame)) => {
                    if frame.data()[0] & 0x7F == NmtState::BootUp as u8 {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl<S> Drop for NmtMaster<S> {
    fn drop(&mut self) {
        self.unlisten_for_heartbeat();
    }
}

impl<S> fmt::Debug for NmtMaster<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NmtMaster")
            .field("node", &self.node.id())
            .field("listening", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}
