#![allow(dead_code)]
//! Scripted mock transport for protocol-level tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canhost_common::{
    traits::{AsyncCanReceiver, AsyncCanSender, SendError},
    CanFrame,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A scripted response: `frame` appears on the bus `delay` after the
/// transmission it is attached to.
#[derive(Clone)]
pub struct Reply {
    pub delay: Duration,
    pub frame: CanFrame,
}

pub fn reply(delay_ms: u64, arbitration_id: u32, data: &[u8]) -> Reply {
    Reply {
        delay: Duration::from_millis(delay_ms),
        frame: CanFrame::new(arbitration_id, data).unwrap(),
    }
}

/// Sending half handed to the network under test
pub struct MockSender {
    sent: Arc<Mutex<Vec<CanFrame>>>,
    scripts: Arc<Mutex<VecDeque<Vec<Reply>>>>,
    inject: UnboundedSender<CanFrame>,
}

impl AsyncCanSender for MockSender {
    async fn send(&mut self, frame: CanFrame) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(frame);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let inject = self.inject.clone();
        tokio::spawn(async move {
            for r in script {
                tokio::time::sleep(r.delay).await;
                // the bus may already be gone; that is fine
                let _ = inject.send(r.frame);
            }
        });
        Ok(())
    }
}

/// Receiving half handed to the network under test
pub struct MockReceiver {
    rx: UnboundedReceiver<CanFrame>,
}

#[derive(Debug)]
pub struct Disconnected;

impl AsyncCanReceiver for MockReceiver {
    type Error = Disconnected;

    fn try_recv(&mut self) -> Option<CanFrame> {
        self.rx.try_recv().ok()
    }

    async fn recv(&mut self) -> Result<CanFrame, Disconnected> {
        self.rx.recv().await.ok_or(Disconnected)
    }
}

/// Control handle kept by the test: records transmissions, queues reply
/// scripts, and can place frames on the bus directly.
#[derive(Clone)]
pub struct MockBus {
    sent: Arc<Mutex<Vec<CanFrame>>>,
    scripts: Arc<Mutex<VecDeque<Vec<Reply>>>>,
    inject: UnboundedSender<CanFrame>,
}

impl MockBus {
    pub fn new() -> (MockBus, MockSender, MockReceiver) {
        let (tx, rx) = unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let scripts = Arc::new(Mutex::new(VecDeque::new()));
        (
            MockBus {
                sent: sent.clone(),
                scripts: scripts.clone(),
                inject: tx.clone(),
            },
            MockSender {
                sent,
                scripts,
                inject: tx,
            },
            MockReceiver { rx },
        )
    }

    /// Queue the replies played after the next unscripted transmission
    pub fn expect_send(&self, replies: Vec<Reply>) {
        self.scripts.lock().unwrap().push_back(replies);
    }

    /// Put a frame on the bus directly
    pub fn inject(&self, arbitration_id: u32, data: &[u8]) {
        self.inject
            .send(CanFrame::new(arbitration_id, data).unwrap())
            .unwrap();
    }

    /// Every frame transmitted so far, in order
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().unwrap().clone()
    }
}
