//! Frame dispatch fabric
//!
//! A single reader task owns the inbound side of the CAN transport and fans
//! frames out to subscribers. Each subscriber installs a [`FrameFilter`] and
//! receives matching frames on a private channel; one slow subscriber never
//! stalls delivery to the others.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use canhost_common::{traits::AsyncCanReceiver, CanFrame};
use snafu::Snafu;
use tokio::sync::mpsc::{channel, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;

/// Predicate deciding whether a subscriber receives a frame
///
/// Filters must be cheap and side-effect free; every registered filter runs
/// against every inbound frame.
pub type FrameFilter = Box<dyn Fn(&CanFrame) -> bool + Send + Sync>;

/// Frames buffered per subscriber before dispatch starts dropping
const SINK_CAPACITY: usize = 100;

/// Opaque token identifying a subscriber, used to release it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct SubscriberEntry {
    id: SubscriptionId,
    filter: FrameFilter,
    sink: Sender<CanFrame>,
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<SubscriberEntry>,
    next_id: u64,
}

impl Registry {
    fn subscribe(&mut self, filter: FrameFilter) -> (SubscriptionId, Receiver<CanFrame>) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (sink, receiver) = channel(SINK_CAPACITY);
        self.subscribers.push(SubscriberEntry { id, filter, sink });
        (id, receiver)
    }

    /// Dropping the sender is what closes the subscriber's channel
    fn release(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|s| s.id != id);
    }

    fn close(&mut self) {
        self.subscribers.clear();
    }

    fn publish(&mut self, frame: &CanFrame) {
        self.subscribers.retain(|sub| {
            if !(sub.filter)(frame) {
                return true;
            }
            match sub.sink.try_send(*frame) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "subscriber {:?} is lagging, dropped frame {:#x}",
                        sub.id,
                        frame.arbitration_id()
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// Fan-out hub multiplexing one CAN bus among many subscribers
///
/// The dispatcher holds only the sending half of each subscriber's channel;
/// the acquirer owns the [`Subscription`]. A frame is delivered to every
/// subscriber whose filter matches at the moment the frame is dispatched, so
/// a subscriber that must see the response to a request has to be registered
/// before that request is transmitted.
#[derive(Clone)]
pub(crate) struct FrameDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl FrameDispatcher {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Spawn the reader task that drives dispatch from `receiver`
    ///
    /// The task runs until the receiver reports an error, then closes every
    /// subscriber so no waiter is left hanging.
    pub(crate) fn start<R>(&self, mut receiver: R) -> JoinHandle<()>
    where
        R: AsyncCanReceiver + 'static,
    {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(frame) => registry.lock().unwrap().publish(&frame),
                    Err(e) => {
                        log::error!("CAN receiver failed, stopping dispatch: {e:?}");
                        break;
                    }
                }
            }
            registry.lock().unwrap().close();
        })
    }

    /// Register a subscriber; matching frames arrive on the returned
    /// subscription from this point on
    pub(crate) fn subscribe(&self, filter: FrameFilter) -> Subscription {
        let (id, receiver) = self.registry.lock().unwrap().subscribe(filter);
        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Remove a subscriber and close its channel
    ///
    /// Safe to call from any task; releasing an unknown or already released
    /// id is a no-op.
    pub(crate) fn release(&self, id: SubscriptionId) {
        self.registry.lock().unwrap().release(id);
    }

    /// Close every subscriber
    pub(crate) fn close(&self) {
        self.registry.lock().unwrap().close();
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.registry.lock().unwrap().subscribers.len()
    }
}

impl fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("subscribers", &self.registry.lock().unwrap().subscribers.len())
            .finish()
    }
}

/// Error returned by [`Subscription::recv`] once the subscription has been
/// released or the dispatcher has shut down
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(display("subscription closed"))]
pub struct SubscriptionClosed;

/// A registered subscriber's receiving end
///
/// Owned by the acquirer; the dispatcher keeps only a sending handle that is
/// removed on release. Dropping the subscription releases it.
pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<CanFrame>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// The token identifying this subscriber
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next matching frame
    ///
    /// Returns [`SubscriptionClosed`] once the subscription has been released,
    /// after any already buffered frames have been drained.
    pub async fn recv(&mut self) -> Result<CanFrame, SubscriptionClosed> {
        self.receiver.recv().await.ok_or(SubscriptionClosed)
    }

    /// Return a buffered frame without waiting
    pub fn try_recv(&mut self) -> Option<CanFrame> {
        self.receiver.try_recv().ok()
    }

    /// Discard any buffered frames
    pub fn flush(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.lock().unwrap().release(self.id);
    }
}

impl futures::Stream for Subscription {
    type Item = CanFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<CanFrame>> {
        self.receiver.poll_recv(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    struct MockReceiver {
        rx: UnboundedReceiver<CanFrame>,
    }

    #[derive(Debug)]
    struct MockReceiveError;

    impl AsyncCanReceiver for MockReceiver {
        type Error = MockReceiveError;

        fn try_recv(&mut self) -> Option<CanFrame> {
            self.rx.try_recv().ok()
        }

        async fn recv(&mut self) -> Result<CanFrame, MockReceiveError> {
            self.rx.recv().await.ok_or(MockReceiveError)
        }
    }

    fn mock_fabric() -> (UnboundedSender<CanFrame>, FrameDispatcher, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let dispatcher = FrameDispatcher::new();
        let task = dispatcher.start(MockReceiver { rx });
        (tx, dispatcher, task)
    }

    fn frame(arbitration_id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(arbitration_id, data).unwrap()
    }

    #[tokio::test]
    async fn matching_subscribers_receive_frames() {
        let (tx, dispatcher, _task) = mock_fabric();
        let mut all = dispatcher.subscribe(Box::new(|_| true));
        let mut only_600 = dispatcher.subscribe(Box::new(|f| f.arbitration_id() == 0x600));

        tx.send(frame(0x580, &[1, 2, 3])).unwrap();
        tx.send(frame(0x600, &[4])).unwrap();

        assert_eq!(all.recv().await.unwrap().arbitration_id(), 0x580);
        assert_eq!(all.recv().await.unwrap().arbitration_id(), 0x600);
        assert_eq!(only_600.recv().await.unwrap().arbitration_id(), 0x600);
        assert!(only_600.try_recv().is_none());
    }

    #[tokio::test]
    async fn frames_arrive_in_transport_order() {
        let (tx, dispatcher, _task) = mock_fabric();
        let mut sub = dispatcher.subscribe(Box::new(|f| f.arbitration_id() == 0x77));

        for n in 0..20u8 {
            tx.send(frame(0x77, &[n])).unwrap();
        }
        for n in 0..20u8 {
            assert_eq!(sub.recv().await.unwrap().data()[0], n);
        }
    }

    #[tokio::test]
    async fn release_closes_the_sink() {
        let (tx, dispatcher, _task) = mock_fabric();
        let mut sub = dispatcher.subscribe(Box::new(|_| true));
        let id = sub.id();

        dispatcher.release(id);
        assert_eq!(sub.recv().await, Err(SubscriptionClosed));

        // frames sent after the release never reach the old subscriber
        tx.send(frame(0x100, &[])).unwrap();
        tokio::task::yield_now().await;
        assert!(sub.try_recv().is_none());

        // releasing again is a no-op
        dispatcher.release(id);
    }

    #[tokio::test]
    async fn dropping_a_subscription_releases_it() {
        let (_tx, dispatcher, _task) = mock_fabric();
        let sub = dispatcher.subscribe(Box::new(|_| true));
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(sub);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn reader_failure_closes_all_subscribers() {
        let (tx, dispatcher, task) = mock_fabric();
        let mut sub = dispatcher.subscribe(Box::new(|_| true));

        // dropping the transport makes the reader's recv fail
        drop(tx);
        task.await.unwrap();
        assert_eq!(sub.recv().await, Err(SubscriptionClosed));
    }
}
