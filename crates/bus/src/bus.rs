use crate::channel::{Channel, ChannelSet};
use crate::event::WorldEvent;
use futures_util::future::select_all;
use futures_util::stream::{self, Stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::time::error::Elapsed;

/// An event stamped with its bus-wide publish sequence.
#[derive(Debug, Clone)]
struct Envelope {
    seq: u64,
    event: WorldEvent,
}

/// Publish side of the bus. Cheap to clone; every clone feeds the same
/// subscribers.
///
/// Each channel has its own ring buffer, so traffic on one channel never
/// pushes another channel's events out of a subscriber's reach.
#[derive(Debug, Clone)]
pub struct EventBus {
    lanes: [broadcast::Sender<Envelope>; Channel::ALL.len()],
    sequence: Arc<AtomicU64>,
    subscriptions: Arc<AtomicUsize>,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may fall behind on one channel
    /// before it starts losing that channel's events. Clamped to at least
    /// one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lanes: std::array::from_fn(|_| broadcast::channel(capacity).0),
            sequence: Arc::new(AtomicU64::new(0)),
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fire-and-forget. Returns the number of live subscriptions the event
    /// was handed to; zero is not an error.
    pub fn publish(&self, event: impl Into<WorldEvent>) -> usize {
        let event = event.into();
        let channel = event.channel();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        match self.lanes[channel.index()].send(Envelope { seq, event }) {
            Ok(receivers) => {
                tracing::trace!(%channel, seq, receivers, "event published");
                receivers
            }
            Err(_) => {
                tracing::trace!(%channel, seq, "event published with no subscribers");
                0
            }
        }
    }

    /// Start receiving events on `channels`. Only events published after
    /// this call are seen.
    pub fn subscribe(&self, channels: impl Into<ChannelSet>) -> Subscription {
        let channels = channels.into();
        let lanes = Channel::ALL
            .into_iter()
            .filter(|channel| channels.contains(*channel))
            .map(|channel| Lane {
                channel,
                rx: Some(self.lanes[channel.index()].subscribe()),
                head: None,
            })
            .collect();
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%channels, "subscribed");
        Subscription {
            lanes,
            channels,
            missed: 0,
            registry: Arc::clone(&self.subscriptions),
        }
    }

    /// Live subscriptions, whatever their channels.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

/// One channel's receiver inside a subscription, plus at most one event
/// already taken off it but not yet handed out.
#[derive(Debug)]
struct Lane {
    channel: Channel,
    rx: Option<broadcast::Receiver<Envelope>>,
    head: Option<Envelope>,
}

impl Lane {
    /// Take a ready event without waiting. Returns the number of events
    /// lost to lag on the way.
    fn poll_ready(&mut self) -> u64 {
        let mut lost = 0;
        while self.head.is_none() {
            let Some(rx) = self.rx.as_mut() else { break };
            match rx.try_recv() {
                Ok(envelope) => self.head = Some(envelope),
                Err(TryRecvError::Lagged(skipped)) => lost += skipped,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => self.rx = None,
            }
        }
        lost
    }

    /// Wait for the next event on this channel.
    async fn wait(&mut self) -> u64 {
        let Some(rx) = self.rx.as_mut() else { return 0 };
        match rx.recv().await {
            Ok(envelope) => {
                self.head = Some(envelope);
                0
            }
            Err(RecvError::Lagged(skipped)) => skipped,
            Err(RecvError::Closed) => {
                self.rx = None;
                0
            }
        }
    }
}

/// One subscriber's view of the bus. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    lanes: Vec<Lane>,
    channels: ChannelSet,
    missed: u64,
    registry: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// Events lost so far because this subscriber fell behind.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Next event on a subscribed channel, in publish order. `None` once
    /// every publisher is gone. Cancel-safe: dropping the future loses
    /// nothing that a later call would have returned.
    pub async fn recv(&mut self) -> Option<WorldEvent> {
        loop {
            for lane in &mut self.lanes {
                let lost = lane.poll_ready();
                note_lag(&mut self.missed, lane.channel, lost);
            }
            let next = self
                .lanes
                .iter_mut()
                .filter(|lane| lane.head.is_some())
                .min_by_key(|lane| lane.head.as_ref().map(|envelope| envelope.seq));
            if let Some(lane) = next {
                return lane.head.take().map(|envelope| envelope.event);
            }

            let waiting: Vec<_> = self
                .lanes
                .iter_mut()
                .filter(|lane| lane.rx.is_some())
                .map(|lane| {
                    let channel = lane.channel;
                    Box::pin(async move { (channel, lane.wait().await) })
                })
                .collect();
            if waiting.is_empty() {
                return None;
            }
            let ((channel, lost), _, _) = select_all(waiting).await;
            note_lag(&mut self.missed, channel, lost);
        }
    }

    /// [`Self::recv`] bounded by `timeout`. `Ok(None)` means the bus closed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WorldEvent>, Elapsed> {
        tokio::time::timeout(timeout, self.recv()).await
    }

    /// The subscription as a lazy stream of events, ending when the bus
    /// closes.
    pub fn into_stream(self) -> impl Stream<Item = WorldEvent> + Send {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }

    /// Explicit form of dropping the subscription.
    pub fn unsubscribe(self) {
        tracing::debug!(channels = %self.channels, "unsubscribed");
    }
}

fn note_lag(missed: &mut u64, channel: Channel, lost: u64) {
    if lost > 0 {
        *missed += lost;
        tracing::warn!(%channel, skipped = lost, total = *missed, "subscriber lagged, events dropped");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.fetch_sub(1, Ordering::SeqCst);
    }
}
