//! The Snapshot Broadcaster - per-subscriber depth-1 latest-wins delivery.
//!
//! Each subscriber owns a `watch` slot. Publishing overwrites the slot
//! without waiting, so a slow subscriber skips intermediate frames and the
//! clock loop never blocks on subscriber I/O.

use consim_env::{EnvError, Frame, FrameSink, SubscriberId};
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::{debug, info};

/// Fan-out of serialized snapshots.
#[derive(Debug)]
pub struct Broadcaster {
    subscribers: BTreeMap<SubscriberId, watch::Sender<Option<Frame>>>,
    every_ticks: u64,
    last_frame: Option<Frame>,
}

impl Broadcaster {
    /// Creates a broadcaster publishing every `every_ticks` ticks.
    pub fn new(every_ticks: u64) -> Self {
        Self {
            subscribers: BTreeMap::new(),
            every_ticks: every_ticks.max(1),
            last_frame: None,
        }
    }

    /// True if the tick falls on the broadcast cadence.
    pub fn should_publish(&self, tick: u64) -> bool {
        tick % self.every_ticks == 0
    }

    /// Registers a subscriber. The most recent frame, if any, is pending
    /// immediately so a new renderer never waits a full cadence.
    ///
    /// Re-subscribing an existing id replaces its slot.
    pub fn subscribe(&mut self, id: SubscriberId) -> Subscription {
        let (tx, rx) = watch::channel(None);
        if let Some(frame) = &self.last_frame {
            // The receiver is alive, so this cannot fail
            let _ = tx.send(Some(frame.clone()));
        }
        self.subscribers.insert(id, tx);
        info!("Subscriber {} joined ({} total)", id, self.subscribers.len());
        Subscription { id, rx }
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            info!("Subscriber {} left ({} remaining)", id, self.subscribers.len());
        }
        removed
    }

    /// Overwrites every subscriber's slot with `frame`.
    ///
    /// Subscribers whose receiving end is gone are dropped; their ids are
    /// returned.
    pub fn publish(&mut self, frame: Frame) -> Vec<SubscriberId> {
        let mut closed = Vec::new();
        for (id, tx) in &self.subscribers {
            if tx.send(Some(frame.clone())).is_err() {
                closed.push(*id);
            }
        }
        for id in &closed {
            self.subscribers.remove(id);
            info!("Dropping subscriber {}: receiver closed", id);
        }
        debug!("Published tick {} ({} bytes) to {} subscribers", frame.tick, frame.size(), self.subscribers.len());
        self.last_frame = Some(frame);
        closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Discards the cached frame so subscribers joining after a reset wait
    /// for the first post-reset publish.
    pub fn forget_last_frame(&mut self) {
        self.last_frame = None;
    }

    /// Drops every subscriber, ending their streams.
    pub fn close(&mut self) {
        self.subscribers.clear();
    }
}

/// Receiving end of one subscriber's slot.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: watch::Receiver<Option<Frame>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for a frame newer than the last one returned.
    ///
    /// Returns `None` once the subscriber is unsubscribed or the engine stops.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// True if a frame is waiting.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// The frame currently in the slot, without marking it seen.
    pub fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }
}

/// Forwards frames from a subscription to a sink until either side ends.
///
/// Returns the number of frames delivered. A transport error ends the pump;
/// dropping the subscription then removes the subscriber on the next publish.
pub async fn pump<S: FrameSink>(mut subscription: Subscription, sink: &mut S) -> Result<u64, EnvError> {
    let mut delivered = 0;
    while let Some(frame) = subscription.next_frame().await {
        sink.send_frame(&frame).await?;
        delivered += 1;
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn frame(tick: u64) -> Frame {
        Frame::new(tick, format!("{{\"tick\":{tick}}}"))
    }

    #[test]
    fn test_cadence() {
        let b = Broadcaster::new(3);
        assert!(b.should_publish(0));
        assert!(!b.should_publish(1));
        assert!(b.should_publish(6));
        assert!(Broadcaster::new(0).should_publish(5));
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_only_latest() {
        let mut b = Broadcaster::new(1);
        let mut sub = b.subscribe(SubscriberId::from_seed(1));
        assert!(!sub.has_pending());

        for tick in 1..=10 {
            b.publish(frame(tick));
        }
        assert!(sub.has_pending());
        assert_eq!(sub.next_frame().await.map(|f| f.tick), Some(10));
        assert!(!sub.has_pending());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_last_frame() {
        let mut b = Broadcaster::new(1);
        b.publish(frame(4));
        let mut sub = b.subscribe(SubscriberId::from_seed(2));
        assert_eq!(sub.next_frame().await.map(|f| f.tick), Some(4));
    }

    #[tokio::test]
    async fn test_subscriber_after_reset_skips_stale_frame() {
        let mut b = Broadcaster::new(1);
        b.publish(frame(9));
        b.forget_last_frame();

        let mut sub = b.subscribe(SubscriberId::from_seed(4));
        assert!(!sub.has_pending());
        assert!(sub.latest().is_none());

        b.publish(frame(0));
        assert_eq!(sub.next_frame().await.map(|f| f.tick), Some(0));
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let mut b = Broadcaster::new(1);
        let keep = b.subscribe(SubscriberId::from_seed(1));
        let gone = b.subscribe(SubscriberId::from_seed(2));
        drop(gone);

        let closed = b.publish(frame(1));
        assert_eq!(closed, vec![SubscriberId::from_seed(2)]);
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(keep.latest().map(|f| f.tick), Some(1));
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream() {
        let mut b = Broadcaster::new(1);
        let id = SubscriberId::from_seed(3);
        let mut sub = b.subscribe(id);
        assert!(b.unsubscribe(&id));
        assert!(!b.unsubscribe(&id));
        assert_eq!(sub.next_frame().await, None);
    }

    struct Recorder {
        ticks: Vec<u64>,
        fail_at: Option<u64>,
    }

    #[async_trait]
    impl FrameSink for Recorder {
        async fn send_frame(&mut self, frame: &Frame) -> Result<(), EnvError> {
            if Some(frame.tick) == self.fail_at {
                return Err(EnvError::transport("link down"));
            }
            self.ticks.push(frame.tick);
            Ok(())
        }

        fn subscriber_id(&self) -> SubscriberId {
            SubscriberId::from_seed(9)
        }
    }

    #[tokio::test]
    async fn test_pump_delivers_until_closed() {
        let mut b = Broadcaster::new(1);
        let sub = b.subscribe(SubscriberId::from_seed(9));
        b.publish(frame(1));

        let task = tokio::spawn(async move {
            let mut sink = Recorder { ticks: Vec::new(), fail_at: None };
            let delivered = pump(sub, &mut sink).await;
            (delivered, sink.ticks)
        });
        tokio::task::yield_now().await;
        b.close();

        let (delivered, ticks) = task.await.unwrap();
        assert_eq!(delivered.unwrap(), ticks.len() as u64);
        assert_eq!(ticks.last(), Some(&1));
    }

    #[tokio::test]
    async fn test_pump_stops_on_transport_fault() {
        let mut b = Broadcaster::new(1);
        let sub = b.subscribe(SubscriberId::from_seed(9));
        b.publish(frame(5));

        let mut sink = Recorder { ticks: Vec::new(), fail_at: Some(5) };
        let result = pump(sub, &mut sink).await;
        assert!(matches!(result, Err(EnvError::TransportFault(_))));

        // The subscription was consumed by the pump, so the next publish drops it
        assert_eq!(b.publish(frame(6)).len(), 1);
        assert_eq!(b.subscriber_count(), 0);
    }
}
