//! Simulated subscribers with fault injection.

use async_trait::async_trait;
use consim_env::{EnvError, Frame, FrameSink, SubscriberId};

/// In-memory renderer that records every frame it is handed.
///
/// Fault injection:
/// - `lag_yields`: scheduler yields per frame, making the subscriber slow
///   relative to the clock loop so it observes latest-wins skipping
/// - `fail_after`: deliveries accepted before every send fails
#[derive(Debug, Clone)]
pub struct SimSubscriber {
    id: SubscriberId,
    lag_yields: usize,
    fail_after: Option<usize>,

    /// Ticks of the frames received, in arrival order
    pub received: Vec<u64>,

    /// Total payload bytes received
    pub bytes: usize,
}

impl SimSubscriber {
    /// Creates a subscriber that keeps up with every frame.
    pub fn new(id: SubscriberId) -> Self {
        Self {
            id,
            lag_yields: 0,
            fail_after: None,
            received: Vec::new(),
            bytes: 0,
        }
    }

    /// Makes the subscriber yield `yields` times per frame.
    pub fn with_lag(mut self, yields: usize) -> Self {
        self.lag_yields = yields;
        self
    }

    /// Makes every send after the first `frames` fail.
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Number of frames between consecutive received ticks that were never
    /// delivered, assuming a publish cadence of `every_ticks`.
    pub fn skipped(&self, every_ticks: u64) -> u64 {
        self.received
            .windows(2)
            .map(|w| (w[1].saturating_sub(w[0]) / every_ticks.max(1)).saturating_sub(1))
            .sum()
    }

    /// True if received ticks strictly increase.
    pub fn in_order(&self) -> bool {
        self.received.windows(2).all(|w| w[0] < w[1])
    }
}

#[async_trait]
impl FrameSink for SimSubscriber {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), EnvError> {
        if self.fail_after.is_some_and(|limit| self.received.len() >= limit) {
            return Err(EnvError::transport(format!("subscriber {} link down", self.id)));
        }
        for _ in 0..self.lag_yields {
            tokio::task::yield_now().await;
        }
        self.received.push(frame.tick);
        self.bytes += frame.size();
        Ok(())
    }

    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_frames() {
        let mut sub = SimSubscriber::new(SubscriberId::from_seed(1));
        sub.send_frame(&Frame::new(2, "ab")).await.unwrap();
        sub.send_frame(&Frame::new(4, "cde")).await.unwrap();
        assert_eq!(sub.received, vec![2, 4]);
        assert_eq!(sub.bytes, 5);
        assert!(sub.in_order());
        assert_eq!(sub.skipped(2), 0);
    }

    #[tokio::test]
    async fn test_fail_after() {
        let mut sub = SimSubscriber::new(SubscriberId::from_seed(2)).failing_after(1);
        assert!(sub.send_frame(&Frame::new(1, "x")).await.is_ok());
        let err = sub.send_frame(&Frame::new(2, "x")).await.unwrap_err();
        assert!(matches!(err, EnvError::TransportFault(_)));
        assert_eq!(sub.received, vec![1]);
    }

    #[test]
    fn test_skipped_counts_gaps() {
        let mut sub = SimSubscriber::new(SubscriberId::from_seed(3));
        sub.received = vec![2, 4, 10, 12];
        assert_eq!(sub.skipped(2), 2);
    }
}
