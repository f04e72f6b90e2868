//! Latest-frame mailbox
//!
//! Single-slot handoff between the receive thread and the consumer. The
//! producer overwrites, the consumer drains. Under load older frames are
//! dropped so the consumer only ever sees the freshest one, which bounds
//! staleness by the consumer's tick rate rather than by queue depth.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use posesync_core::Frame;

/// Mailbox counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Items published
    pub published: u64,
    /// Items replaced before anyone took them
    pub superseded: u64,
    /// Items handed to the consumer
    pub taken: u64,
}

/// Single-slot overwrite queue.
///
/// The lock is only held for the slot swap; the replaced item is dropped
/// after the lock is released.
#[derive(Debug)]
pub struct LatestFrameMailbox<T = Frame> {
    slot: Mutex<Option<T>>,
    published: AtomicU64,
    superseded: AtomicU64,
    taken: AtomicU64,
}

impl<T> LatestFrameMailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            taken: AtomicU64::new(0),
        }
    }

    /// Publish an item, replacing any unconsumed one. Never blocks on the consumer.
    pub fn publish(&self, item: T) {
        let previous = self.slot.lock().replace(item);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the newest item, if one arrived since the last take
    pub fn take_latest(&self) -> Option<T> {
        let item = self.slot.lock().take();
        if item.is_some() {
            self.taken.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Is an item waiting?
    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            published: self.published.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for LatestFrameMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use posesync_core::Observation;
    use proptest::prelude::*;

    fn frame(id: u32) -> Frame {
        Frame::new(vec![Observation::new(id, 0.5, 0.5, 0.0)])
    }

    #[test]
    fn test_latest_wins() {
        let mailbox = LatestFrameMailbox::new();
        mailbox.publish(frame(1));
        mailbox.publish(frame(2));

        assert_eq!(mailbox.take_latest(), Some(frame(2)));
        assert_eq!(mailbox.take_latest(), None);

        let stats = mailbox.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.taken, 1);
    }

    #[test]
    fn test_empty_take() {
        let mailbox: LatestFrameMailbox = LatestFrameMailbox::new();
        assert!(!mailbox.has_pending());
        assert!(mailbox.take_latest().is_none());
    }

    #[test]
    fn test_concurrent_producer_never_blocks_on_consumer() {
        let mailbox = Arc::new(LatestFrameMailbox::<u64>::new());
        let producer_box = Arc::clone(&mailbox);

        let producer = thread::spawn(move || {
            for seq in 1..=10_000u64 {
                producer_box.publish(seq);
            }
        });

        // Values the consumer sees must be strictly increasing
        let mut last = 0u64;
        while last < 10_000 {
            if let Some(seq) = mailbox.take_latest() {
                assert!(seq > last);
                last = seq;
            } else if producer.is_finished() && !mailbox.has_pending() {
                break;
            }
        }
        producer.join().unwrap();

        let stats = mailbox.stats();
        assert_eq!(stats.published, 10_000);
        assert_eq!(stats.published, stats.superseded + stats.taken + mailbox.has_pending() as u64);
    }

    proptest! {
        #[test]
        fn prop_only_last_publish_is_observed(values in prop::collection::vec(any::<u32>(), 1..50)) {
            let mailbox = LatestFrameMailbox::new();
            for v in &values {
                mailbox.publish(*v);
            }
            prop_assert_eq!(mailbox.take_latest(), values.last().copied());
            prop_assert_eq!(mailbox.take_latest(), None);
        }
    }
}
