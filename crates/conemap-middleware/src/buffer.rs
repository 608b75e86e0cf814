//! Staging area between sensor producers and the fusion cycle.
//!
//! Producers (transport callbacks, replay tasks) only ever see these handles;
//! the occupancy grid stays private to the single consumer that drains them.
//!
//! | Handle | Semantics |
//! |---|---|
//! | [`ReadingBuffer`] | every reading delivered exactly once, in arrival order |
//! | [`ScanSlot`] | latest scan wins, readers never block the writer |
//!
//! The buffer's lock is held only for the append or the swap, never across
//! fusion work.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conemap_types::{LaserScan, RangeReading};
use tokio::sync::watch;
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// ReadingBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Shared pending-readings queue. Clone it cheaply – all clones share the
/// same storage.
#[derive(Clone, Debug, Default)]
pub struct ReadingBuffer {
    pending: Arc<Mutex<Vec<RangeReading>>>,
}

impl ReadingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reading. Safe to call from any thread.
    pub fn push(&self, reading: RangeReading) {
        self.lock().push(reading);
    }

    /// Take every pending reading, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<RangeReading> {
        mem::take(&mut *self.lock())
    }

    /// Discard pending readings without processing them.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A producer that panicked mid-push leaves a valid Vec behind.
    fn lock(&self) -> MutexGuard<'_, Vec<RangeReading>> {
        self.pending.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("reading buffer lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScanSlot
// ────────────────────────────────────────────────────────────────────────────

/// Holds the most recent [`LaserScan`] for the optional cross-check.
#[derive(Clone, Debug)]
pub struct ScanSlot {
    sender: Arc<watch::Sender<Option<LaserScan>>>,
}

impl ScanSlot {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replace the stored scan.
    pub fn publish(&self, scan: LaserScan) {
        self.sender.send_replace(Some(scan));
    }

    /// Copy of the latest scan, if any has arrived.
    pub fn latest(&self) -> Option<LaserScan> {
        self.sender.borrow().clone()
    }

    pub fn clear(&self) {
        self.sender.send_replace(None);
    }
}

impl Default for ScanSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::thread;

    fn reading(frame: &str, range: f64) -> RangeReading {
        RangeReading {
            frame_id: frame.to_string(),
            stamp: Utc::now(),
            range,
            min_range: 0.1,
            max_range: 4.0,
            field_of_view: 0.3,
        }
    }

    #[test]
    fn drain_returns_arrival_order_and_empties() {
        let buf = ReadingBuffer::new();
        for i in 0..5 {
            buf.push(reading("sonar", f64::from(i)));
        }
        assert_eq!(buf.len(), 5);

        let drained = buf.drain_all();
        let ranges: Vec<f64> = drained.iter().map(|r| r.range).collect();
        assert_eq!(ranges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(buf.is_empty());
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let producer = ReadingBuffer::new();
        let consumer = producer.clone();
        producer.push(reading("ir", 1.0));
        assert_eq!(consumer.len(), 1);
        consumer.clear();
        assert!(producer.is_empty());
    }

    #[test]
    fn concurrent_producers_deliver_exactly_once() {
        let buf = ReadingBuffer::new();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let buf = buf.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        buf.push(reading(&format!("sonar_{p}"), f64::from(i)));
                    }
                })
            })
            .collect();

        let mut collected = Vec::new();
        while producers.iter().any(|h| !h.is_finished()) {
            collected.extend(buf.drain_all());
        }
        for h in producers {
            h.join().unwrap();
        }
        collected.extend(buf.drain_all());

        assert_eq!(collected.len(), 1000);
        for p in 0..4 {
            let frame = format!("sonar_{p}");
            let ranges: Vec<f64> = collected
                .iter()
                .filter(|r| r.frame_id == frame)
                .map(|r| r.range)
                .collect();
            let expected: Vec<f64> = (0..250).map(f64::from).collect();
            assert_eq!(ranges, expected, "per-producer order for {frame}");
        }
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let buf = ReadingBuffer::new();
        buf.push(reading("sonar", 1.0));
        let clone = buf.clone();
        let _ = thread::spawn(move || {
            let _guard = clone.pending.lock().unwrap();
            panic!("producer died");
        })
        .join();

        buf.push(reading("sonar", 2.0));
        assert_eq!(buf.drain_all().len(), 2);
    }

    #[test]
    fn scan_slot_keeps_latest() {
        let slot = ScanSlot::new();
        assert!(slot.latest().is_none());

        let writer = slot.clone();
        writer.publish(LaserScan {
            stamp: Utc::now(),
            ranges: vec![1.0],
        });
        writer.publish(LaserScan {
            stamp: Utc::now(),
            ranges: vec![2.0, 3.0],
        });
        assert_eq!(slot.latest().map(|s| s.ranges.len()), Some(2));

        slot.clear();
        assert!(writer.latest().is_none());
    }
}
