//! Bounded FIFO of records awaiting acknowledgement.

use std::collections::VecDeque;

use sentinel_telemetry::TelemetryRecord;

/// A queued record plus its send history.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    record: TelemetryRecord,
    pub(crate) attempts: u32,
}

impl PendingRecord {
    pub fn record(&self) -> &TelemetryRecord {
        &self.record
    }

    /// Number of sends started for this record.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a previous send left this record unacknowledged.
    pub fn is_retry(&self) -> bool {
        self.attempts > 0
    }

    pub fn into_record(self) -> TelemetryRecord {
        self.record
    }
}

/// Fixed-capacity delivery queue.
///
/// Insertion order is send order. When full, the oldest record is evicted
/// on each push so the queue always holds the most recent records.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    buf: VecDeque<PendingRecord>,
    capacity: usize,
}

impl DeliveryQueue {
    /// Creates an empty queue with the given maximum capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "DeliveryQueue capacity must be > 0");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a record, returning the evicted one when at capacity.
    pub fn push(&mut self, record: TelemetryRecord) -> Option<TelemetryRecord> {
        let evicted = if self.buf.len() == self.capacity {
            self.buf.pop_front().map(PendingRecord::into_record)
        } else {
            None
        };
        self.buf.push_back(PendingRecord {
            record,
            attempts: 0,
        });
        evicted
    }

    /// Oldest pending record.
    pub fn front(&self) -> Option<&PendingRecord> {
        self.buf.front()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut PendingRecord> {
        self.buf.front_mut()
    }

    pub(crate) fn pop_front(&mut self) -> Option<PendingRecord> {
        self.buf.pop_front()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRecord> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    /// Removes everything, returning how many records were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_telemetry::TelemetryEncoder;

    fn record(anomalies: u64) -> TelemetryRecord {
        TelemetryEncoder::new("test").encode("/t", anomalies, Utc::now())
    }

    fn counts(q: &DeliveryQueue) -> Vec<u64> {
        q.iter().map(|p| p.record().anomaly_count()).collect()
    }

    #[test]
    fn push_under_capacity() {
        let mut q = DeliveryQueue::new(5);
        for i in 1..=3 {
            assert!(q.push(record(i)).is_none());
        }

        assert_eq!(q.len(), 3);
        assert!(!q.is_full());
        assert_eq!(counts(&q), vec![1, 2, 3]);
    }

    #[test]
    fn push_over_capacity_evicts_oldest() {
        let mut q = DeliveryQueue::new(3);
        let mut evicted = Vec::new();
        for i in 1..=5 {
            if let Some(r) = q.push(record(i)) {
                evicted.push(r.anomaly_count());
            }
        }

        assert!(q.is_full());
        assert_eq!(counts(&q), vec![3, 4, 5]);
        assert_eq!(evicted, vec![1, 2]);
    }

    #[test]
    fn retains_most_recent_for_any_length() {
        for capacity in 1..=4 {
            for total in 0..=12u64 {
                let mut q = DeliveryQueue::new(capacity);
                for i in 0..total {
                    q.push(record(i));
                    assert!(q.len() <= capacity);
                }
                let start = total.saturating_sub(capacity as u64);
                let expected: Vec<u64> = (start..total).collect();
                assert_eq!(counts(&q), expected, "capacity {capacity}, total {total}");
            }
        }
    }

    #[test]
    fn new_records_are_not_retries() {
        let mut q = DeliveryQueue::new(2);
        q.push(record(1));
        let front = q.front().unwrap();
        assert_eq!(front.attempts(), 0);
        assert!(!front.is_retry());

        q.front_mut().unwrap().attempts += 1;
        assert!(q.front().unwrap().is_retry());
    }

    #[test]
    fn clear_reports_dropped() {
        let mut q = DeliveryQueue::new(3);
        q.push(record(1));
        q.push(record(2));

        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = DeliveryQueue::new(0);
    }
}
