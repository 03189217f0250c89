//! Capture and delivery statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::driver::NativeStats;

/// Statistics for a capture session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureStats {
    /// Packet messages handed to the consumer
    pub packets_delivered: u64,
    /// Captured bytes handed to the consumer
    pub bytes_delivered: u64,
    /// Sends refused by the consumer channel (full or closed)
    pub delivery_failures: u64,
    /// Message buffers that could not be allocated
    pub allocation_failures: u64,
    /// Error messages handed to the consumer
    pub errors_reported: u64,
    /// Packets received by the library filter
    pub packets_received: u64,
    /// Packets dropped by the kernel
    pub packets_dropped: u64,
    /// Packets dropped by the interface
    pub packets_if_dropped: u64,
    /// Time since the session was opened
    pub duration: Duration,
    /// Delivered packets per second
    pub packets_per_second: f64,
    /// Delivered bytes per second
    pub bytes_per_second: f64,
}

impl CaptureStats {
    /// Merge the library's counters into this snapshot
    pub fn with_native(mut self, native: NativeStats) -> Self {
        self.packets_received = native.received;
        self.packets_dropped = native.dropped;
        self.packets_if_dropped = native.if_dropped;
        self
    }

    /// Kernel drop rate as a percentage of packets received
    pub fn drop_rate(&self) -> f64 {
        if self.packets_received == 0 {
            return 0.0;
        }
        (self.packets_dropped as f64 / self.packets_received as f64) * 100.0
    }

    /// Check if there are significant drops
    pub fn has_significant_drops(&self, threshold_percent: f64) -> bool {
        self.drop_rate() > threshold_percent
    }

    /// Whether the consumer ever refused a message
    pub fn saw_backpressure(&self) -> bool {
        self.delivery_failures > 0
    }

    /// Format statistics as human-readable string
    pub fn format(&self) -> String {
        format!(
            "Delivered: {} packets ({} bytes)\n\
             Delivery failures: {} (alloc: {})\n\
             Errors reported: {}\n\
             Library: {} received, {} dropped ({:.2}%), {} if-dropped\n\
             Duration: {:.2}s\n\
             Rate: {:.2} pps, {:.2} KB/s",
            self.packets_delivered,
            self.bytes_delivered,
            self.delivery_failures,
            self.allocation_failures,
            self.errors_reported,
            self.packets_received,
            self.packets_dropped,
            self.drop_rate(),
            self.packets_if_dropped,
            self.duration.as_secs_f64(),
            self.packets_per_second,
            self.bytes_per_second / 1024.0
        )
    }
}

/// Thread-safe delivery counters shared with the capture thread
#[derive(Debug)]
pub struct StatsAccumulator {
    packets_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    allocation_failures: AtomicU64,
    errors_reported: AtomicU64,
    start_time: Instant,
}

impl StatsAccumulator {
    /// Create a new statistics accumulator
    pub fn new() -> Self {
        Self {
            packets_delivered: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            allocation_failures: AtomicU64::new(0),
            errors_reported: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a delivered packet message
    pub fn record_delivered(&self, size: usize) {
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Record a send the consumer refused
    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed buffer allocation
    pub fn record_allocation_failure(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered error message
    pub fn record_error(&self) {
        self.errors_reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> CaptureStats {
        let packets_delivered = self.packets_delivered.load(Ordering::Relaxed);
        let bytes_delivered = self.bytes_delivered.load(Ordering::Relaxed);
        let duration = self.start_time.elapsed();

        let secs = duration.as_secs_f64();
        let (packets_per_second, bytes_per_second) = if secs > 0.0 {
            (packets_delivered as f64 / secs, bytes_delivered as f64 / secs)
        } else {
            (0.0, 0.0)
        };

        CaptureStats {
            packets_delivered,
            bytes_delivered,
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            duration,
            packets_per_second,
            bytes_per_second,
            ..CaptureStats::default()
        }
    }

    /// Get packets delivered count
    pub fn packets_delivered(&self) -> u64 {
        self.packets_delivered.load(Ordering::Relaxed)
    }

    /// Get delivery failure count
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drop_rate() {
        let stats = CaptureStats::default().with_native(NativeStats {
            received: 100,
            dropped: 10,
            if_dropped: 0,
        });

        assert_eq!(stats.drop_rate(), 10.0);
        assert!(stats.has_significant_drops(5.0));
        assert!(!stats.has_significant_drops(15.0));
    }

    #[test]
    fn test_drop_rate_zero_packets() {
        let stats = CaptureStats::default();
        assert_eq!(stats.drop_rate(), 0.0);
        assert!(!stats.saw_backpressure());
    }

    #[test]
    fn test_stats_format() {
        let stats = CaptureStats {
            packets_delivered: 1000,
            bytes_delivered: 64000,
            delivery_failures: 3,
            packets_received: 1050,
            packets_dropped: 50,
            duration: Duration::from_secs(10),
            ..CaptureStats::default()
        };

        let formatted = stats.format();
        assert!(formatted.contains("1000"));
        assert!(formatted.contains("64000"));
        assert!(formatted.contains("1050"));
    }

    #[test]
    fn test_accumulator_counts() {
        let acc = StatsAccumulator::new();

        acc.record_delivered(64);
        acc.record_delivered(128);
        acc.record_delivery_failure();
        acc.record_allocation_failure();
        acc.record_error();

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.packets_delivered, 2);
        assert_eq!(snapshot.bytes_delivered, 192);
        assert_eq!(snapshot.delivery_failures, 1);
        assert_eq!(snapshot.allocation_failures, 1);
        assert_eq!(snapshot.errors_reported, 1);
        assert!(snapshot.saw_backpressure());
        assert_eq!(snapshot.packets_received, 0);
    }

    #[test]
    fn test_accumulator_thread_safety() {
        let acc = StatsAccumulator::new();

        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..100 {
                    acc.record_delivered(64);
                }
            });
            for _ in 0..100 {
                acc.record_delivered(64);
            }
        });

        assert_eq!(acc.packets_delivered(), 200);
        assert_eq!(acc.snapshot().bytes_delivered, 12800);
    }

    #[test]
    fn test_accumulator_rates() {
        let acc = StatsAccumulator::new();
        thread::sleep(Duration::from_millis(10));

        acc.record_delivered(1000);

        let snapshot = acc.snapshot();
        assert!(snapshot.packets_per_second > 0.0);
        assert!(snapshot.bytes_per_second > 0.0);
    }
}
