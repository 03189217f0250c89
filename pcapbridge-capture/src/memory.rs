//! In-process capture driver
//!
//! `MemoryDriver` behaves like a loopback link that only carries the
//! frames injected through it. Every session opened from a driver sees
//! every injected frame, truncated to its own snapshot length the way
//! libpcap truncates. It needs no privileges, which makes it suitable
//! for exercising consumers in tests.

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use pcapbridge_core::{LinkType, Timestamp};

use crate::config::CaptureConfig;
use crate::driver::{CaptureDriver, FrameHeader, LoopExit, NativeSession, NativeStats};

/// Device name reported by `lookup_default_device`
pub const MEMORY_DEVICE: &str = "mem0";

#[derive(Debug, Clone)]
enum Event {
    Frame { ts_sec: i64, ts_usec: i64, data: Arc<[u8]> },
    Fail(String),
    Exit(i32),
}

#[derive(Debug, Default)]
struct DriverState {
    feeds: Mutex<Vec<Sender<Event>>>,
    open_error: Mutex<Option<String>>,
    filter_error: Mutex<Option<String>>,
    sent: Mutex<Vec<Vec<u8>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    runs: AtomicUsize,
}

/// In-process capture driver
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    link_type: LinkType,
    any_device: Option<&'static str>,
    state: Arc<DriverState>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Create a driver producing Ethernet frames
    pub fn new() -> Self {
        Self::with_link_type(LinkType::ETHERNET)
    }

    /// Create a driver reporting the given link type
    pub fn with_link_type(link_type: LinkType) -> Self {
        Self {
            link_type,
            any_device: Some("any"),
            state: Arc::new(DriverState::default()),
        }
    }

    /// Behave like a platform without an "any" capture device
    pub fn without_any_device(mut self) -> Self {
        self.any_device = None;
        self
    }

    /// Inject a frame stamped with the current time
    ///
    /// Returns the number of open sessions that received it.
    pub fn inject(&self, data: &[u8]) -> usize {
        let ts = Timestamp::from_system_time(SystemTime::now());
        self.inject_at(ts.as_secs(), ts.microseconds as i64, data)
    }

    /// Inject a frame with an explicit capture time
    pub fn inject_at(&self, ts_sec: i64, ts_usec: i64, data: &[u8]) -> usize {
        self.broadcast(Event::Frame {
            ts_sec,
            ts_usec,
            data: Arc::from(data),
        })
    }

    /// Make every running capture loop fail with `message`
    pub fn inject_failure<S: Into<String>>(&self, message: S) -> usize {
        self.broadcast(Event::Fail(message.into()))
    }

    /// Make every running capture loop return an unexpected code
    pub fn inject_exit(&self, code: i32) -> usize {
        self.broadcast(Event::Exit(code))
    }

    /// Fail the next `open_live` with `message`
    pub fn fail_next_open<S: Into<String>>(&self, message: S) {
        *self.state.open_error.lock() = Some(message.into());
    }

    /// Reject every filter with `message`; `None` accepts filters again
    pub fn reject_filters(&self, message: Option<String>) {
        *self.state.filter_error.lock() = message;
    }

    /// Frames written with `send_raw`, oldest first
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().clone()
    }

    /// Number of handles opened
    pub fn opened_count(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of handles closed
    pub fn closed_count(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of times a capture loop was entered
    pub fn run_count(&self) -> usize {
        self.state.runs.load(Ordering::SeqCst)
    }

    fn broadcast(&self, event: Event) -> usize {
        let mut feeds = self.state.feeds.lock();
        feeds.retain(|feed| feed.send(event.clone()).is_ok());
        feeds.len()
    }
}

impl CaptureDriver for MemoryDriver {
    fn open_live(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn NativeSession>, String> {
        if let Some(message) = self.state.open_error.lock().take() {
            return Err(message);
        }

        let (tx, rx) = unbounded();
        let (break_tx, break_rx) = crossbeam_channel::bounded(1);
        self.state.feeds.lock().push(tx);
        self.state.opened.fetch_add(1, Ordering::SeqCst);

        debug!(device = %device, "Opened in-memory capture handle");

        Ok(Box::new(MemorySession {
            events: rx,
            break_tx,
            break_rx,
            snaplen: config.snaplen.max(0) as usize,
            link_type: self.link_type.0,
            received: AtomicU64::new(0),
            driver: Arc::clone(&self.state),
        }))
    }

    fn any_device(&self) -> Option<&'static str> {
        self.any_device
    }

    fn lookup_default_device(&self) -> Result<String, String> {
        Ok(MEMORY_DEVICE.to_string())
    }
}

/// Capture handle opened from a `MemoryDriver`
pub struct MemorySession {
    events: Receiver<Event>,
    break_tx: Sender<()>,
    break_rx: Receiver<()>,
    snaplen: usize,
    link_type: i32,
    received: AtomicU64,
    driver: Arc<DriverState>,
}

impl NativeSession for MemorySession {
    fn link_type(&self) -> i32 {
        self.link_type
    }

    fn run_blocking(&self, on_frame: &mut dyn FnMut(&FrameHeader, &[u8])) -> LoopExit {
        self.driver.runs.fetch_add(1, Ordering::SeqCst);
        loop {
            // A pending break wins over queued frames, as in libpcap
            if self.break_rx.try_recv().is_ok() {
                return LoopExit::BreakRequested;
            }
            select! {
                recv(self.break_rx) -> _ => return LoopExit::BreakRequested,
                recv(self.events) -> event => match event {
                    Ok(Event::Frame { ts_sec, ts_usec, data }) => {
                        let caplen = data.len().min(self.snaplen);
                        let header = FrameHeader {
                            ts_sec,
                            ts_usec,
                            caplen: caplen as u32,
                            len: data.len() as u32,
                        };
                        self.received.fetch_add(1, Ordering::Relaxed);
                        on_frame(&header, &data[..caplen]);
                    }
                    Ok(Event::Fail(message)) => return LoopExit::Failed(message),
                    Ok(Event::Exit(code)) => return LoopExit::Other(code),
                    Err(_) => return LoopExit::Other(0),
                },
            }
        }
    }

    fn request_break(&self) {
        // A pending break is already enough
        let _ = self.break_tx.try_send(());
    }

    fn install_filter(&self, _expression: &str, _optimize: bool) -> Result<(), String> {
        match self.driver.filter_error.lock().as_ref() {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<(), String> {
        self.driver.sent.lock().push(bytes.to_vec());
        Ok(())
    }

    fn stats(&self) -> Result<NativeStats, String> {
        Ok(NativeStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: 0,
            if_dropped: 0,
        })
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.driver.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(driver: &MemoryDriver, snaplen: i32) -> Box<dyn NativeSession> {
        let config = CaptureConfig::default().with_snaplen(snaplen);
        driver.open_live("any", &config).unwrap()
    }

    #[test]
    fn test_truncates_to_snaplen() {
        let driver = MemoryDriver::new();
        let session = open(&driver, 64);

        assert_eq!(driver.inject_at(10, 20, &[0xab; 128]), 1);
        driver.inject_exit(0);

        let mut seen = Vec::new();
        let exit = session.run_blocking(&mut |header, bytes| {
            seen.push((*header, bytes.len()));
        });

        assert_eq!(exit, LoopExit::Other(0));
        assert_eq!(seen.len(), 1);
        let (header, captured) = seen[0];
        assert_eq!(header.caplen, 64);
        assert_eq!(header.len, 128);
        assert_eq!(header.ts_sec, 10);
        assert_eq!(header.ts_usec, 20);
        assert_eq!(captured, 64);
    }

    #[test]
    fn test_break_from_callback() {
        let driver = MemoryDriver::new();
        let session = open(&driver, 1500);

        driver.inject(b"first");
        driver.inject(b"second");

        let mut count = 0;
        let exit = session.run_blocking(&mut |_, _| {
            count += 1;
            session.request_break();
        });

        assert_eq!(exit, LoopExit::BreakRequested);
        assert!(count >= 1);
        assert_eq!(driver.run_count(), 1);
    }

    #[test]
    fn test_failure_event() {
        let driver = MemoryDriver::new();
        let session = open(&driver, 1500);

        driver.inject_failure("The interface went down");
        let exit = session.run_blocking(&mut |_, _| {});
        assert_eq!(exit, LoopExit::Failed("The interface went down".to_string()));
    }

    #[test]
    fn test_scripted_errors() {
        let driver = MemoryDriver::new();
        driver.fail_next_open("eth9: No such device exists");
        let err = driver
            .open_live("eth9", &CaptureConfig::default())
            .err()
            .unwrap();
        assert_eq!(err, "eth9: No such device exists");

        let session = open(&driver, 1500);
        driver.reject_filters(Some("syntax error".to_string()));
        assert_eq!(
            session.install_filter("tcp port", true),
            Err("syntax error".to_string())
        );
        driver.reject_filters(None);
        assert!(session.install_filter("tcp port 80", true).is_ok());
    }

    #[test]
    fn test_send_raw_and_close_accounting() {
        let driver = MemoryDriver::new();
        let session = open(&driver, 1500);

        session.send_raw(&[1, 2, 3]).unwrap();
        assert_eq!(driver.sent_frames(), vec![vec![1, 2, 3]]);

        assert_eq!(driver.opened_count(), 1);
        assert_eq!(driver.closed_count(), 0);
        drop(session);
        assert_eq!(driver.closed_count(), 1);

        // Closed sessions stop receiving frames
        assert_eq!(driver.inject(b"late"), 0);
    }
}
