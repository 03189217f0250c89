//! Capture library seam
//!
//! The session layer talks to the packet-capture library only through
//! these traits. `PcapDriver` implements them on top of libpcap;
//! `MemoryDriver` implements them in-process.

use pcapbridge_core::{Error, Result};

use crate::config::CaptureConfig;

/// Per-frame metadata reported by the capture library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Capture time, seconds part
    pub ts_sec: i64,
    /// Capture time, microseconds part
    pub ts_usec: i64,
    /// Number of bytes captured
    pub caplen: u32,
    /// Length of the frame on the wire
    pub len: u32,
}

/// Why a blocking capture loop returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// A break was requested
    BreakRequested,
    /// The library reported an error
    Failed(String),
    /// Any other return code
    Other(i32),
}

/// Counters kept by the capture library
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeStats {
    /// Packets received by the filter
    pub received: u64,
    /// Packets dropped for lack of buffer space
    pub dropped: u64,
    /// Packets dropped by the interface or driver
    pub if_dropped: u64,
}

/// An open capture handle
///
/// Dropping the value closes the underlying library handle.
pub trait NativeSession: Send + Sync {
    /// Link-layer type (DLT_* value)
    fn link_type(&self) -> i32;

    /// Capture until a break is requested or the library fails,
    /// calling `on_frame` for every packet
    fn run_blocking(&self, on_frame: &mut dyn FnMut(&FrameHeader, &[u8])) -> LoopExit;

    /// Ask a running (or the next) `run_blocking` call to return
    ///
    /// Safe to call from any thread, including from inside `on_frame`.
    fn request_break(&self);

    /// Compile and install a BPF filter
    fn install_filter(&self, expression: &str, optimize: bool) -> std::result::Result<(), String>;

    /// Inject a raw frame
    fn send_raw(&self, bytes: &[u8]) -> std::result::Result<(), String>;

    /// Library capture counters
    fn stats(&self) -> std::result::Result<NativeStats, String>;
}

/// Factory for capture handles
pub trait CaptureDriver: Send + Sync {
    /// Open `device` for live capture
    fn open_live(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> std::result::Result<Box<dyn NativeSession>, String>;

    /// Name of the pseudo-device capturing on all interfaces, if any
    fn any_device(&self) -> Option<&'static str>;

    /// Name of the library's default capture device
    fn lookup_default_device(&self) -> std::result::Result<String, String>;
}

/// Look up the default capture device, keeping the library diagnostic
pub fn lookup_default_device<D: CaptureDriver + ?Sized>(driver: &D) -> Result<String> {
    driver.lookup_default_device().map_err(Error::Capture)
}
