//! libpcap driver built on the `pcap` crate

use parking_lot::Mutex;
use pcap::{Active, BreakLoop, Capture, Device};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::driver::{CaptureDriver, FrameHeader, LoopExit, NativeSession, NativeStats};

/// Driver for live capture through libpcap
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapDriver;

impl PcapDriver {
    /// Create a new libpcap driver
    pub fn new() -> Self {
        Self
    }
}

/// Keep the library's own text for `PcapError`, render everything else
fn diagnostic(err: pcap::Error) -> String {
    match err {
        pcap::Error::PcapError(text) => text,
        other => other.to_string(),
    }
}

impl CaptureDriver for PcapDriver {
    fn open_live(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn NativeSession>, String> {
        debug!(device = %device, snaplen = config.snaplen, "Opening pcap handle");

        let mut inactive = Capture::from_device(device)
            .map_err(diagnostic)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .immediate_mode(config.immediate_mode);

        if config.buffer_size > 0 {
            inactive = inactive.buffer_size(config.buffer_size);
        }

        let mut capture = inactive.open().map_err(diagnostic)?;
        let breaker = capture.breakloop_handle();
        let link_type = capture.get_datalink().0;

        info!(device = %device, link_type, "pcap handle opened");

        Ok(Box::new(PcapSession {
            capture: Mutex::new(capture),
            breaker,
            break_requested: AtomicBool::new(false),
            link_type,
        }))
    }

    fn any_device(&self) -> Option<&'static str> {
        if cfg!(target_os = "linux") {
            Some("any")
        } else {
            None
        }
    }

    fn lookup_default_device(&self) -> Result<String, String> {
        match Device::lookup() {
            Ok(Some(device)) => Ok(device.name),
            Ok(None) => Err("no suitable capture device found".to_string()),
            Err(e) => Err(diagnostic(e)),
        }
    }
}

/// An open libpcap handle
///
/// The capture thread holds the handle lock for one read at a time, so
/// filter installs and raw sends issued while the loop runs wait at
/// most one read timeout.
pub struct PcapSession {
    capture: Mutex<Capture<Active>>,
    breaker: BreakLoop,
    break_requested: AtomicBool,
    link_type: i32,
}

impl NativeSession for PcapSession {
    fn link_type(&self) -> i32 {
        self.link_type
    }

    fn run_blocking(&self, on_frame: &mut dyn FnMut(&FrameHeader, &[u8])) -> LoopExit {
        loop {
            // pcap_breakloop clears its flag once honoured; mirror that here
            if self.break_requested.swap(false, Ordering::AcqRel) {
                return LoopExit::BreakRequested;
            }

            let mut capture = self.capture.lock();
            match capture.next_packet() {
                Ok(packet) => {
                    let header = FrameHeader {
                        ts_sec: packet.header.ts.tv_sec as i64,
                        ts_usec: packet.header.ts.tv_usec as i64,
                        caplen: packet.header.caplen,
                        len: packet.header.len,
                    };
                    on_frame(&header, packet.data);
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => {
                    self.break_requested.store(false, Ordering::Release);
                    return LoopExit::BreakRequested;
                }
                Err(e) => return LoopExit::Failed(diagnostic(e)),
            }
        }
    }

    fn request_break(&self) {
        self.break_requested.store(true, Ordering::Release);
        self.breaker.breakloop();
    }

    fn install_filter(&self, expression: &str, optimize: bool) -> Result<(), String> {
        self.capture
            .lock()
            .filter(expression, optimize)
            .map_err(diagnostic)
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<(), String> {
        self.capture.lock().sendpacket(bytes).map_err(diagnostic)
    }

    fn stats(&self) -> Result<NativeStats, String> {
        let stat = self.capture.lock().stats().map_err(diagnostic)?;
        Ok(NativeStats {
            received: u64::from(stat.received),
            dropped: u64::from(stat.dropped),
            if_dropped: u64::from(stat.if_dropped),
        })
    }
}

impl Drop for PcapSession {
    fn drop(&mut self) {
        debug!(link_type = self.link_type, "Closing pcap handle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_loopback() -> Option<Box<dyn NativeSession>> {
        let driver = PcapDriver::new();
        let config = CaptureConfig::default().with_timeout_ms(100);
        ["lo", "lo0", "\\Device\\NPF_Loopback"]
            .iter()
            .find_map(|name| driver.open_live(name, &config).ok())
    }

    #[test]
    fn test_diagnostic_keeps_library_text() {
        let err = pcap::Error::PcapError("socket: Operation not permitted".to_string());
        assert_eq!(diagnostic(err), "socket: Operation not permitted");
    }

    #[test]
    fn test_any_device() {
        let driver = PcapDriver::new();
        if cfg!(target_os = "linux") {
            assert_eq!(driver.any_device(), Some("any"));
        } else {
            assert_eq!(driver.any_device(), None);
        }
    }

    #[test]
    fn test_open_nonexistent_device() {
        let driver = PcapDriver::new();
        let result = driver.open_live("nonexistent_interface_xyz", &CaptureConfig::default());
        match result {
            Ok(_) => panic!("opening a bogus device should fail"),
            Err(text) => assert!(!text.is_empty()),
        }
    }

    #[test]
    fn test_break_before_loop() {
        // Needs capture privileges; skip quietly without them
        let Some(session) = open_loopback() else {
            println!("Could not open loopback (may need privileges)");
            return;
        };

        session.request_break();
        let exit = session.run_blocking(&mut |_, _| {});
        assert_eq!(exit, LoopExit::BreakRequested);
    }

    #[test]
    fn test_invalid_filter() {
        let Some(session) = open_loopback() else {
            println!("Could not open loopback (may need privileges)");
            return;
        };

        let result = session.install_filter("invalid filter syntax !!!", true);
        assert!(result.is_err());
        assert!(session.install_filter("tcp", true).is_ok());
    }
}
