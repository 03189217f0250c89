//! Capture session configuration

use std::time::Duration;

use pcapbridge_core::{Error, Result};

/// Default snapshot length (maximum bytes per packet)
pub const DEFAULT_SNAPLEN: i32 = 65535;

/// Default read timeout handed to the capture library (milliseconds)
pub const DEFAULT_TIMEOUT_MS: i32 = 1000;

/// Default capacity of the consumer channel created by `Session::open_channel`
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time `close` waits for the capture thread to acknowledge a break
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device to open; `None` selects the driver's "any" device
    pub device: Option<String>,
    /// Maximum bytes to capture per packet
    pub snaplen: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Read timeout in milliseconds (0 = block until a packet arrives,
    /// which makes library calls on a running session fail fast)
    pub timeout_ms: i32,
    /// Deliver packets as soon as they arrive instead of buffering
    pub immediate_mode: bool,
    /// Kernel buffer size (0 = library default)
    pub buffer_size: i32,
    /// Capacity of the consumer channel
    pub channel_capacity: usize,
    /// How long `close` waits for the capture thread to exit
    pub close_grace: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            immediate_mode: true,
            buffer_size: 0,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl CaptureConfig {
    /// Configuration for a named device with defaults for everything else
    pub fn for_device<S: Into<String>>(device: S) -> Self {
        Self::default().with_device(device)
    }

    /// Set the device
    pub fn with_device<S: Into<String>>(mut self, device: S) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Set the snapshot length
    pub fn with_snaplen(mut self, snaplen: i32) -> Self {
        self.snaplen = snaplen;
        self
    }

    /// Enable or disable promiscuous mode
    pub fn with_promiscuous(mut self, enable: bool) -> Self {
        self.promiscuous = enable;
        self
    }

    /// Set the read timeout
    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable immediate mode
    pub fn with_immediate_mode(mut self, enable: bool) -> Self {
        self.immediate_mode = enable;
        self
    }

    /// Set the kernel buffer size
    pub fn with_buffer_size(mut self, size: i32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the consumer channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the close grace period
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Check the configuration before it reaches the capture library
    pub fn validate(&self) -> Result<()> {
        if self.snaplen <= 0 {
            return Err(Error::invalid_argument(format!(
                "snaplen must be positive, got {}",
                self.snaplen
            )));
        }
        if self.timeout_ms < 0 {
            return Err(Error::invalid_argument(format!(
                "timeout must not be negative, got {}ms",
                self.timeout_ms
            )));
        }
        if self.buffer_size < 0 {
            return Err(Error::invalid_argument(format!(
                "buffer size must not be negative, got {}",
                self.buffer_size
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::invalid_argument("channel capacity must be at least 1"));
        }
        if let Some(device) = &self.device {
            if device.contains('\0') {
                return Err(Error::invalid_argument(format!(
                    "device name {:?} contains a NUL byte",
                    device
                )));
            }
        }
        Ok(())
    }
}
