//! Common types used throughout pcapbridge

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Seconds per "megasecond" in the decomposed timestamp
const MEGA: u64 = 1_000_000;

/// Opaque per-session identifier carried by every delivered message
///
/// Tokens are UUID v7, so they sort by session open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Generate a fresh token
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationToken {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::invalid_argument(format!("bad correlation token: {}", e)))
    }
}

/// Link-layer header type reported by the capture library (DLT_* value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkType(pub i32);

impl LinkType {
    /// BSD loopback encapsulation
    pub const NULL: LinkType = LinkType(0);
    /// Ethernet (10Mb, 100Mb, 1000Mb and up)
    pub const ETHERNET: LinkType = LinkType(1);
    /// Raw IP
    pub const RAW: LinkType = LinkType(101);
    /// Linux "cooked" capture, used by the "any" device
    pub const LINUX_SLL: LinkType = LinkType(113);

    /// Short name for well-known link types
    pub fn name(&self) -> Option<&'static str> {
        match self.0 {
            0 => Some("NULL"),
            1 => Some("EN10MB"),
            101 => Some("RAW"),
            113 => Some("LINUX_SLL"),
            _ => None,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "DLT {}", self.0),
        }
    }
}

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Native resource live, no runner
    Open,
    /// Runner thread started
    Running,
    /// Close requested, native resource being torn down
    Closing,
    /// Terminal; native resource released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Open => "open",
            SessionState::Running => "running",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Capture timestamp split into megaseconds, seconds and microseconds
///
/// `megaseconds` and `seconds` are taken from the magnitude of the raw
/// seconds value; `before_epoch` carries its sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub megaseconds: u64,
    pub seconds: u64,
    pub microseconds: u64,
    pub before_epoch: bool,
}

impl Timestamp {
    /// Decompose a `struct timeval` style timestamp
    pub fn from_timeval(tv_sec: i64, tv_usec: i64) -> Self {
        let magnitude = tv_sec.unsigned_abs();
        Self {
            megaseconds: magnitude / MEGA,
            seconds: magnitude % MEGA,
            microseconds: tv_usec.unsigned_abs(),
            before_epoch: tv_sec < 0,
        }
    }

    /// Decompose a wall-clock time
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::from_timeval(d.as_secs() as i64, i64::from(d.subsec_micros())),
            Err(e) => {
                // timeval keeps tv_usec non-negative, so borrow a second
                let d = e.duration();
                let secs = d.as_secs() as i64;
                match i64::from(d.subsec_micros()) {
                    0 => Self::from_timeval(-secs, 0),
                    micros => Self::from_timeval(-(secs + 1), 1_000_000 - micros),
                }
            }
        }
    }

    /// Reassemble the raw seconds value, saturating at the `i64` range
    pub fn as_secs(&self) -> i64 {
        let magnitude = self
            .megaseconds
            .saturating_mul(MEGA)
            .saturating_add(self.seconds);
        if self.before_epoch {
            0i64.saturating_sub_unsigned(magnitude)
        } else {
            i64::try_from(magnitude).unwrap_or(i64::MAX)
        }
    }

    /// Convert back to wall-clock time
    ///
    /// `None` if the instant is outside what `SystemTime` can represent.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let secs = self.megaseconds.checked_mul(MEGA)?.checked_add(self.seconds)?;
        let offset = Duration::from_secs(secs);
        let micros = Duration::from_micros(self.microseconds);
        let whole = if self.before_epoch {
            UNIX_EPOCH.checked_sub(offset)?
        } else {
            UNIX_EPOCH.checked_add(offset)?
        };
        whole.checked_add(micros)
    }
}
