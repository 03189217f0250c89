//! Messages delivered from a capture session to its consumer

use bytes::Bytes;

use crate::{CorrelationToken, LinkType, Timestamp};

/// A message handed to the consumer of a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMessage {
    /// A captured frame
    Packet(CapturedPacket),
    /// The capture loop failed and is about to terminate
    Error(CaptureFailure),
}

impl CaptureMessage {
    /// Token of the session that produced this message
    pub fn token(&self) -> CorrelationToken {
        match self {
            CaptureMessage::Packet(p) => p.token,
            CaptureMessage::Error(e) => e.token,
        }
    }

    /// Borrow the packet if this is a packet message
    pub fn as_packet(&self) -> Option<&CapturedPacket> {
        match self {
            CaptureMessage::Packet(p) => Some(p),
            CaptureMessage::Error(_) => None,
        }
    }
}

/// A captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Session that captured the frame
    pub token: CorrelationToken,
    /// Link-layer type of the session
    pub link_type: LinkType,
    /// Capture time
    pub timestamp: Timestamp,
    /// Length of the frame on the wire (may exceed `data.len()` if truncated)
    pub wire_len: u32,
    /// Captured bytes, at most the configured snapshot length
    pub data: Bytes,
}

impl CapturedPacket {
    /// Number of captured bytes
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }

    /// Whether the snapshot length cut the frame short
    pub fn is_truncated(&self) -> bool {
        (self.data.len() as u64) < u64::from(self.wire_len)
    }
}

/// Diagnostic emitted when the capture loop fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    /// Session whose loop failed
    pub token: CorrelationToken,
    /// Library diagnostic
    pub message: String,
}
