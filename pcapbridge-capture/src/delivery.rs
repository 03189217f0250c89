//! Turning captured frames and loop failures into consumer messages
//!
//! Both entry points run on the capture thread. They never block: a
//! consumer that is gone or has no free slot ends the capture loop.

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use pcapbridge_core::{CaptureFailure, CaptureMessage, CapturedPacket, Error, Timestamp};

use crate::driver::{FrameHeader, NativeSession};
use crate::session::Shared;

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Message handed to the consumer
    Sent,
    /// Session already closed; nothing sent
    Suppressed,
    /// Buffer allocation failed; break requested
    Exhausted,
    /// Consumer refused the message; break requested
    Failed,
}

/// Deliver one captured frame
pub(crate) fn deliver_packet(
    shared: &Shared,
    native: &dyn NativeSession,
    header: &FrameHeader,
    bytes: &[u8],
) -> Delivery {
    // Held across the send so close cannot complete in between
    let slot = shared.slot.read();
    if slot.native.is_none() {
        return Delivery::Suppressed;
    }

    let caplen = (header.caplen as usize).min(bytes.len());
    let Some(mut buf) = packet_buffer(caplen) else {
        let err = Error::ResourceExhausted(format!("{} byte packet buffer", caplen));
        warn!(token = %shared.token, error = %err, "Stopping capture");
        shared.stats.record_allocation_failure();
        native.request_break();
        return Delivery::Exhausted;
    };
    buf.extend_from_slice(&bytes[..caplen]);

    let message = CaptureMessage::Packet(CapturedPacket {
        token: shared.token,
        link_type: shared.link_type,
        timestamp: Timestamp::from_timeval(header.ts_sec, header.ts_usec),
        wire_len: header.len,
        data: Bytes::from(buf),
    });

    let outcome = send(shared, native, message);
    if outcome == Delivery::Sent {
        shared.stats.record_delivered(caplen);
    }
    outcome
}

/// Empty buffer with room for `len` bytes, or `None` if allocation fails
fn packet_buffer(len: usize) -> Option<Vec<u8>> {
    #[cfg(test)]
    {
        if tests::FAIL_ALLOCATION.with(|fail| fail.get()) {
            return None;
        }
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    Some(buf)
}

/// Deliver the diagnostic of a failed capture loop
pub(crate) fn deliver_error(shared: &Shared, native: &dyn NativeSession, message: String) -> Delivery {
    let slot = shared.slot.read();
    if slot.native.is_none() {
        return Delivery::Suppressed;
    }

    error!(token = %shared.token, error = %message, "Capture loop failed");
    let outcome = send(
        shared,
        native,
        CaptureMessage::Error(CaptureFailure {
            token: shared.token,
            message,
        }),
    );
    if outcome == Delivery::Sent {
        shared.stats.record_error();
    }
    outcome
}

fn send(shared: &Shared, native: &dyn NativeSession, message: CaptureMessage) -> Delivery {
    let err = match shared.consumer.try_send(message) {
        Ok(()) => return Delivery::Sent,
        Err(TrySendError::Full(_)) => Error::Delivery("consumer channel full".to_string()),
        Err(TrySendError::Closed(_)) => Error::Delivery("consumer went away".to_string()),
    };
    warn!(token = %shared.token, error = %err, "Stopping capture");
    shared.stats.record_delivery_failure();
    native.request_break();
    Delivery::Failed
}
