//! pcapbridge core library
//!
//! Error taxonomy, identifiers and the message types a capture session
//! delivers to its consumer.

pub mod error;
pub mod message;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{CaptureFailure, CaptureMessage, CapturedPacket};
pub use types::*;
