//! Live packet capture delivered as async messages
//!
//! This crate bridges libpcap's blocking, callback-driven capture loop
//! to a `tokio` consumer. Each started session runs its loop on a
//! dedicated thread and hands every frame to a bounded channel as a
//! [`CaptureMessage`]; a consumer that falls behind or goes away stops
//! the loop instead of stalling it.
//!
//! ## Features
//!
//! - **Sessions**: open, start, filter, send and close with a checked lifecycle
//! - **Non-blocking delivery**: backpressure ends the capture loop
//! - **Safe shutdown**: close breaks the loop and waits for the thread before releasing the handle
//! - **Drivers**: libpcap through [`PcapDriver`], in-process through [`MemoryDriver`]
//! - **Statistics**: delivery counters merged with library counters
//!
//! ## Example
//!
//! ```no_run
//! use pcapbridge_capture::{CaptureConfig, PcapDriver, Session};
//! use pcapbridge_core::CaptureMessage;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::for_device("eth0").with_snaplen(256);
//! let (session, mut rx) = Session::open_channel(&PcapDriver::new(), config)?;
//! session.set_filter("tcp port 443", true)?;
//! session.start()?;
//!
//! while let Some(message) = rx.recv().await {
//!     match message {
//!         CaptureMessage::Packet(p) => println!("{} bytes", p.wire_len),
//!         CaptureMessage::Error(e) => {
//!             eprintln!("capture failed: {}", e.message);
//!             break;
//!         }
//!     }
//! }
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod interface;
pub mod memory;
pub mod pcap_driver;
pub mod registry;
pub mod session;
pub mod stats;

mod delivery;
mod runner;

// Re-export main types
pub use config::CaptureConfig;
pub use driver::{lookup_default_device, CaptureDriver, FrameHeader, LoopExit, NativeSession, NativeStats};
pub use interface::{default_interface, get_interface, list_interfaces, InterfaceInfo};
pub use memory::MemoryDriver;
pub use pcap_driver::PcapDriver;
pub use pcapbridge_core::CaptureMessage;
pub use registry::SessionRegistry;
pub use session::Session;
pub use stats::{CaptureStats, StatsAccumulator};
