//! Example: Several sessions feeding one consumer
//!
//! Uses the in-process driver, so no privileges are needed. Each
//! message carries the token of the session that produced it.
//!
//! Run with: cargo run --example shared_consumer

use std::collections::HashMap;

use pcapbridge_capture::{CaptureConfig, MemoryDriver, Session};
use pcapbridge_core::CaptureMessage;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let driver = MemoryDriver::new();
    let (tx, mut rx) = mpsc::channel(32);

    let small = Session::open(&driver, CaptureConfig::default().with_snaplen(16), tx.clone())?;
    let large = Session::open(&driver, CaptureConfig::default(), tx)?;
    small.start()?;
    large.start()?;

    let names = HashMap::from([(small.token(), "small"), (large.token(), "large")]);

    for size in [8usize, 64, 512] {
        driver.inject(&vec![0xaa; size]);
    }

    for _ in 0..6 {
        if let Some(CaptureMessage::Packet(packet)) = rx.recv().await {
            println!(
                "{:>5}: {:>3} of {:>3} bytes",
                names[&packet.token],
                packet.captured_len(),
                packet.wire_len
            );
        }
    }

    tokio::task::spawn_blocking(move || -> pcapbridge_core::Result<()> {
        small.close()?;
        large.close()
    })
    .await??;
    Ok(())
}
