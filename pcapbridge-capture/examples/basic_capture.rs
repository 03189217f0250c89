//! Example: Basic packet capture
//!
//! Captures on the default interface and prints each packet as it
//! arrives on the async channel.
//! Note: Requires root/administrator privileges to run.
//!
//! Run with: sudo cargo run --example basic_capture

use std::time::Duration;

use pcapbridge_capture::{default_interface, CaptureConfig, PcapDriver, Session};
use pcapbridge_core::CaptureMessage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let iface = default_interface()?;
    println!("Capturing on: {}", iface);

    let config = CaptureConfig::for_device(iface.name.as_str()).with_channel_capacity(64);
    let (session, mut rx) = Session::open_channel(&PcapDriver::new(), config)?;
    session.start()?;

    println!("Starting packet capture... (will capture 20 packets)");
    println!();

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    let mut count = 0;
    while count < 20 {
        tokio::select! {
            message = rx.recv() => match message {
                Some(CaptureMessage::Packet(packet)) => {
                    count += 1;
                    println!(
                        "[{}] {} bytes captured of {} on the wire ({})",
                        count,
                        packet.captured_len(),
                        packet.wire_len,
                        packet.link_type
                    );
                }
                Some(CaptureMessage::Error(failure)) => {
                    println!("Capture failed: {}", failure.message);
                    break;
                }
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    // close waits for the capture thread, so keep it off the async workers
    let closing = session.clone();
    tokio::task::spawn_blocking(move || closing.close()).await??;

    println!("\n=== Final Statistics ===");
    println!("{}", session.stats().format());

    Ok(())
}
