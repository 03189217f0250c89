//! Subcommand handlers

use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::{info, warn};

use pcapbridge_capture::{
    list_interfaces, lookup_default_device, CaptureDriver, CaptureStats, PcapDriver, Session,
};
use pcapbridge_core::{CaptureMessage, CapturedPacket, Error, Result};

use crate::args::CaptureArgs;

/// Kernel drop rate above which a capture ends with a warning
const DROP_WARN_PERCENT: f64 = 1.0;

/// Print every interface, marking the ones that can be captured on
pub fn interfaces() -> Result<()> {
    let interfaces = list_interfaces()?;
    if interfaces.is_empty() {
        println!("No interfaces found");
        return Ok(());
    }

    for iface in interfaces {
        let marker = if iface.is_capture_capable() { '*' } else { ' ' };
        println!("{} {}", marker, iface);
        if !iface.description.is_empty() {
            println!("    {}", iface.description);
        }
    }
    Ok(())
}

/// Print the library's default device
pub fn lookup<D: CaptureDriver + ?Sized>(driver: &D) -> Result<()> {
    println!("{}", lookup_default_device(driver)?);
    Ok(())
}

/// Capture until the packet count, time limit or Ctrl-C is reached
pub async fn capture<D: CaptureDriver + ?Sized>(driver: &D, args: &CaptureArgs) -> Result<CaptureStats> {
    let (session, mut rx) = Session::open_channel(driver, args.to_config())?;
    if let Some(filter) = &args.filter {
        session.set_filter(filter, true)?;
    }
    session.start()?;

    eprintln!(
        "Capturing on {} ({}), snaplen {}",
        session.device(),
        session.link_type(),
        args.snaplen
    );

    let limit = args.time_limit().unwrap_or(Duration::MAX);
    let deadline = tokio::time::sleep(limit.min(Duration::from_secs(u32::MAX as u64)));
    tokio::pin!(deadline);

    let mut seen = 0u64;
    let outcome = loop {
        if args.count.is_some_and(|count| seen >= count) {
            break Ok(());
        }
        tokio::select! {
            message = rx.recv() => match message {
                Some(CaptureMessage::Packet(packet)) => {
                    seen += 1;
                    println!("{}", format_packet(&packet, args.hex));
                }
                Some(CaptureMessage::Error(failure)) => {
                    break Err(Error::capture(failure.message));
                }
                None => break Ok(()),
            },
            _ = &mut deadline => {
                info!("Time limit reached");
                break Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
        }
    };

    // Library counters are only readable while the handle is live. The
    // session refuses the read rather than block on a loop with no
    // read timeout.
    let stats = match session.capture_stats() {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Library statistics unavailable");
            session.stats()
        }
    };
    if stats.has_significant_drops(DROP_WARN_PERCENT) {
        warn!(drop_rate = stats.drop_rate(), "Kernel dropped packets");
    }

    close_session(session).await?;
    outcome.map(|()| stats)
}

/// Close on the blocking pool, since close waits for the capture thread
async fn close_session(session: Session) -> Result<()> {
    tokio::task::spawn_blocking(move || session.close())
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Write one frame given as hex
pub fn send<D: CaptureDriver + ?Sized>(driver: &D, interface: Option<&str>, frame: &str) -> Result<()> {
    let bytes = hex::decode(frame.trim())
        .map_err(|e| Error::invalid_argument(format!("frame is not valid hex: {}", e)))?;
    if bytes.is_empty() {
        return Err(Error::invalid_argument("frame is empty"));
    }

    let mut config = pcapbridge_capture::CaptureConfig::default();
    if let Some(interface) = interface {
        config = config.with_device(interface);
    }

    let (session, _rx) = Session::open_channel(driver, config)?;
    let sent = session.send(&bytes);
    session.close()?;
    sent?;

    eprintln!("Sent {} bytes on {}", bytes.len(), session.device());
    Ok(())
}

/// One summary line per packet, optionally followed by a hex dump
pub fn format_packet(packet: &CapturedPacket, with_hex: bool) -> String {
    let time = match packet.timestamp.to_system_time() {
        Some(time) => DateTime::<Local>::from(time).format("%H:%M:%S%.6f").to_string(),
        None => format!("{}.{:06}", packet.timestamp.as_secs(), packet.timestamp.microseconds),
    };
    let mut line = format!(
        "{} {} len {} caplen {}",
        time,
        packet.token,
        packet.wire_len,
        packet.captured_len()
    );
    if packet.is_truncated() {
        line.push_str(" (truncated)");
    }
    if with_hex {
        for chunk in packet.data.chunks(16) {
            line.push_str("\n    ");
            line.push_str(&hex::encode(chunk));
        }
    }
    line
}

/// Driver used by the binary
pub fn default_driver() -> PcapDriver {
    PcapDriver::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Commands};
    use clap::Parser;
    use pcapbridge_capture::MemoryDriver;

    fn capture_args(extra: &[&str]) -> CaptureArgs {
        let mut argv = vec!["pcapbridge", "capture"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Capture(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capture_stops_at_count() {
        let driver = MemoryDriver::new();
        let args = capture_args(&["-c", "2", "-s", "4"]);

        let feeder = driver.clone();
        let injector = tokio::spawn(async move {
            // Wait for the session to open before feeding it
            while feeder.run_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            for _ in 0..2 {
                feeder.inject(&[1, 2, 3, 4, 5, 6]);
            }
        });

        let stats = capture(&driver, &args).await.unwrap();
        injector.await.unwrap();

        assert_eq!(stats.packets_delivered, 2);
        assert_eq!(stats.bytes_delivered, 8);
        assert_eq!(driver.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_capture_reports_failure() {
        let driver = MemoryDriver::new();
        let args = capture_args(&[]);

        let feeder = driver.clone();
        tokio::spawn(async move {
            while feeder.run_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            feeder.inject_failure("The interface went down");
        });

        let err = capture(&driver, &args).await.unwrap_err();
        assert_eq!(err.diagnostic(), Some("The interface went down"));
        assert_eq!(driver.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_capture_without_read_timeout_finishes() {
        let driver = MemoryDriver::new();
        let args = capture_args(&["-t", "0", "-c", "1"]);

        let feeder = driver.clone();
        tokio::spawn(async move {
            while feeder.run_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            feeder.inject(b"frame");
        });

        // The loop is still inside its read when the count is reached, so
        // the library counters are skipped and only delivery counts remain
        let stats = tokio::time::timeout(Duration::from_secs(5), capture(&driver, &args))
            .await
            .expect("capture did not finish")
            .unwrap();
        assert_eq!(stats.packets_delivered, 1);
        assert_eq!(stats.packets_received, 0);
        assert_eq!(driver.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_capture_time_limit() {
        let driver = MemoryDriver::new();
        let args = capture_args(&["-d", "0"]);
        let stats = capture(&driver, &args).await.unwrap();
        assert_eq!(stats.packets_delivered, 0);
    }

    #[test]
    fn test_send_hex_frame() {
        let driver = MemoryDriver::new();
        send(&driver, Some("mem0"), "ffffffffffff0011").unwrap();
        assert_eq!(
            driver.sent_frames(),
            vec![vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x11]]
        );
        assert_eq!(driver.closed_count(), 1);
    }

    #[test]
    fn test_send_rejects_bad_hex() {
        let driver = MemoryDriver::new();
        assert!(send(&driver, None, "zz").is_err());
        assert!(send(&driver, None, "").is_err());
        assert_eq!(driver.opened_count(), 0);
    }

    #[test]
    fn test_lookup() {
        assert!(lookup(&MemoryDriver::new()).is_ok());
    }

    #[test]
    fn test_format_packet() {
        use bytes::Bytes;
        use pcapbridge_core::{CorrelationToken, LinkType, Timestamp};

        let packet = CapturedPacket {
            token: CorrelationToken::new(),
            link_type: LinkType::ETHERNET,
            timestamp: Timestamp::from_timeval(1_700_000_000, 42),
            wire_len: 20,
            data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        };

        let line = format_packet(&packet, false);
        assert!(line.contains("len 20 caplen 4 (truncated)"));
        assert!(!line.contains("deadbeef"));

        let dump = format_packet(&packet, true);
        assert!(dump.ends_with("\n    deadbeef"));
    }
}
