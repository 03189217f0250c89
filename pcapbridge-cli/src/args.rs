//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::time::Duration;

use pcapbridge_capture::config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_SNAPLEN, DEFAULT_TIMEOUT_MS};
use pcapbridge_capture::CaptureConfig;

#[derive(Parser, Debug)]
#[command(name = "pcapbridge")]
#[command(version, about = "Live packet capture delivered to an async consumer", long_about = None)]
pub struct Cli {
    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available network interfaces
    Interfaces,

    /// Print the capture library's default device
    Lookup,

    /// Capture packets and print one line per packet
    Capture(CaptureArgs),

    /// Write a raw frame to an interface
    Send {
        /// Network interface name
        #[arg(short, long, env = "PCAPBRIDGE_INTERFACE")]
        interface: Option<String>,

        /// Frame bytes as hex, link-layer header included
        #[arg(value_name = "HEX")]
        frame: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Network interface name (defaults to the "any" device where supported)
    #[arg(short, long, env = "PCAPBRIDGE_INTERFACE")]
    pub interface: Option<String>,

    /// Snapshot length in bytes
    #[arg(short, long, env = "PCAPBRIDGE_SNAPLEN", default_value_t = DEFAULT_SNAPLEN)]
    pub snaplen: i32,

    /// Do not put the interface into promiscuous mode
    #[arg(long)]
    pub no_promisc: bool,

    /// Read timeout in milliseconds
    #[arg(short, long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: i32,

    /// BPF filter expression
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Stop after this many packets
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECONDS")]
    pub duration: Option<u64>,

    /// Delivery channel capacity
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub capacity: usize,

    /// Print captured bytes as hex
    #[arg(short = 'x', long)]
    pub hex: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default log directive for the verbosity level
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl CaptureArgs {
    /// Build the capture configuration these flags describe
    pub fn to_config(&self) -> CaptureConfig {
        let mut config = CaptureConfig::default()
            .with_snaplen(self.snaplen)
            .with_promiscuous(!self.no_promisc)
            .with_timeout_ms(self.timeout)
            .with_channel_capacity(self.capacity);
        if let Some(interface) = &self.interface {
            config = config.with_device(interface.as_str());
        }
        config
    }

    /// Capture time limit, if any
    pub fn time_limit(&self) -> Option<Duration> {
        self.duration.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture() {
        let cli = Cli::try_parse_from([
            "pcapbridge", "-vv", "capture", "-i", "eth0", "-s", "128", "--no-promisc", "-f",
            "tcp port 80", "-c", "10",
        ])
        .unwrap();

        assert_eq!(cli.log_level(), "debug");
        let Commands::Capture(args) = cli.command else {
            panic!("expected capture subcommand");
        };
        assert_eq!(args.filter.as_deref(), Some("tcp port 80"));
        assert_eq!(args.count, Some(10));

        let config = args.to_config();
        assert_eq!(config.device.as_deref(), Some("eth0"));
        assert_eq!(config.snaplen, 128);
        assert!(!config.promiscuous);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capture_defaults() {
        let cli = Cli::try_parse_from(["pcapbridge", "capture"]).unwrap();
        let Commands::Capture(args) = cli.command else {
            panic!("expected capture subcommand");
        };
        let config = args.to_config();
        assert_eq!(config.snaplen, DEFAULT_SNAPLEN);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.promiscuous);
        assert!(args.time_limit().is_none());
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["pcapbridge", "send", "-i", "lo", "ffffffffffff"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
        match cli.command {
            Commands::Send { interface, frame } => {
                assert_eq!(interface.as_deref(), Some("lo"));
                assert_eq!(frame, "ffffffffffff");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["pcapbridge"]).is_err());
    }
}
