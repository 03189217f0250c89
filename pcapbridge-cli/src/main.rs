use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use pcapbridge_cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let driver = commands::default_driver();
    let result = match &cli.command {
        Commands::Interfaces => commands::interfaces(),
        Commands::Lookup => commands::lookup(&driver),
        Commands::Capture(args) => commands::capture(&driver, args).await.map(|stats| {
            eprintln!();
            eprintln!("=== Capture Statistics ===");
            eprintln!("{}", stats.format());
        }),
        Commands::Send { interface, frame } => commands::send(&driver, interface.as_deref(), frame),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
