//! aerogate entry point.

use clap::Parser;
use mimalloc::MiMalloc;

use aerogate::cli::Cli;
use aerogate::telemetry::{bootstrap_subscriber, init_tracing};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config warnings are logged before the transport (and log format) is known.
    let config = match tracing::subscriber::with_default(bootstrap_subscriber(cli.verbose), || {
        cli.resolve_config()
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("aerogate: {e}");
            std::process::exit(2);
        }
    };

    let guard = init_tracing(cli.verbose, config.transport);

    let code = match aerogate::app::run(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "aerogate failed");
            eprintln!("aerogate: {e}");
            1
        }
    };

    // Flush buffered log lines; a blocked stdin read must not hold the process open.
    drop(guard);
    std::process::exit(code);
}
