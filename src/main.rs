use std::path::PathBuf;

use clap::Parser;

use timeout_gate::http::HttpServer;
use timeout_gate::lifecycle::{bind_listener, init_observability, load_or_default, wait_for_signal};
use timeout_gate::Shutdown;

#[derive(Parser)]
#[command(name = "timeout-gate")]
#[command(about = "HTTP server enforcing per-request handler deadlines", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_or_default(cli.config.as_deref())?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_observability(&config);
    tracing::info!("timeout-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_timeout_ms = config.timeout.default_ms,
        routes = config.routes.len(),
        filters = config.filters.len(),
        "Configuration loaded"
    );

    let listener = bind_listener(&config).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
