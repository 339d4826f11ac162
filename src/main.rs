use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use service_scaffold::config::LogFormat;
use service_scaffold::{AppState, Config, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    init_tracing(config.as_ref().ok());

    info!(
        "Starting Service Scaffold v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => {
            error!("Configuration error: {e}");
            Err(exitcode::CONFIG)
        }
    };

    match result {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Install the global subscriber. Falls back to `info` when the
/// configuration could not be loaded.
fn init_tracing(config: Option<&Config>) {
    let directive = config.map_or("info", |c| c.log_level.as_str());
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match config.map(|c| c.log_format) {
        Some(LogFormat::Json) => builder.json().init(),
        _ => builder.init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        throttle_limit = config.throttle_limit,
        throttle_ttl_ms = config.throttle_ttl.as_millis() as u64,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health                    - Health check");
    info!("  GET  /ready                     - Readiness check");
    info!("  GET  /examples/dates/validate   - Optional date parsing");
    info!("  POST /examples/dates/validate   - Required date parsing");
    info!("  GET  /examples/users            - Paged user listing");
    info!("  POST /examples/users            - Create user");
    info!("  GET  /examples/users/{{id}}       - Get user");
    info!("  GET  /examples/errors/{{kind}}    - Trigger an error");

    let state = AppState::new(config);
    utils::serve(listener, state, utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("Server shutdown complete");
    Ok(())
}
