//! Feed Console Binary
//!
//! Subscribes to one event type for the configured symbols and prints every
//! received event on its own line until Enter is pressed.
//!
//! # Usage
//!
//! ```bash
//! FEED_SYMBOLS=ETH/USD:GDAX cargo run --bin feed-console
//! ```
//!
//! # Environment Variables
//!
//! - `FEED_ADDRESS`: dxLink endpoint (default: `wss://demo.dxfeed.com/dxlink-ws`)
//! - `FEED_AUTH_TOKEN`: Access token, if the endpoint requires one
//! - `FEED_EVENT_TYPE`: TimeAndSale | Trade | Quote (default: TimeAndSale)
//! - `FEED_SYMBOLS`: Comma separated symbols (default: ETH/USD:GDAX)
//! - `FEED_KEEPALIVE_INTERVAL_SECS`, `FEED_KEEPALIVE_TIMEOUT_SECS`,
//!   `FEED_REQUEST_TIMEOUT_SECS`: Connection timing
//! - `FEED_RECONNECT_DELAY_INITIAL_MS`, `FEED_RECONNECT_DELAY_MAX_SECS`,
//!   `FEED_RECONNECT_DELAY_MULTIPLIER`, `FEED_MAX_RECONNECT_ATTEMPTS`:
//!   Reconnection backoff
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log filter, logs go to stderr (default: info)
//!
//! # Exit Codes
//!
//! - 0: stopped by the user
//! - 1: connection failed
//! - 2: subscription failed
//! - 3: invalid configuration
//! - 4: a symbol could not be added

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use feed_console::application::services::{ConsoleSession, EXIT_CONFIG_INVALID};
use feed_console::infrastructure::config::ClientConfig;
use feed_console::infrastructure::console::ConsolePrinter;
use feed_console::infrastructure::dxlink::DxLinkConnector;
use feed_console::infrastructure::telemetry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

/// Time allowed for blocking work (the stdin reader) after `run` returns.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let code = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    Ok(code)
}

async fn run() -> ExitCode {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };
    log_config(&config);

    let session = ConsoleSession::new(
        DxLinkConnector::new(config.dxlink_config()),
        config.session_settings(),
    );
    let active = match session.start(Arc::new(ConsolePrinter::stdout())).await {
        Ok(active) => active,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Session setup failed");
            return ExitCode::from(e.exit_code());
        }
    };

    println!("Press Enter to stop");
    await_shutdown().await;

    active.close().await;
    tracing::info!("Feed console stopped");
    ExitCode::SUCCESS
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    let symbols: Vec<&str> = config.feed.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        address = %config.feed.address,
        event_type = %config.feed.event_type,
        symbols = ?symbols,
        authenticated = config.feed.token.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        keepalive_interval_secs = config.connection.keepalive_interval.as_secs(),
        keepalive_timeout_secs = config.connection.keepalive_timeout.as_secs(),
        request_timeout_secs = config.connection.request_timeout.as_secs(),
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        "Connection settings"
    );
}

/// Wait for a line on stdin, end of input, Ctrl+C or SIGTERM.
async fn await_shutdown() {
    let enter = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(_)) => tracing::info!("Enter pressed, stopping"),
            Ok(None) => tracing::info!("Standard input closed, stopping"),
            Err(e) => tracing::warn!(error = %e, "Failed to read standard input, stopping"),
        }
    };

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = enter => {}
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping");
        }
    }
}
