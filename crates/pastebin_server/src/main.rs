//! API server entrypoint.

use pastebin_core::{SharedClock, SystemClock, DEFAULT_PORT};
use pastebin_server::{
    config::Config, connect_store, housekeeping, resolve_bind_address, serve_router, AppState,
    StoreBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CliFlags {
    help: bool,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => flags.help = true,
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    Ok(flags)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pastebin_server=info,pastebin_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if parse_cli_flags(&args)?.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    if config.test_mode {
        tracing::warn!("TEST_MODE enabled - requests may override the current time");
    }

    let clock: SharedClock = Arc::new(SystemClock);
    match config.store_backend {
        StoreBackend::Redb => tracing::info!("Using redb store at {}", config.db_path),
        StoreBackend::Memory => tracing::warn!("Using in-memory store - pastes are lost on exit"),
    }
    let kv = connect_store(&config, clock.clone()).await?;

    let purge_task = housekeeping::spawn_purge_task(
        kv.clone(),
        Duration::from_secs(config.purge_interval_secs),
    );

    if config.allow_public_access {
        tracing::warn!("Public access enabled - server will accept requests from any origin");
    }
    let bind_addr = resolve_bind_address(&config);
    if !bind_addr.ip().is_loopback() {
        tracing::warn!(
            "Binding to non-localhost address: {} - ensure proper security measures are in place",
            bind_addr
        );
    }

    let state = AppState::new(config, kv, clock);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr().unwrap_or(bind_addr);
    tracing::info!("Pastebin running at http://{}", actual_addr);

    let serve_result = serve_router(listener, state, shutdown_signal()).await;

    if let Some(task) = purge_task {
        task.abort();
    }
    tracing::info!("Server stopped");

    serve_result?;
    Ok(())
}

fn print_help() {
    println!("Pastebin Server\n");
    println!("Usage: pastebin [OPTIONS]\n");
    println!("Options:");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!("  PORT                     Server port (default: {})", DEFAULT_PORT);
    println!(
        "  BIND                     Override bind address (e.g. 0.0.0.0:{})",
        DEFAULT_PORT
    );
    println!("  ALLOW_PUBLIC_ACCESS      Allow non-loopback bind and CORS from any origin");
    println!("  BASE_URL                 Base for returned paste URLs");
    println!("  STORE_BACKEND            redb (default) or memory");
    println!("  DB_PATH                  redb file (default: ~/.cache/pastebin/data.redb)");
    println!("  STORE_TIMEOUT_MS         Per-operation store timeout (default: 5000)");
    println!("  HEALTH_TIMEOUT_MS        Health check store timeout (default: 1000)");
    println!("  STORE_CONNECT_RETRIES    Store connect retries (default: 10)");
    println!("  MAX_BODY_SIZE            Request body limit in bytes");
    println!("  RATE_LIMIT_MAX_REQUESTS  Requests per window per client (default: 100)");
    println!("  RATE_LIMIT_WINDOW_SECS   Rate limit window (default: 60)");
    println!("  TRUST_PROXY_HEADERS      Key rate limits on X-Forwarded-For (default: false)");
    println!("  VIEW_COUNT_FALLBACK      best-effort (default) or fail-closed");
    println!("  PURGE_INTERVAL_SECS      Expired-entry sweep interval, 0 disables (default: 300)");
    println!("  TEST_MODE                Honor the x-test-now-ms request header");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::{parse_cli_flags, CliFlags};

    #[test]
    fn parse_cli_flags_rejects_unknown_and_positional_arguments() {
        let cases = [
            (
                vec!["pastebin".to_string(), "--verbose".to_string()],
                "Unknown option",
            ),
            (
                vec!["pastebin".to_string(), "serve".to_string()],
                "Unexpected positional argument",
            ),
        ];

        for (args, expected_fragment) in cases {
            let err = parse_cli_flags(&args).expect_err("invalid args should be rejected");
            assert!(err.to_string().contains(expected_fragment));
        }
    }

    #[test]
    fn parse_cli_flags_accepts_help() {
        for flag in ["--help", "-h"] {
            let args = vec!["pastebin".to_string(), flag.to_string()];
            assert_eq!(
                parse_cli_flags(&args).expect("help parses"),
                CliFlags { help: true }
            );
        }
        assert_eq!(
            parse_cli_flags(&["pastebin".to_string()]).expect("no args"),
            CliFlags::default()
        );
    }
}
