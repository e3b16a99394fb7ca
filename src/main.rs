//! chatroute HTTP entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build providers, router, knowledge base and session store
//!   6. `--check`: print status and exit
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Serve HTTP until shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use chatroute::chat::ChatService;
use chatroute::config::{self, ApiKeys};
use chatroute::error::AppError;
use chatroute::logger;
use chatroute::server::{self, ApiState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bind = %config.server.bind,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        strategy = ?config.routing.strategy,
        default_provider = %config.routing.default_provider,
        "config loaded"
    );

    let keys = ApiKeys::from_env();
    let service = ChatService::from_config(&config, &keys)?;

    if args.check {
        println!("✓ Config OK: bind={}", config.server.bind);
        for p in service.provider_catalog() {
            let status = if p.available { "ready" } else { "disabled" };
            println!("  {:<10} {:<12} {}", p.id, p.label, status);
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let state = ApiState::new(
        Arc::new(service),
        Duration::from_secs(config.server.request_timeout_seconds),
    );
    server::serve(&config.server.bind, state, shutdown).await
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    check: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut check = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: chatroute [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!("      --check                Validate config and providers, then exit");
                std::process::exit(0);
            }
            "--check" => check = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v     → warn
    //   -vv    → info
    //   -vvv   → debug (routing decisions, knowledge hits)
    //   -vvvv+ → trace (full prompts)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, check }
}
