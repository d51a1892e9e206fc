use clap::{Parser, Subcommand};
use lib::exec::{CommandExecutor, ProcessExecutor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Command-relay bot over Signal, Telegram, and HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bot: the configured messaging poller plus the HTTP command
    /// endpoint when enabled. Stops on SIGINT/SIGTERM.
    Run {
        /// Config file path (default: RELAYBOT_CONFIG_PATH or ~/.relaybot/config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relaybot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_bot(config).await {
                log::error!("relaybot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_bot(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::info!(
        "loaded {} command(s) from {}",
        config.commands.len(),
        path.display()
    );

    let commands = Arc::new(config.commands.clone());
    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor);
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.httpd.enabled {
        let state = lib::httpd::HttpdState {
            commands: commands.clone(),
            executor: executor.clone(),
            auth_token: lib::config::resolve_http_auth_token(&config),
        };
        let addr = config.httpd.addr.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = lib::httpd::run_httpd(&addr, state, cancel).await {
                log::error!("httpd failed: {:#}", e);
            }
        }));
    }

    if let Some(client) = lib::messaging::client_from_config(&config).await? {
        log::info!("starting {} poller", config.provider);
        let cancel = cancel.clone();
        let commands = commands.clone();
        let executor = executor.clone();
        tasks.push(tokio::spawn(async move {
            lib::poller::run_poller(client, commands, executor, cancel).await;
        }));
    }

    if tasks.is_empty() {
        anyhow::bail!("nothing to run: httpd disabled and no messaging provider configured");
    }

    shutdown_signal().await;
    log::info!("signal received, terminating");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
