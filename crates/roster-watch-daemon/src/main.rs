//! roster-watch — entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tokio::sync::Notify;

use roster_watch::{BaselineStore, Formatter, JsonBaselineStore};
use roster_watch_daemon::config::{resolve_data_file, Config, WatchArgs};
use roster_watch_daemon::renderer;
use roster_watch_daemon::source::{parse_roster, RosterSource};
use roster_watch_daemon::{Watcher, WebhookSink};

#[derive(Parser)]
#[command(
    name = "roster-watch",
    about = "Watch a faction roster page and post changes to a chat webhook",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap, then watch the roster until interrupted (default).
    Run(WatchArgs),

    /// Run a single watch cycle and exit.
    Once {
        #[command(flatten)]
        args: WatchArgs,

        /// Treat this as a start-up cycle: post only the roster summary and reset the baseline.
        #[arg(long)]
        summary: bool,
    },

    /// Parse a saved roster page and print the snapshot as JSON.
    Parse {
        /// HTML file to parse.
        file: PathBuf,
    },

    /// Print the summary of the stored baseline.
    Baseline {
        /// Path of the baseline JSON file.
        #[arg(long)]
        data_file: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   roster-watch completions bash > ~/.local/share/bash-completion/completions/roster-watch
    ///   roster-watch completions zsh > ~/.zfunc/_roster-watch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    match cli.command.unwrap_or(Commands::Run(WatchArgs::default())) {
        Commands::Run(args) => {
            let config = Config::resolve(&args)?;
            log_config(&config);

            let (mut watcher, poll_interval) = build_watcher(&config, true).await;

            let shutdown = Arc::new(Notify::new());
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, shutting down");
                    signal.notify_one();
                }
            });

            watcher.run(poll_interval, shutdown).await;
            watcher.source().shutdown().await;
        }

        Commands::Once { args, summary } => {
            let config = Config::resolve(&args)?;
            log_config(&config);

            let (mut watcher, _) = build_watcher(&config, summary).await;
            let result = watcher.run_cycle().await;
            watcher.source().shutdown().await;

            match result {
                Ok(report) => tracing::info!(
                    "Cycle done: members={} messages={} failed_deliveries={}",
                    report.members,
                    report.messages,
                    report.delivery_failures
                ),
                Err(e) => {
                    tracing::error!("{e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Parse { file } => {
            let html = std::fs::read_to_string(&file)?;
            let page = parse_roster(&html, chrono::Local::now().naive_local())?;
            for skipped in &page.skipped {
                eprintln!("skipped: {skipped}");
            }
            println!("{}", serde_json::to_string_pretty(&page.snapshot)?);
        }

        Commands::Baseline { data_file } => {
            let path = resolve_data_file(data_file.as_deref());
            let store = JsonBaselineStore::new(&path);
            let snapshot = store.load_baseline()?;
            let summary = Formatter::default().summary(&snapshot, chrono::Local::now().naive_local());
            println!("{}", summary.text);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "roster-watch", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn log_config(config: &Config) {
    tracing::info!("roster-watch v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Roster: {}", config.roster_url);
    tracing::info!("Baseline: {}", config.data_file.display());
    tracing::info!(
        "Interval: {}s, attempts: {}, browser fallback: {}",
        config.poll_interval.as_secs(),
        config.fetch.max_attempts,
        config.fetch.browser_fallback
    );
}

async fn build_watcher(
    config: &Config,
    bootstrap: bool,
) -> (
    Watcher<RosterSource, WebhookSink, JsonBaselineStore>,
    std::time::Duration,
) {
    let renderer = renderer::launch(config.fetch.browser_fallback).await;
    let source = RosterSource::new(config.roster_url.clone(), config.fetch.clone(), renderer);
    let sink = WebhookSink::new(config.webhook_url.clone(), config.webhook_username.clone());
    let store = JsonBaselineStore::new(&config.data_file);

    let watcher = Watcher::new(source, sink, store, Formatter::new(config.mention.clone()))
        .with_bootstrap(bootstrap)
        .with_failure_alert_after(config.failure_alert_after);
    (watcher, config.poll_interval)
}
