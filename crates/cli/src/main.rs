//! CLI entrypoint and subcommand orchestration.

mod config;
mod repl;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use chat::{SendOutcome, SendWorkflow, SharedStore, StreamClient};
use clap::{Parser, Subcommand};
use config::Config;

#[cfg(not(test))]
use tracing::{info, warn};
#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments for the streamchat application.
#[derive(Parser)]
#[command(name = "streamchat")]
#[command(about = "Streaming chat client", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "error")]
    log_level: String,

    /// Enable debug logging to ~/.streamchat/logs/debug.log
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands available in the application.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start an interactive chat (default when no subcommand is given)
    Chat,

    /// Send a single message, print the streamed answer and exit
    Run {
        /// Message to send
        #[arg(short = 'e', long)]
        exec: String,
    },
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Chat => "chat",
            Commands::Run { .. } => "run",
        }
    }
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    // Console logs go to stderr so they never interleave with the transcript.
    // With --debug, debug-level logs also go to ~/.streamchat/logs/debug.YYYY-MM-DD.log.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    let debug_writer = if cli.debug {
        let log_dir = config::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from(".streamchat"))
            .join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match debug_writer {
        Some(writer) => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new(
                    "debug,hyper_util=info,rustls=info,reqwest=info",
                ));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    // Emit session-start marker when --debug is active so each run is easily identifiable.
    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = command.label(),
            log_level = %cli.log_level,
            "========== streamchat session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config ({e}), using defaults");
        Config::default()
    });
    let workflow = build_workflow(&config)?;
    match command {
        Commands::Chat => cmd_chat(&workflow).await,
        Commands::Run { exec } => cmd_run(&workflow, exec).await,
    }
}

/// Wires the stream client and a fresh conversation log from validated config.
fn build_workflow(config: &Config) -> proto::Result<SendWorkflow> {
    config.validate()?;
    let endpoint = &config.endpoint;
    let client = StreamClient::new(endpoint.url.as_str(), endpoint.api_key.as_str())
        .with_api_key_header(endpoint.api_key_header.as_str())
        .with_accept(endpoint.accept.as_str())
        .with_prompt_param(endpoint.prompt_param.as_str());
    Ok(SendWorkflow::new(SharedStore::new(), Arc::new(client))
        .with_error_notice(config.chat.error_notice.as_str()))
}

#[cfg(not(test))]
async fn cmd_chat(workflow: &SendWorkflow) -> anyhow::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    repl::run_chat(workflow, stdin, &mut stdout).await
}

#[cfg(not(test))]
async fn cmd_run(workflow: &SendWorkflow, exec: String) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let outcome = repl::run_once(workflow, &exec, &mut stdout).await?;
    if let Err(e) = outcome_result(&outcome) {
        eprintln!("Error: {e}");
    }
    if let Some(code) = exit_code(&outcome) {
        std::process::exit(code);
    }
    Ok(())
}

/// The stream failure behind a failed send, as a workspace error.
fn outcome_result(outcome: &SendOutcome) -> proto::Result<()> {
    match outcome {
        SendOutcome::Failed { error, .. } => Err(error.clone().into()),
        _ => Ok(()),
    }
}

/// Non-zero exit status for a one-shot send that did not produce an answer.
fn exit_code(outcome: &SendOutcome) -> Option<i32> {
    match outcome {
        SendOutcome::Completed { .. } => None,
        SendOutcome::Failed { .. } => Some(1),
        SendOutcome::Ignored | SendOutcome::Busy => Some(2),
    }
}
