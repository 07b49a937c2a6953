use anyhow::Context;
use clap::{Parser, Subcommand};
use logtap_core::config::Config;
use logtap_core::TimeRange;
use logtap_feeds::auth::{AuthEnvironment, AuthGate, AuthIndicator, Credentials, LogIndicator};
use logtap_feeds::remote::{HttpLoggingApi, LoggingApi};
use logtap_feeds::{open_reader, record_channel, SourceSpec};
use logtap_tui::AuthModal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(name = "logtap", about = "logtap: stream log entries from files, stdin or Cloud Logging")]
struct Cli {
    /// Write debug logs to /tmp/logtap-debug.log (tail -f to inspect).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a file across rotation, or stdin when no file is given.
    Stream {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Replay and then tail a Cloud Logging project.
    GcpStream {
        #[arg(short, long)]
        project: String,
        /// Logging query ANDed onto the time bound.
        #[arg(long)]
        filter: Option<String>,
        /// `tail`, a relative window such as `10m`, `2h`, `1d`, or a local
        /// time like `2024-05-01T12:00:00`.
        #[arg(long, default_value = "tail")]
        from: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/logtap-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("logtap debug log started, tail -f /tmp/logtap-debug.log");
    }

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config not loaded, using defaults");
        Config::defaults()
    });

    let spec = match cli.command {
        Command::Stream { file } => SourceSpec::from_file_arg(file),
        Command::GcpStream {
            project,
            filter,
            from,
        } => remote_source(&config, project, filter, &from).await?,
    };

    let (tx, rx) = record_channel(config.stream.capacity());
    let mut reader = open_reader(spec, &config, tx);
    let failure: Arc<Mutex<Option<String>>> = Arc::default();
    let reported = failure.clone();
    reader.on_error(Box::new(move |e| {
        tracing::error!(error = %e, class = ?e.class(), "reader stopped with an error");
        if let Ok(mut slot) = reported.lock() {
            slot.get_or_insert_with(|| e.to_string());
        }
    }));
    if let Err(e) = reader.stream_into().await {
        let _ = reader.close().await;
        return Err(e).context("starting reader");
    }

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let summary = logtap::consumer::pump(reader, rx, tokio::io::stdout(), shutdown).await?;
    tracing::info!(records = summary.records, reason = ?summary.reason, "logtap finished");
    if let Some(message) = failure.lock().ok().and_then(|mut slot| slot.take()) {
        anyhow::bail!("reader failed: {message}");
    }
    Ok(())
}

/// Resolve the range, pass the access gate and describe the remote source.
async fn remote_source(
    config: &Config,
    project: String,
    filter: Option<String>,
    from: &str,
) -> anyhow::Result<SourceSpec> {
    let range = TimeRange::parse(from)?;
    let env = AuthEnvironment::detect();
    tracing::debug!(uses_gcloud = env.uses_gcloud, fixed_token = env.access_token.is_some(), "auth environment");
    let credentials = Credentials::for_environment(&env, &config.remote);
    let api: Arc<dyn LoggingApi> = Arc::new(HttpLoggingApi::new(
        config.remote.endpoint.clone(),
        credentials.tokens.clone(),
    ));

    let gate = AuthGate::new(api.clone(), credentials.acquirer.clone());
    let mut indicator: Box<dyn AuthIndicator> = if logtap_tui::interactive() {
        Box::new(AuthModal::new())
    } else {
        Box::new(LogIndicator)
    };
    gate.verify(&project, indicator.as_mut())
        .await
        .context("authentication failed")?;

    Ok(SourceSpec::Remote {
        api,
        project,
        filter,
        range,
    })
}
