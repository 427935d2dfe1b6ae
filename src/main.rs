use anyhow::{Context, Result};
use gcloud_cli::cli::flags::prescan;
use gcloud_cli::cli::{http_transport, CommandTree, Runner};
use gcloud_cli::console::Console;
use gcloud_cli::error::CliError;
use gcloud_cli::properties::configurations::ConfigPaths;
use gcloud_cli::properties::store::{process_env, Env};
use gcloud_cli::properties::PropertyStore;
use gcloud_cli::resource::Registry;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "gcloud.log";

/// `core/verbosity` value to a tracing filter level
fn filter_level(verbosity: &str) -> &'static str {
    match verbosity {
        "debug" => "debug",
        "info" => "info",
        "error" | "critical" => "error",
        "none" => "off",
        _ => "warn",
    }
}

/// Verbosity before the runner has parsed anything: the flag if present,
/// else the property as the selected configuration has it
fn startup_verbosity(argv: &[String], env: &Env, paths: Option<&ConfigPaths>) -> String {
    if let Some(verbosity) = prescan(argv, "verbosity") {
        return verbosity;
    }
    let configuration = prescan(argv, "configuration");
    let store = match paths {
        Some(paths) => PropertyStore::load(paths.clone(), env.clone(), configuration.as_deref()).ok(),
        None => Some(PropertyStore::in_memory(env.clone())),
    };
    store
        .and_then(|s| s.get("core/verbosity"))
        .unwrap_or_else(|| "warning".to_string())
}

fn open_log_file(logs_dir: &Path) -> Result<std::fs::File> {
    std::fs::create_dir_all(logs_dir).with_context(|| format!("Failed to create {}", logs_dir.display()))?;
    let path = logs_dir.join(LOG_FILE);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Stderr at the chosen verbosity (`RUST_LOG` wins), plus a debug log file
/// under the config directory. The guard flushes the file on drop.
fn setup_logging(verbosity: &str, paths: Option<&ConfigPaths>) -> Option<WorkerGuard> {
    let level = filter_level(verbosity);
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if level == "off" {
            EnvFilter::new("off")
        } else {
            EnvFilter::new(format!("warn,gcloud_cli={level},gcloud={level}"))
        }
    });
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let file = paths.map(|p| open_log_file(&p.logs_dir()));
    let (file_layer, guard, file_error) = match file {
        Some(Ok(file)) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new("info,gcloud_cli=debug,gcloud=debug"));
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {:#}", e);
    }
    tracing::debug!("gcloud {} started", gcloud_cli::VERSION);
    guard
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let env = process_env();
    let cwd = std::env::current_dir().ok();
    let paths = ConfigPaths::discover(&env, cwd.as_deref());

    let verbosity = startup_verbosity(&argv, &env, paths.as_ref());
    let guard = setup_logging(&verbosity, paths.as_ref());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("Interrupted, cancelling outstanding work");
                cancel.cancel();
            }
        }
    });

    let console = Console::stdio(false);
    let registry = match Registry::builtin() {
        Ok(registry) => registry,
        Err(e) => {
            let err = CliError::from(e);
            console.err_line(&err.render("gcloud", verbosity == "debug"));
            drop(guard);
            std::process::exit(err.exit_code());
        }
    };

    let runner = Runner::new(CommandTree::builtin(), registry, console, http_transport()).with_cancellation(cancel);
    let runner = match paths {
        Some(paths) => runner.with_config(paths, env),
        None => runner.with_properties(PropertyStore::in_memory(env)),
    };
    let code = runner.run(&argv).await;

    drop(guard);
    std::process::exit(code);
}
