use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ladle::{config::AppConfig, imports, rest, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(name = "ladle", about = "Ladle — recipe sharing REST backend", version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port
    #[arg(long, env = "LADLE_PORT")]
    port: Option<u16>,

    /// Data directory for media, config, and SQLite database
    #[arg(long, env = "LADLE_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LADLE_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "LADLE_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "LADLE_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server (default when no subcommand given).
    ///
    /// Runs ladle in the foreground.
    ///
    /// Examples:
    ///   ladle serve
    ///   ladle
    Serve,
    /// Load tag or ingredient fixtures into the database.
    ///
    /// Accepts a JSON array of objects or a headerless CSV file; the format
    /// is chosen by file extension. Existing records are left alone, so the
    /// command is safe to re-run.
    ///
    /// Examples:
    ///   ladle import ingredients --file data/ingredients.json
    ///   ladle import tags --file data/tags.csv
    Import {
        /// What the fixture file contains
        kind: ImportKind,
        /// Path to the fixture file (.json or .csv)
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Ingredients,
    Tags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("LADLE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = AppConfig::new(args.port, args.data_dir, args.log, args.bind_address);

    match args.command {
        Some(Command::Import { kind, file }) => {
            let ctx = AppContext::new(config).await?;
            let kind = match kind {
                ImportKind::Ingredients => imports::FixtureKind::Ingredients,
                ImportKind::Tags => imports::FixtureKind::Tags,
            };
            let stats = imports::import_fixtures(&ctx.storage, kind, &file).await?;
            println!(
                "Imported {} record(s), skipped {} duplicate(s).",
                stats.inserted, stats.skipped
            );
        }
        None | Some(Command::Serve) => {
            let ctx = AppContext::new(config).await?;
            info!(
                version = env!("CARGO_PKG_VERSION"),
                data_dir = %ctx.config.data_dir.display(),
                "starting ladle"
            );
            rest::serve(ctx).await?;
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("ladle.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
