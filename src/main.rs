use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use gator::commands;
use gator::config::Config;
use gator::storage::Database;
use gator::util::parse_interval;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Multi-user RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        /// Number of posts to show
        limit: Option<u32>,
    },
    /// Poll feeds forever, one per interval (e.g. 30s, 1m, 1m30s)
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; command output owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        restrict_permissions(&config_dir);
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Register { name } => commands::register(&db, &mut out, &name).await?,
        Command::Login { name } => commands::login(&db, &mut out, &name).await?,
        Command::Reset => commands::reset(&db, &mut out).await?,
        Command::Users => commands::users(&db, &mut out).await?,
        Command::AddFeed { name, url } => {
            commands::add_feed(&db, &config, &mut out, &name, &url).await?
        }
        Command::Feeds => commands::feeds(&db, &mut out).await?,
        Command::Follow { url } => commands::follow(&db, &mut out, &url).await?,
        Command::Following => commands::following(&db, &mut out).await?,
        Command::Unfollow { url } => commands::unfollow(&db, &mut out, &url).await?,
        Command::Browse { limit } => commands::browse(&db, &mut out, limit).await?,
        Command::Agg { interval } => {
            let shutdown = shutdown_signal().context("Failed to install signal handlers")?;
            commands::agg(&db, &config, &mut out, interval, shutdown).await?;
        }
    }

    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            biased;
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    })
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down gracefully"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await
            }
        }
    })
}

/// Config directory is user-only (0700) on Unix.
fn restrict_permissions(dir: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
