mod config;
mod database;
mod error;
mod library;
mod logging;
mod plex_rs;
mod ports;
mod services;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use url::Url;

use crate::{
    config::Config,
    database::Database,
    logging::setup_logging,
    plex_rs::PlexApi,
    services::plex::client::PlexHttpAdapter,
    services::sync::{SyncOptions, reconcile::ReconcileOptions, run},
};

/// Sync MediaMonkey playlists to a Plex Media Server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Args {
    /// MediaMonkey library database (MM.DB)
    #[arg(value_parser = is_file)]
    database: Option<PathBuf>,

    /// The config file to use
    #[arg(short, long, env = "MM_PLAYLIST_SYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Console log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "MM_PLAYLIST_SYNC_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Print the tracks of each playlist instead of syncing them
    #[arg(long)]
    dry_run: bool,

    /// Plex server URL, e.g. http://127.0.0.1:32400
    #[arg(long, env = "PLEX_URL")]
    plex_url: Option<String>,

    /// Plex access token
    #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
    plex_token: Option<String>,

    /// Playlist to sync (repeatable). Defaults to the configured list, or every playlist
    #[arg(short, long = "playlist")]
    playlists: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn is_file(s: &str) -> Result<PathBuf, String> {
    let p: PathBuf = s.into();
    if p.is_file() {
        Ok(p)
    } else {
        Err(format!("`{}` is not an existing file", s))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the default config file location
    Path,
}

/// Plex client from the CLI flags, falling back to the config file.
fn plex_adapter(args: &Args, config: &Config) -> Result<PlexHttpAdapter> {
    let server_url = args
        .plex_url
        .clone()
        .or_else(|| config.plex.server_url.clone())
        .ok_or_else(|| eyre!("No Plex server URL. Set --plex-url, PLEX_URL or plex.server_url"))?;
    let token = args
        .plex_token
        .clone()
        .or_else(|| config.plex.token.clone())
        .ok_or_else(|| eyre!("No Plex token. Set --plex-token, PLEX_TOKEN or plex.token"))?;

    // Url::join drops the last path segment without a trailing slash
    let server_url = if server_url.ends_with('/') {
        server_url
    } else {
        format!("{}/", server_url)
    };
    let base_url =
        Url::parse(&server_url).wrap_err_with(|| format!("Invalid Plex URL: {}", server_url))?;

    let api = PlexApi::new(base_url, token, config.plex.request_timeout()?)?;
    Ok(PlexHttpAdapter::new(
        api,
        config.plex.retry_attempts,
        config.plex.page_size,
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    if let Some(Commands::Config(command)) = &args.command {
        match command {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                log::info!("Default config at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        }
        return Ok(());
    }

    log::debug!("Loading configuration");
    let config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load mm-playlist-sync config")?;

    let Some(database_path) = args.database.clone() else {
        bail!("No library database given. Usage: mm-playlist-sync <DATABASE>");
    };

    // Resolve the remote before touching the library so a bad URL fails fast
    let adapter = if args.dry_run {
        None
    } else {
        Some(plex_adapter(&args, &config)?)
    };

    let options = SyncOptions {
        playlists: if args.playlists.is_empty() {
            config.library.playlists.clone()
        } else {
            args.playlists.clone()
        },
        volume_overrides: config.library.volume_overrides.clone(),
        prepend_parent: config.library.prepend_parent,
        reconcile: ReconcileOptions {
            skip_unmatched: config.library.skip_unmatched,
        },
    };

    let database = Database::open(&database_path).await?;

    let summary = run(database, adapter.as_ref(), &options).await?;
    print!("{}", summary);

    if summary.has_failures() {
        bail!("{} playlist(s) failed to sync", summary.failed.len());
    }
    Ok(())
}
