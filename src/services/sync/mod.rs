pub mod reconcile;

use std::collections::HashMap;
use std::fmt;

use color_eyre::eyre::{Result, WrapErr};

use crate::database::Database;
use crate::error::SyncError;
use crate::library::Playlist;
use crate::library::catalog::PlaylistCatalog;
use crate::library::materialize::Materializer;
use crate::library::volumes::VolumeResolver;
use crate::ports::remote::RemotePlaylistClient;
use crate::services::sync::reconcile::{ReconcileOptions, reconcile};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Playlists to sync. Empty means every playlist in the library.
    pub playlists: Vec<String>,
    pub volume_overrides: HashMap<String, String>,
    /// Name remote playlists `Parent - Child`.
    pub prepend_parent: bool,
    pub reconcile: ReconcileOptions,
}

/// A materialized playlist and the name it is synced under.
#[derive(Debug, Clone)]
pub struct PreparedPlaylist {
    pub remote_name: String,
    pub playlist: Playlist,
}

/// Per-playlist outcome of a run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub succeeded: Vec<String>,
    /// Playlists left alone, with the reason.
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn fail(&mut self, name: &str, error: &SyncError) {
        log::error!("Playlist '{}' failed: {}", name, error);
        self.failed.push((name.to_string(), error.to_string()));
    }

    fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("Skipping playlist '{}': {}", name, reason);
        self.skipped.push((name.to_string(), reason));
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for name in &self.succeeded {
            writeln!(f, "  ok      {}", name)?;
        }
        for (name, reason) in &self.skipped {
            writeln!(f, "  skipped {}: {}", name, reason)?;
        }
        for (name, reason) in &self.failed {
            writeln!(f, "  failed  {}: {}", name, reason)?;
        }
        Ok(())
    }
}

/// Read every selected playlist out of the library, then close it.
///
/// The database is closed whatever happens. Failing to load the catalog or
/// the volumes is fatal; a playlist that cannot be translated or materialized
/// only lands in the summary.
pub async fn prepare(
    db: Database,
    options: &SyncOptions,
    summary: &mut SyncSummary,
) -> Result<Vec<PreparedPlaylist>> {
    let prepared = materialize_selected(&db, options, summary).await;
    db.close()
        .await
        .wrap_err("Failed to close library database")?;
    prepared.wrap_err("Failed to read playlists from library database")
}

async fn materialize_selected(
    db: &Database,
    options: &SyncOptions,
    summary: &mut SyncSummary,
) -> crate::error::Result<Vec<PreparedPlaylist>> {
    let catalog = PlaylistCatalog::load_all(db).await?;
    if catalog.is_empty() {
        log::warn!("The library has no playlists");
    }
    let volumes = VolumeResolver::from_rows(&db.volumes().await?, &options.volume_overrides);
    log::debug!("Resolved {} volumes", volumes.len());
    let materializer = Materializer::new(db, &volumes);

    let mut prepared = Vec::new();
    for name in catalog.select(&options.playlists) {
        let Some(playlist) = catalog.get(&name) else {
            continue;
        };

        let mut playlist = playlist.clone();
        match materializer.populate(&mut playlist).await {
            // Parents only count as folders when they hold no tracks of their own
            Ok(()) if playlist.tracks.is_empty() && catalog.is_folder(&playlist) => {
                summary.skip(&name, "playlist folder");
            }
            Ok(()) => {
                log::info!(
                    "Playlist '{}' materialized with {} tracks",
                    name,
                    playlist.tracks.len()
                );
                prepared.push(PreparedPlaylist {
                    remote_name: catalog.display_name(&playlist, options.prepend_parent),
                    playlist,
                });
            }
            Err(e) if e.is_unsupported() => summary.skip(&name, e.to_string()),
            Err(e) => summary.fail(&name, &e),
        }
    }

    Ok(prepared)
}

/// Reconcile each prepared playlist against the remote store.
pub async fn push<C>(
    prepared: &[PreparedPlaylist],
    client: &C,
    options: &SyncOptions,
    summary: &mut SyncSummary,
) where
    C: RemotePlaylistClient + ?Sized,
{
    for PreparedPlaylist {
        remote_name,
        playlist,
    } in prepared
    {
        log::info!("Syncing '{}' as '{}'", playlist.name, remote_name);
        match reconcile(remote_name, &playlist.tracks, client, options.reconcile).await {
            Ok(result) if !result.unmatched.is_empty() => {
                summary.succeeded.push(playlist.name.clone());
                log::warn!(
                    "'{}' synced without {} tracks missing from the remote library",
                    remote_name,
                    result.unmatched.len()
                );
            }
            Ok(_) => summary.succeeded.push(playlist.name.clone()),
            Err(e) => summary.fail(&playlist.name, &e),
        }
    }
}

/// Print the tracks each playlist would sync to.
pub fn print_dry_run(prepared: &[PreparedPlaylist], summary: &mut SyncSummary) {
    for PreparedPlaylist {
        remote_name,
        playlist,
    } in prepared
    {
        println!("{} ({} tracks)", remote_name, playlist.tracks.len());
        for track in &playlist.tracks {
            println!("{}", track);
        }
        summary.succeeded.push(playlist.name.clone());
    }
}

/// Full session: materialize from the library, close it, then sync.
///
/// Without a client nothing is sent anywhere and the tracks are printed.
pub async fn run<C>(db: Database, client: Option<&C>, options: &SyncOptions) -> Result<SyncSummary>
where
    C: RemotePlaylistClient + ?Sized,
{
    let mut summary = SyncSummary::default();
    let prepared = prepare(db, options, &mut summary).await?;

    match client {
        Some(client) => push(&prepared, client, options, &mut summary).await,
        None => print_dry_run(&prepared, &mut summary),
    }

    log::info!(
        "Sync finished: {} succeeded, {} skipped, {} failed",
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    Ok(summary)
}
