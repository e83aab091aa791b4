use crate::database::{Database, TrackRow};
use crate::error::{Result, SyncError};
use crate::library::filter::{Predicate, translate};
use crate::library::volumes::VolumeResolver;
use crate::library::{Playlist, Track};

/// Turns playlist definitions into ordered, fully-qualified track lists.
pub struct Materializer<'a> {
    db: &'a Database,
    volumes: &'a VolumeResolver,
}

impl<'a> Materializer<'a> {
    pub fn new(db: &'a Database, volumes: &'a VolumeResolver) -> Self {
        Self { db, volumes }
    }

    /// Materialize an autoplaylist from its translated predicate.
    ///
    /// `playlist.tracks` is replaced only when every row resolves; otherwise it
    /// is left exactly as it was.
    pub async fn materialize(&self, playlist: &mut Playlist, predicate: &Predicate) -> Result<()> {
        let rows = self.db.query_tracks(predicate).await?;
        playlist.tracks = self.resolve_rows(playlist.id, rows)?;
        Ok(())
    }

    /// Materialize a static playlist from its stored membership.
    pub async fn materialize_static(&self, playlist: &mut Playlist) -> Result<()> {
        let rows = self.db.playlist_members(playlist.id).await?;
        playlist.tracks = self.resolve_rows(playlist.id, rows)?;
        Ok(())
    }

    /// Translate (for auto playlists) and materialize.
    pub async fn populate(&self, playlist: &mut Playlist) -> Result<()> {
        if !playlist.auto {
            return self.materialize_static(playlist).await;
        }

        let query = playlist
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| SyncError::invalid_filter("autoplaylist has no stored query"))?;
        let predicate = translate(query)?;
        log::debug!(
            "Playlist '{}' translated to {} condition(s)",
            playlist.name,
            predicate.len()
        );
        self.materialize(playlist, &predicate).await
    }

    fn resolve_rows(&self, playlist_id: i64, rows: Vec<TrackRow>) -> Result<Vec<Track>> {
        rows.into_iter()
            .enumerate()
            .map(|(position, row)| {
                let volume_id = row.volume_id.ok_or_else(|| {
                    SyncError::not_found("volume", format!("(none) for song {}", row.id))
                })?;
                let path = self.volumes.qualify(volume_id, &row.path).inspect_err(|e| {
                    log::debug!("Song {} '{}' did not resolve: {}", row.id, row.title, e)
                })?;

                Ok(Track {
                    title: row.title,
                    artist: row.artist,
                    album: row.album,
                    path,
                    playlist_id,
                    custom: [row.custom1, row.custom2, row.custom3, row.custom4],
                    volume_id,
                    position,
                })
            })
            .collect()
    }
}
