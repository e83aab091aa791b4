use std::collections::HashSet;
use std::fmt;

use crate::error::Result;
use crate::library::Track;

/// Handle on a playlist in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlaylist {
    pub id: String,
    pub title: String,
}

/// Identity of a track in the remote library (a Plex rating key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteTrackId(pub String);

impl fmt::Display for RemoteTrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteTrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Port over the remote playlist store used by the reconciler.
///
/// Implementations live in `services::plex::client` (production) or test fakes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemotePlaylistClient: Send + Sync {
    async fn playlist_exists(&self, name: &str) -> Result<bool>;

    /// Fails with `NotFound` when no playlist has this title.
    async fn get_playlist(&self, name: &str) -> Result<RemotePlaylist>;

    async fn create_playlist(&self, name: &str) -> Result<RemotePlaylist>;

    async fn get_playlist_track_ids(
        &self,
        playlist: &RemotePlaylist,
    ) -> Result<HashSet<RemoteTrackId>>;

    /// Append `track` to the playlist and return the remote id it was added as.
    async fn add_track(&self, playlist: &RemotePlaylist, track: &Track) -> Result<RemoteTrackId>;

    /// Remove every entry of `id` from the playlist.
    async fn remove_track(&self, playlist: &RemotePlaylist, id: &RemoteTrackId) -> Result<()>;

    /// Whether `add_track` accepts a track `find_remote_id` found no match for.
    fn adds_unmatched(&self) -> bool;

    /// Zero or one match. More than one match is an error, never an arbitrary pick.
    async fn find_remote_id(&self, track: &Track) -> Result<Option<RemoteTrackId>>;
}
