use std::collections::HashSet;
use std::future::Future;

use backon::{ExponentialBuilder, Retryable};
use color_eyre::Report;
use tokio::sync::OnceCell;

use crate::error::{Result, SyncError};
use crate::library::Track;
use crate::plex_rs::PlexApi;
use crate::plex_rs::library::{PlexLibraryTrack, next_page_start};
use crate::plex_rs::playlist::{PlexPlaylist, is_music_playlist};
use crate::ports::remote::{RemotePlaylist, RemotePlaylistClient, RemoteTrackId};
use crate::services::plex::LibraryIndex;

/// Which failures a request may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Reads: any transient failure.
    Read,
    /// Writes are retried only when the request never reached the server.
    Write,
}

fn reqwest_error(report: &Report) -> Option<&reqwest::Error> {
    report
        .chain()
        .find_map(|e| e.downcast_ref::<reqwest::Error>())
}

/// Connect failures, timeouts, 5xx and 429 are worth another attempt.
fn is_transient(report: &Report) -> bool {
    reqwest_error(report).is_some_and(|e| {
        e.is_timeout()
            || e.is_connect()
            || e.status()
                .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
    })
}

fn is_retryable(report: &Report, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Read => is_transient(report),
        RetryPolicy::Write => reqwest_error(report).is_some_and(|e| e.is_connect()),
    }
}

fn describe(report: &Report) -> String {
    report
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

fn classify(what: &str, report: Report) -> SyncError {
    let reason = format!("{}: {}", what, describe(&report));
    if is_transient(&report) {
        SyncError::Connection { reason }
    } else {
        SyncError::RemoteSync { reason }
    }
}

/// Run `op` up to `attempts` times with exponential backoff.
async fn with_retry<T, F, Fut>(what: &str, attempts: usize, policy: RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = color_eyre::Result<T>>,
{
    let backoff = ExponentialBuilder::default().with_max_times(attempts.max(1) - 1);

    op.retry(backoff)
        .when(|e: &Report| is_retryable(e, policy))
        .notify(|e: &Report, delay| {
            log::warn!("{} failed, retrying in {:?}: {}", what, delay, describe(e));
        })
        .await
        .map_err(|report| classify(what, report))
}

/// `RemotePlaylistClient` backed by a Plex Media Server.
///
/// The music library is fetched once, on the first track lookup, and reused
/// for every playlist of the session.
pub struct PlexHttpAdapter {
    api: PlexApi,
    retry_attempts: usize,
    page_size: u32,
    index: OnceCell<LibraryIndex>,
    machine_identifier: OnceCell<String>,
}

impl PlexHttpAdapter {
    pub fn new(api: PlexApi, retry_attempts: usize, page_size: u32) -> Self {
        Self {
            api,
            retry_attempts,
            page_size: page_size.max(1),
            index: OnceCell::new(),
            machine_identifier: OnceCell::new(),
        }
    }

    async fn read<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = color_eyre::Result<T>>,
    {
        with_retry(what, self.retry_attempts, RetryPolicy::Read, op).await
    }

    async fn write<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = color_eyre::Result<T>>,
    {
        with_retry(what, self.retry_attempts, RetryPolicy::Write, op).await
    }

    async fn library_index(&self) -> Result<&LibraryIndex> {
        self.index.get_or_try_init(|| self.load_library()).await
    }

    async fn load_library(&self) -> Result<LibraryIndex> {
        let section_id = self
            .read("fetch library sections", || self.api.music_section_id())
            .await?;
        log::info!(
            "Indexing Plex music library (section {}) at {}",
            section_id,
            self.api.base_url()
        );

        let mut tracks: Vec<PlexLibraryTrack> = Vec::new();
        let mut start = 0;
        loop {
            let page = self
                .read("fetch library tracks", || {
                    self.api.get_tracks_page(&section_id, start, self.page_size)
                })
                .await?;
            let fetched = tracks.len() as u32 + page.metadata.len() as u32;
            let next = next_page_start(fetched, &page);
            tracks.extend(page.metadata);
            log::debug!("Fetched {} library tracks so far", tracks.len());

            match next {
                Some(next) => start = next,
                None => break,
            }
        }

        let index = LibraryIndex::build(&tracks);
        log::info!("Indexed {} Plex library tracks", index.len());
        Ok(index)
    }

    async fn machine_identifier(&self) -> Result<&str> {
        let id = self
            .machine_identifier
            .get_or_try_init(|| {
                self.read("fetch server identity", || self.api.get_machine_identifier())
            })
            .await?;
        Ok(id.as_str())
    }

    /// Audio playlists titled `name`.
    async fn playlists_named(&self, name: &str) -> Result<Vec<PlexPlaylist>> {
        let playlists = self
            .read("list playlists", || self.api.get_playlists())
            .await?;
        Ok(playlists
            .into_iter()
            .filter(|p| is_music_playlist(p) && p.title == name)
            .collect())
    }
}

#[async_trait::async_trait]
impl RemotePlaylistClient for PlexHttpAdapter {
    async fn playlist_exists(&self, name: &str) -> Result<bool> {
        Ok(!self.playlists_named(name).await?.is_empty())
    }

    async fn get_playlist(&self, name: &str) -> Result<RemotePlaylist> {
        let mut matches = self.playlists_named(name).await?;
        match matches.len() {
            0 => Err(SyncError::not_found("remote playlist", name)),
            1 => {
                let playlist = matches.remove(0);
                Ok(RemotePlaylist {
                    id: playlist.rating_key,
                    title: playlist.title,
                })
            }
            n => Err(SyncError::remote(format!(
                "{} Plex playlists are titled '{}'",
                n, name
            ))),
        }
    }

    async fn create_playlist(&self, name: &str) -> Result<RemotePlaylist> {
        let playlist = self
            .write("create playlist", || self.api.create_music_playlist(name))
            .await?;
        Ok(RemotePlaylist {
            id: playlist.rating_key,
            title: playlist.title,
        })
    }

    async fn get_playlist_track_ids(
        &self,
        playlist: &RemotePlaylist,
    ) -> Result<HashSet<RemoteTrackId>> {
        let items = self
            .read("fetch playlist items", || {
                self.api.get_playlist_items(&playlist.id)
            })
            .await?;
        Ok(items
            .into_iter()
            .map(|item| RemoteTrackId(item.rating_key))
            .collect())
    }

    async fn add_track(&self, playlist: &RemotePlaylist, track: &Track) -> Result<RemoteTrackId> {
        let id = self.find_remote_id(track).await?.ok_or_else(|| {
            SyncError::remote(format!(
                "'{}' ({}) is not in the Plex library",
                track.title, track.path
            ))
        })?;
        let machine = self.machine_identifier().await?;

        self.write("add track to playlist", || {
            self.api.add_track_to_playlist(&playlist.id, machine, &id.0)
        })
        .await?;
        Ok(id)
    }

    async fn remove_track(&self, playlist: &RemotePlaylist, id: &RemoteTrackId) -> Result<()> {
        let items = self
            .read("fetch playlist items", || {
                self.api.get_playlist_items(&playlist.id)
            })
            .await?;

        let item_ids: Vec<u64> = items
            .iter()
            .filter(|item| item.rating_key == id.0)
            .filter_map(|item| item.playlist_item_id)
            .collect();
        if item_ids.is_empty() {
            log::debug!("Id {} is no longer in '{}'", id, playlist.title);
        }

        for item_id in item_ids {
            self.write("remove track from playlist", || {
                self.api.remove_playlist_item(&playlist.id, item_id)
            })
            .await?;
        }
        Ok(())
    }

    /// Plex can only list tracks it has already scanned.
    fn adds_unmatched(&self) -> bool {
        false
    }

    async fn find_remote_id(&self, track: &Track) -> Result<Option<RemoteTrackId>> {
        self.library_index().await?.lookup(track)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use color_eyre::eyre::eyre;

    use super::*;

    async fn refused() -> Report {
        // Nothing listens on port 1
        let err = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
        Report::new(err).wrap_err("Failed to deserialize library sections")
    }

    #[tokio::test]
    async fn test_connect_failure_is_transient() {
        let report = refused().await;
        assert!(is_transient(&report));
        assert!(is_retryable(&report, RetryPolicy::Write));
        assert!(matches!(
            classify("list playlists", report),
            SyncError::Connection { .. }
        ));
    }

    #[test]
    fn test_other_failures_are_terminal() {
        let report = eyre!("Create playlist response had no Metadata");
        assert!(!is_transient(&report));

        match classify("create playlist", report) {
            SyncError::RemoteSync { reason } => {
                assert_eq!(
                    reason,
                    "create playlist: Create playlist response had no Metadata"
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plex_refuses_unmatched_adds() {
        let api = PlexApi::new(
            url::Url::parse("http://127.0.0.1:32400/").unwrap(),
            "token".to_string(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();

        assert!(!PlexHttpAdapter::new(api, 1, 10).adds_unmatched());
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let calls = &AtomicUsize::new(0);
        let result: Result<()> = with_retry("list playlists", 3, RetryPolicy::Read, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(eyre!("401 Unauthorized"))
        })
        .await;

        assert!(matches!(result, Err(SyncError::RemoteSync { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempts() {
        let calls = &AtomicUsize::new(0);
        let result: Result<()> = with_retry("list playlists", 2, RetryPolicy::Read, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(refused().await)
        })
        .await;

        assert!(matches!(result, Err(SyncError::Connection { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
