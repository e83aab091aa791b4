use std::collections::HashSet;

use crate::error::{Result, SyncError};
use crate::library::Track;
use crate::ports::remote::{RemotePlaylistClient, RemoteTrackId};

/// Lifecycle of one remote playlist during a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Absent,
    /// The playlist already existed remotely.
    Present,
    Created,
    Reconciled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Report tracks the remote library does not know instead of trying to add them.
    pub skip_unmatched: bool,
}

/// Result of reconciling a remote playlist
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub state: ReconcileState,
    pub created: bool,
    pub kept: u32,
    pub added: u32,
    pub removed: u32,
    /// Paths of desired tracks skipped because nothing matched them remotely.
    pub unmatched: Vec<String>,
}

impl ReconcileResult {
    pub fn mutations(&self) -> u32 {
        self.added + self.removed + u32::from(self.created)
    }
}

fn transition(name: &str, from: &mut ReconcileState, to: ReconcileState) {
    log::debug!("Remote playlist '{}': {:?} -> {:?}", name, from, to);
    *from = to;
}

/// Make the remote playlist `playlist_name` hold exactly `desired`.
///
/// Remote identities are resolved before the first mutation, so an ambiguous
/// track, or an unmatched one the client cannot add, fails the playlist
/// without touching it. A second run with the same tracks performs no
/// mutations.
pub async fn reconcile<C>(
    playlist_name: &str,
    desired: &[Track],
    client: &C,
    options: ReconcileOptions,
) -> Result<ReconcileResult>
where
    C: RemotePlaylistClient + ?Sized,
{
    let mut resolved = Vec::with_capacity(desired.len());
    for track in desired {
        let id = client.find_remote_id(track).await?;
        if id.is_none() {
            log::debug!("No remote match for '{}' ({})", track.title, track.path);
        }
        resolved.push((track, id));
    }

    if !options.skip_unmatched && !client.adds_unmatched() {
        let missing: Vec<&str> = resolved
            .iter()
            .filter(|(_, id)| id.is_none())
            .map(|(track, _)| track.title.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::remote(format!(
                "{} track(s) not in the remote library: {}",
                missing.len(),
                missing.join(", ")
            )));
        }
    }

    let mut state = ReconcileState::Absent;
    let playlist = if client.playlist_exists(playlist_name).await? {
        let playlist = client.get_playlist(playlist_name).await?;
        transition(playlist_name, &mut state, ReconcileState::Present);
        playlist
    } else {
        log::info!("Creating remote playlist '{}'", playlist_name);
        let playlist = client.create_playlist(playlist_name).await?;
        transition(playlist_name, &mut state, ReconcileState::Created);
        playlist
    };

    let current = client.get_playlist_track_ids(&playlist).await?;
    log::info!(
        "Remote playlist '{}' currently has {} tracks, {} desired",
        playlist_name,
        current.len(),
        desired.len()
    );

    let mut result = ReconcileResult {
        state,
        created: state == ReconcileState::Created,
        kept: 0,
        added: 0,
        removed: 0,
        unmatched: Vec::new(),
    };
    let mut keep: HashSet<RemoteTrackId> = HashSet::with_capacity(desired.len());

    for (track, id) in resolved {
        match id {
            Some(id) if current.contains(&id) => {
                keep.insert(id);
                result.kept += 1;
            }
            // Listed twice locally and already added above
            Some(id) if keep.contains(&id) => {}
            None if options.skip_unmatched => {
                log::warn!(
                    "Skipping '{}': not found in remote library ({})",
                    track.title,
                    track.path
                );
                result.unmatched.push(track.path.clone());
            }
            _ => {
                let added = client.add_track(&playlist, track).await?;
                log::info!("Added '{}' to '{}' (id: {})", track.title, playlist_name, added);
                keep.insert(added);
                result.added += 1;
            }
        }
    }

    let mut stale: Vec<&RemoteTrackId> = current.difference(&keep).collect();
    stale.sort();
    for id in stale {
        client.remove_track(&playlist, id).await?;
        log::info!("Removed id {} from '{}'", id, playlist_name);
        result.removed += 1;
    }

    transition(playlist_name, &mut state, ReconcileState::Reconciled);
    result.state = state;

    log::info!(
        "Reconciled '{}': {} kept, {} added, {} removed, {} unmatched",
        playlist_name,
        result.kept,
        result.added,
        result.removed,
        result.unmatched.len()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::remote::{MockRemotePlaylistClient, RemotePlaylist};
    use crate::test_utils::{FakeRemote, track};

    fn tracks(titles: &[&str]) -> Vec<Track> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| track(title, i))
            .collect()
    }

    #[tokio::test]
    async fn test_adds_missing_and_removes_stale() {
        let remote = FakeRemote::with_library(&["A", "B", "C", "D"]);
        remote.seed_playlist("Mix", &["A", "C", "D"]);

        let result = reconcile(
            "Mix",
            &tracks(&["A", "B", "C"]),
            &remote,
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.state, ReconcileState::Reconciled);
        assert!(!result.created);
        assert_eq!((result.kept, result.added, result.removed), (2, 1, 1));
        assert_eq!(remote.added(), vec!["B"]);
        assert_eq!(remote.removed(), vec!["D"]);
        assert_eq!(remote.playlist("Mix"), vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let remote = FakeRemote::with_library(&["A", "B", "C", "D"]);
        remote.seed_playlist("Mix", &["A", "C", "D"]);
        let desired = tracks(&["A", "B", "C"]);

        reconcile("Mix", &desired, &remote, ReconcileOptions::default())
            .await
            .unwrap();
        let mutations = remote.mutation_count();

        let second = reconcile("Mix", &desired, &remote, ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(second.mutations(), 0);
        assert_eq!(second.kept, 3);
        assert_eq!(remote.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_absent_playlist_is_created() {
        let remote = FakeRemote::with_library(&["A", "B"]);

        let result = reconcile(
            "New",
            &tracks(&["A", "B"]),
            &remote,
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert!(result.created);
        assert_eq!(result.added, 2);
        assert_eq!(remote.playlist("New"), vec!["A", "B"]);

        let again = reconcile(
            "New",
            &tracks(&["A", "B"]),
            &remote,
            ReconcileOptions::default(),
        )
        .await
        .unwrap();
        assert!(!again.created);
        assert_eq!(again.mutations(), 0);
    }

    #[tokio::test]
    async fn test_empty_desired_clears_playlist() {
        let remote = FakeRemote::with_library(&["A", "B"]);
        remote.seed_playlist("Old", &["A", "B"]);

        let result = reconcile("Old", &[], &remote, ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(result.removed, 2);
        assert!(remote.playlist("Old").is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_desired_track_added_once() {
        let remote = FakeRemote::with_library(&["A"]);
        remote.seed_playlist("Dupes", &[]);

        let result = reconcile(
            "Dupes",
            &tracks(&["A", "A"]),
            &remote,
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.added, 1);
        assert_eq!(remote.playlist("Dupes"), vec!["A"]);
    }

    #[tokio::test]
    async fn test_ambiguous_match_fails_before_any_mutation() {
        let mut client = MockRemotePlaylistClient::new();
        client
            .expect_find_remote_id()
            .returning(|t| Err(SyncError::remote(format!("'{}' matches 2 tracks", t.title))));
        client.expect_playlist_exists().never();
        client.expect_create_playlist().never();
        client.expect_add_track().never();
        client.expect_remove_track().never();

        let result = reconcile(
            "Mix",
            &tracks(&["A"]),
            &client,
            ReconcileOptions::default(),
        )
        .await;

        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(SyncError::RemoteSync { .. })));
    }

    #[tokio::test]
    async fn test_unmatched_track_is_added() {
        let mut client = MockRemotePlaylistClient::new();
        client.expect_find_remote_id().returning(|_| Ok(None));
        client.expect_adds_unmatched().return_const(true);
        client.expect_playlist_exists().returning(|_| Ok(true));
        client.expect_get_playlist().returning(|name| {
            Ok(RemotePlaylist {
                id: "10".into(),
                title: name.to_string(),
            })
        });
        client
            .expect_get_playlist_track_ids()
            .returning(|_| Ok(HashSet::new()));
        client
            .expect_add_track()
            .times(1)
            .returning(|_, _| Ok(RemoteTrackId::from("77")));
        client.expect_remove_track().never();

        let result = reconcile(
            "Mix",
            &tracks(&["A"]),
            &client,
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.added, 1);
    }

    #[tokio::test]
    async fn test_unaddable_track_fails_before_any_mutation() {
        let remote = FakeRemote::with_library(&["A", "B", "D"]);
        remote.seed_playlist("Mix", &["D"]);
        remote.refuse_unmatched();
        let desired = tracks(&["A", "Missing", "B"]);

        for _ in 0..2 {
            let result = reconcile("Mix", &desired, &remote, ReconcileOptions::default()).await;

            match result {
                Err(SyncError::RemoteSync { reason }) => assert!(reason.contains("Missing")),
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(remote.mutation_count(), 0);
            assert_eq!(remote.playlist("Mix"), vec!["D"]);
        }

        let result = reconcile(
            "Mix",
            &desired,
            &remote,
            ReconcileOptions {
                skip_unmatched: true,
            },
        )
        .await
        .unwrap();

        assert_eq!((result.added, result.removed), (2, 1));
        assert_eq!(result.unmatched, vec!["C:\\Music\\Missing.mp3"]);
        assert_eq!(remote.playlist("Mix"), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_skip_unmatched_reports_missing() {
        let remote = FakeRemote::with_library(&["A"]);
        remote.seed_playlist("Mix", &["A"]);

        let result = reconcile(
            "Mix",
            &tracks(&["A", "Unknown"]),
            &remote,
            ReconcileOptions {
                skip_unmatched: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(result.mutations(), 0);
        assert_eq!(result.unmatched, vec!["C:\\Music\\Unknown.mp3"]);
    }

    #[tokio::test]
    async fn test_failed_add_propagates() {
        let remote = FakeRemote::with_library(&["A"]);
        remote.seed_playlist("Mix", &[]);
        remote.fail_adds();

        let result = reconcile(
            "Mix",
            &tracks(&["A"]),
            &remote,
            ReconcileOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(SyncError::RemoteSync { .. })));
    }
}
