use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use sea_orm::ConnectionTrait;

use crate::database::Database;
use crate::error::{Result, SyncError};
use crate::library::Track;
use crate::ports::remote::{RemotePlaylist, RemotePlaylistClient, RemoteTrackId};

/// In-memory library database loaded with `schema.sql`.
pub async fn test_db() -> Database {
    let db = Database::connect("sqlite::memory:".to_string())
        .await
        .unwrap();

    let schema = include_str!("../schema.sql");
    for stmt in schema.split(';') {
        let trimmed = stmt.trim();
        if !trimmed.is_empty() {
            // Strip comment-only lines
            let without_comments: String = trimmed
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let without_comments = without_comments.trim();
            if !without_comments.is_empty() {
                db.conn
                    .execute_unprepared(without_comments)
                    .await
                    .unwrap_or_else(|e| {
                        panic!(
                            "Failed to execute SQL: {}\nStatement: {}",
                            e, without_comments
                        )
                    });
            }
        }
    }

    db
}

pub fn track(title: &str, position: usize) -> Track {
    Track {
        title: title.to_string(),
        artist: Some(format!("{} Artist", title)),
        album: Some(format!("{} Album", title)),
        path: format!("C:\\Music\\{}.mp3", title),
        playlist_id: 1,
        custom: [None, None, None, None],
        volume_id: 1,
        position,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mutation {
    Create(String),
    Add(String),
    Remove(String),
}

/// Stateful in-memory remote store. Remote ids are track titles.
#[derive(Default)]
pub struct FakeRemote {
    library: Mutex<HashMap<String, RemoteTrackId>>,
    playlists: Mutex<HashMap<String, Vec<RemoteTrackId>>>,
    mutations: Mutex<Vec<Mutation>>,
    fail_adds: AtomicBool,
    refuse_unmatched: AtomicBool,
}

impl FakeRemote {
    pub fn with_library(titles: &[&str]) -> Self {
        let remote = Self::default();
        remote.library.lock().unwrap().extend(
            titles
                .iter()
                .map(|t| (t.to_string(), RemoteTrackId::from(*t))),
        );
        remote
    }

    pub fn seed_playlist(&self, name: &str, titles: &[&str]) {
        self.playlists.lock().unwrap().insert(
            name.to_string(),
            titles.iter().map(|t| RemoteTrackId::from(*t)).collect(),
        );
    }

    pub fn fail_adds(&self) {
        self.fail_adds.store(true, Ordering::SeqCst);
    }

    /// Reject adds of tracks missing from the library, as Plex does.
    pub fn refuse_unmatched(&self) {
        self.refuse_unmatched.store(true, Ordering::SeqCst);
    }

    pub fn playlist(&self, name: &str) -> Vec<String> {
        self.playlists
            .lock()
            .unwrap()
            .get(name)
            .map(|ids| ids.iter().map(|id| id.0.clone()).collect())
            .unwrap_or_default()
    }

    pub fn added(&self) -> Vec<String> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Mutation::Add(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Mutation::Remove(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Mutation::Create(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl RemotePlaylistClient for FakeRemote {
    async fn playlist_exists(&self, name: &str) -> Result<bool> {
        Ok(self.playlists.lock().unwrap().contains_key(name))
    }

    async fn get_playlist(&self, name: &str) -> Result<RemotePlaylist> {
        if self.playlists.lock().unwrap().contains_key(name) {
            Ok(RemotePlaylist {
                id: name.to_string(),
                title: name.to_string(),
            })
        } else {
            Err(SyncError::not_found("remote playlist", name))
        }
    }

    async fn create_playlist(&self, name: &str) -> Result<RemotePlaylist> {
        self.playlists
            .lock()
            .unwrap()
            .insert(name.to_string(), Vec::new());
        self.mutations
            .lock()
            .unwrap()
            .push(Mutation::Create(name.to_string()));
        Ok(RemotePlaylist {
            id: name.to_string(),
            title: name.to_string(),
        })
    }

    async fn get_playlist_track_ids(
        &self,
        playlist: &RemotePlaylist,
    ) -> Result<HashSet<RemoteTrackId>> {
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .get(&playlist.id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_track(&self, playlist: &RemotePlaylist, track: &Track) -> Result<RemoteTrackId> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(SyncError::remote(format!("cannot add '{}'", track.title)));
        }
        if !self.adds_unmatched() && !self.library.lock().unwrap().contains_key(&track.title) {
            return Err(SyncError::remote(format!(
                "'{}' is not in the library",
                track.title
            )));
        }
        // Adding makes the track known to the remote library
        let id = self
            .library
            .lock()
            .unwrap()
            .entry(track.title.clone())
            .or_insert_with(|| RemoteTrackId::from(track.title.as_str()))
            .clone();
        self.playlists
            .lock()
            .unwrap()
            .entry(playlist.id.clone())
            .or_default()
            .push(id.clone());
        self.mutations
            .lock()
            .unwrap()
            .push(Mutation::Add(id.0.clone()));
        Ok(id)
    }

    async fn remove_track(&self, playlist: &RemotePlaylist, id: &RemoteTrackId) -> Result<()> {
        if let Some(ids) = self.playlists.lock().unwrap().get_mut(&playlist.id) {
            ids.retain(|existing| existing != id);
        }
        self.mutations
            .lock()
            .unwrap()
            .push(Mutation::Remove(id.0.clone()));
        Ok(())
    }

    fn adds_unmatched(&self) -> bool {
        !self.refuse_unmatched.load(Ordering::SeqCst)
    }

    async fn find_remote_id(&self, track: &Track) -> Result<Option<RemoteTrackId>> {
        Ok(self.library.lock().unwrap().get(&track.title).cloned())
    }
}
