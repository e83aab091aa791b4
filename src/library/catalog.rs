use std::collections::{HashMap, HashSet};

use crate::database::{Database, PlaylistRow};
use crate::error::Result;
use crate::library::Playlist;

/// Every playlist in the library, keyed by name, for one sync session.
#[derive(Debug, Default)]
pub struct PlaylistCatalog {
    playlists: HashMap<String, Playlist>,
    names_by_id: HashMap<i64, String>,
}

impl PlaylistCatalog {
    pub async fn load_all(db: &Database) -> Result<Self> {
        let rows = db.playlists().await?;
        let catalog = Self::from_rows(rows);
        log::info!("Loaded {} playlists from library", catalog.len());
        Ok(catalog)
    }

    /// Build the catalog. A later row with an already seen name replaces the earlier one.
    pub fn from_rows(rows: Vec<PlaylistRow>) -> Self {
        let mut catalog = Self::default();

        for row in rows {
            let auto = row.auto.unwrap_or(0) != 0;
            let base = Playlist::new(row.id, row.name).with_parent(row.parent.filter(|p| *p != 0));
            let playlist = match row.query {
                Some(query) if auto => base.with_query(query),
                _ => Playlist { auto, ..base },
            };

            catalog
                .names_by_id
                .insert(playlist.id, playlist.name.clone());
            if let Some(previous) = catalog
                .playlists
                .insert(playlist.name.clone(), playlist.clone())
            {
                log::warn!(
                    "Duplicate playlist name '{}': id {} replaces id {}",
                    playlist.name,
                    playlist.id,
                    previous.id
                );
            }
        }

        catalog
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Playlist> {
        self.playlists.get(name)
    }

    /// A static playlist that other playlists nest under. It may still hold tracks.
    pub fn is_folder(&self, playlist: &Playlist) -> bool {
        !playlist.auto
            && self
                .playlists
                .values()
                .any(|p| p.parent == Some(playlist.id))
    }

    /// All playlist names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.playlists.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of the playlists to sync. An empty selection means every playlist.
    pub fn select(&self, wanted: &[String]) -> Vec<String> {
        if wanted.is_empty() {
            return self.names().into_iter().map(str::to_string).collect();
        }

        let mut seen = HashSet::new();
        wanted
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter(|name| {
                let found = self.playlists.contains_key(name.as_str());
                if !found {
                    log::warn!("Playlist '{}' is not in the library", name);
                }
                found
            })
            .cloned()
            .collect()
    }

    /// Name used on the remote side, optionally prefixed by its parents (`Moods - Calm`).
    pub fn display_name(&self, playlist: &Playlist, prepend_parent: bool) -> String {
        if !prepend_parent {
            return playlist.name.clone();
        }

        let mut parts = vec![playlist.name.as_str()];
        let mut visited = HashSet::from([playlist.id]);
        let mut parent = playlist.parent;

        while let Some(id) = parent {
            if !visited.insert(id) {
                log::warn!("Playlist '{}' has a cyclic parent chain", playlist.name);
                break;
            }
            let Some(name) = self.names_by_id.get(&id) else {
                break;
            };
            parts.push(name);
            parent = self.playlists.get(name).and_then(|p| p.parent);
        }

        parts.reverse();
        parts.join(" - ")
    }
}
