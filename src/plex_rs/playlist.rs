use color_eyre::eyre::{OptionExt, Result};
use reqwest::Method;
use serde::Deserialize;

use crate::plex_rs::{PlexApi, PlexMediaContainer, PlexResponse};

/* ---------- Identity (machineIdentifier) ---------- */

/// `/identity` carries the id on the container itself, not in `Metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlexIdentity {
    #[serde(rename = "machineIdentifier")]
    pub machine_identifier: String,
}

/* ---------- Playlists ---------- */

#[derive(Debug, Clone, Deserialize)]
pub struct PlexPlaylist {
    #[serde(rename = "ratingKey")]
    pub rating_key: String,

    pub title: String,

    #[serde(rename = "playlistType")]
    pub playlist_type: String,
}

pub fn is_music_playlist(p: &PlexPlaylist) -> bool {
    p.playlist_type == "audio"
}

/// An entry of a playlist. The same `rating_key` can appear under several
/// `playlist_item_id`s when a track was added twice.
#[derive(Debug, Clone, Deserialize)]
pub struct PlexPlaylistItem {
    #[serde(rename = "ratingKey")]
    pub rating_key: String,

    #[serde(rename = "playlistItemID")]
    pub playlist_item_id: Option<u64>,
}

/// Library URI Plex expects when adding an item to a playlist.
pub fn library_item_uri(machine_identifier: &str, rating_key: &str) -> String {
    format!(
        "server://{}/com.plexapp.plugins.library/library/metadata/{}",
        machine_identifier, rating_key
    )
}

impl PlexApi {
    pub async fn get_machine_identifier(&self) -> Result<String> {
        let url = self.base_url.join("identity")?;
        let res: PlexResponse<PlexIdentity> = self
            .send_json(self.request(Method::GET, url), "Plex identity response")
            .await?;
        Ok(res.media_container.machine_identifier)
    }

    /// Endpoint: `GET /playlists?type=15` (audio playlists)
    pub async fn get_playlists(&self) -> Result<Vec<PlexPlaylist>> {
        let url = self.base_url.join("playlists?type=15")?;
        let res: PlexResponse<PlexMediaContainer<PlexPlaylist>> = self
            .send_json(self.request(Method::GET, url), "Plex playlists response")
            .await?;
        Ok(res.media_container.metadata)
    }

    /// Create an empty, non-smart audio playlist.
    pub async fn create_music_playlist(&self, title: &str) -> Result<PlexPlaylist> {
        let mut url = self.base_url.join("playlists")?;
        url.query_pairs_mut()
            .append_pair("title", title)
            .append_pair("type", "audio")
            .append_pair("smart", "0");

        let res: PlexResponse<PlexMediaContainer<PlexPlaylist>> = self
            .send_json(self.request(Method::POST, url), "create playlist response")
            .await?;

        res.media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_eyre("Create playlist response had no Metadata")
    }

    pub async fn get_playlist_items(&self, playlist_id: &str) -> Result<Vec<PlexPlaylistItem>> {
        let url = self
            .base_url
            .join(&format!("playlists/{}/items?type=10", playlist_id))?;
        let res: PlexResponse<PlexMediaContainer<PlexPlaylistItem>> = self
            .send_json(self.request(Method::GET, url), "playlist items response")
            .await?;
        Ok(res.media_container.metadata)
    }

    pub async fn add_track_to_playlist(
        &self,
        playlist_id: &str,
        machine_identifier: &str,
        rating_key: &str,
    ) -> Result<()> {
        let mut url = self
            .base_url
            .join(&format!("playlists/{}/items", playlist_id))?;
        url.query_pairs_mut()
            .append_pair("uri", &library_item_uri(machine_identifier, rating_key));

        self.send(self.request(Method::PUT, url), "add track to playlist")
            .await
    }

    pub async fn remove_playlist_item(&self, playlist_id: &str, playlist_item_id: u64) -> Result<()> {
        let url = self.base_url.join(&format!(
            "playlists/{}/items/{}",
            playlist_id, playlist_item_id
        ))?;

        self.send(self.request(Method::DELETE, url), "remove track from playlist")
            .await
    }
}
