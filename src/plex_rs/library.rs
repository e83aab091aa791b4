use color_eyre::eyre::{Result, bail};
use reqwest::Method;
use serde::Deserialize;

use crate::plex_rs::{PlexApi, PlexMediaContainer, PlexResponse};

/* ---------- Library sections ---------- */

/// `MediaContainer` for `/library/sections` which returns a `Directory` list.
#[derive(Debug, Deserialize)]
pub struct PlexLibrarySections {
    #[serde(rename = "Directory", default)]
    pub directories: Vec<PlexLibrarySection>,
}

/// A Plex library section.
///
/// Notes
/// - `key` is the library section id.
/// - Music libraries have `section_type == "artist"`.
#[derive(Debug, Deserialize)]
pub struct PlexLibrarySection {
    pub key: String,
    #[serde(rename = "type")]
    pub section_type: String,
}

/// Find the first music library section id.
pub fn find_music_section_id(sections: &[PlexLibrarySection]) -> Option<&str> {
    sections
        .iter()
        .find(|s| s.section_type == "artist")
        .map(|s| s.key.as_str())
}

/* ---------- Tracks ---------- */

/// A music track item returned from `/library/sections/{id}/all?type=10`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlexLibraryTrack {
    #[serde(rename = "ratingKey")]
    pub rating_key: String,

    pub title: String,

    /// Album artist.
    #[serde(rename = "grandparentTitle", default)]
    pub artist: Option<String>,

    /// Track artist, when it differs from the album artist.
    #[serde(rename = "originalTitle", default)]
    pub track_artist: Option<String>,

    #[serde(rename = "parentTitle", default)]
    pub album: Option<String>,

    #[serde(rename = "Media", default)]
    pub media: Vec<PlexMedia>,
}

/// Media element containing Part information with file paths
#[derive(Debug, Clone, Deserialize)]
pub struct PlexMedia {
    #[serde(rename = "Part", default)]
    pub parts: Vec<PlexPart>,
}

/// Part element containing the actual file path
#[derive(Debug, Clone, Deserialize)]
pub struct PlexPart {
    /// Absolute path to the media file on the server's disk
    pub file: String,
}

impl PlexLibraryTrack {
    /// File paths of every media part of this track.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.media
            .iter()
            .flat_map(|m| m.parts.iter())
            .map(|p| p.file.as_str())
    }
}

impl PlexApi {
    /// Endpoint: `GET /library/sections`
    pub async fn get_library_sections(&self) -> Result<Vec<PlexLibrarySection>> {
        let url = self.base_url.join("library/sections")?;
        let res: PlexResponse<PlexLibrarySections> = self
            .send_json(self.request(Method::GET, url), "library sections")
            .await?;
        Ok(res.media_container.directories)
    }

    pub async fn music_section_id(&self) -> Result<String> {
        let sections = self.get_library_sections().await?;
        match find_music_section_id(&sections) {
            Some(id) => Ok(id.to_string()),
            None => bail!("No music library section found on Plex server"),
        }
    }

    /// Fetch one page of tracks from a music section.
    ///
    /// Pagination
    /// - `start` is the offset (`X-Plex-Container-Start`).
    /// - `size` is the page size (`X-Plex-Container-Size`).
    pub async fn get_tracks_page(
        &self,
        section_id: &str,
        start: u32,
        size: u32,
    ) -> Result<PlexMediaContainer<PlexLibraryTrack>> {
        let url = self
            .base_url
            .join(&format!("library/sections/{}/all?type=10", section_id))?;

        let request = self
            .request(Method::GET, url)
            .header("X-Plex-Container-Start", start.to_string())
            .header("X-Plex-Container-Size", size.to_string());
        let res: PlexResponse<PlexMediaContainer<PlexLibraryTrack>> =
            self.send_json(request, "library tracks page").await?;

        Ok(res.media_container)
    }
}

/// Offset of the next page, or `None` when `page` was the last one.
///
/// Stops on an empty page, or once `totalSize` tracks were fetched when Plex reports it.
pub fn next_page_start(fetched: u32, page: &PlexMediaContainer<PlexLibraryTrack>) -> Option<u32> {
    if page.metadata.is_empty() {
        return None;
    }
    match page.total_size {
        Some(total) if fetched >= total => None,
        _ => Some(fetched),
    }
}
