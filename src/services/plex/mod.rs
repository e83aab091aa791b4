pub mod client;

use std::collections::{BTreeSet, HashMap};

use unaccent::unaccent;

use crate::error::{Result, SyncError};
use crate::library::Track;
use crate::plex_rs::library::PlexLibraryTrack;
use crate::ports::remote::RemoteTrackId;

/// Lowercase, accent-free, whitespace-collapsed form used for matching.
fn normalize(value: &str) -> String {
    unaccent(value)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity of a track by its tags: `title|artist|album`.
pub fn fingerprint(title: &str, artist: Option<&str>, album: Option<&str>) -> String {
    format!(
        "{}|{}|{}",
        normalize(title),
        normalize(artist.unwrap_or_default()),
        normalize(album.unwrap_or_default())
    )
}

/// Extracts and normalizes the last 3 path components (artist/album/track) for matching.
///
/// Both `/` and `\` separate components, so a Windows library path and the
/// Plex server's path of the same file produce the same key. The track name
/// loses its extension and a leading track number ("01 ", "1 - ").
///
/// Returns None if the path doesn't have at least 3 components.
pub fn normalize_path_key(file_path: &str) -> Option<String> {
    let components: Vec<&str> = file_path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .collect();

    if components.len() < 3 {
        return None;
    }

    let artist = normalize(components[components.len() - 3]);
    let album = normalize(components[components.len() - 2]);
    let file_name = components[components.len() - 1];

    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let track_name = stem
        .trim_start_matches(char::is_numeric)
        .trim_start_matches(' ')
        .trim_start_matches('-')
        .trim_start_matches(' ');

    Some(format!("{}/{}/{}", artist, album, normalize(track_name)))
}

/// Rating keys of the Plex music library, indexed for track lookup.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    by_fingerprint: HashMap<String, BTreeSet<String>>,
    by_path: HashMap<String, BTreeSet<String>>,
    len: usize,
}

impl LibraryIndex {
    pub fn build(tracks: &[PlexLibraryTrack]) -> Self {
        let mut index = Self::default();
        for track in tracks {
            index.insert(track);
        }
        index
    }

    fn insert(&mut self, track: &PlexLibraryTrack) {
        let artist = track.track_artist.as_deref().or(track.artist.as_deref());
        let key = fingerprint(&track.title, artist, track.album.as_deref());
        self.by_fingerprint
            .entry(key)
            .or_default()
            .insert(track.rating_key.clone());

        for path in track.file_paths() {
            if let Some(key) = normalize_path_key(path) {
                self.by_path
                    .entry(key)
                    .or_default()
                    .insert(track.rating_key.clone());
            }
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The single library track matching `track`, if any.
    ///
    /// Tags are tried first and the path narrows a tag collision. Several
    /// candidates left after narrowing is an error.
    pub fn lookup(&self, track: &Track) -> Result<Option<RemoteTrackId>> {
        let empty = BTreeSet::new();
        let by_tags = self
            .by_fingerprint
            .get(&fingerprint(
                &track.title,
                track.artist.as_deref(),
                track.album.as_deref(),
            ))
            .unwrap_or(&empty);
        let by_path = normalize_path_key(&track.path)
            .and_then(|key| self.by_path.get(&key))
            .unwrap_or(&empty);

        let candidates: BTreeSet<&String> = match (by_tags.len(), by_path.len()) {
            (0, _) => by_path.iter().collect(),
            (1, _) => by_tags.iter().collect(),
            _ => {
                let narrowed: BTreeSet<&String> = by_tags.intersection(by_path).collect();
                if narrowed.is_empty() {
                    by_tags.iter().collect()
                } else {
                    narrowed
                }
            }
        };

        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.len()) {
            (None, _) => Ok(None),
            (Some(key), 0) => Ok(Some(RemoteTrackId(key.clone()))),
            (Some(_), rest) => Err(SyncError::remote(format!(
                "'{}' ({}) matches {} tracks in the Plex library",
                track.title,
                track.path,
                rest + 1
            ))),
        }
    }
}
