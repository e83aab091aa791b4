pub mod catalog;
pub mod filter;
pub mod materialize;
pub mod volumes;

/// A playlist as stored in the MediaMonkey library.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    /// Id of the enclosing playlist folder, if nested.
    pub parent: Option<i64>,
    /// Auto playlists compute their membership from `query`.
    pub auto: bool,
    /// Serialized filter document, present only for auto playlists.
    pub query: Option<String>,
    /// Empty until materialized.
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            auto: false,
            query: None,
            tracks: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: Option<i64>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.auto = true;
        self.query = Some(query.into());
        self
    }
}

/// A track resolved against its playlist, with an absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub path: String,
    pub playlist_id: i64,
    /// MediaMonkey's free-form Custom1..Custom4 tags.
    pub custom: [Option<String>; 4],
    pub volume_id: i64,
    /// Zero-based position within the playlist.
    pub position: usize,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>4}. ", self.position + 1)?;
        if let Some(artist) = &self.artist {
            write!(f, "{} - ", artist)?;
        }
        write!(f, "{} [{}]", self.title, self.path)
    }
}
