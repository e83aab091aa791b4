/// Errors raised while turning library playlists into remote playlists.
///
/// Everything below the playlist boundary returns these; the sync session
/// catches them per playlist and sorts them into the run summary.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// The filter is well formed but needs semantics the translator lacks (OR groups).
    #[error("Unsupported filter: {reason}")]
    UnsupportedFilter { reason: String },

    #[error("Cannot translate condition on `{field}`: unrecognized operator `{operator}`")]
    Translation { field: String, operator: String },

    #[error("Track path `{path}` is not rooted after volume resolution")]
    InvalidPath { path: String },

    #[error("Remote sync failed: {reason}")]
    RemoteSync { reason: String },

    /// Transient failure that survived every retry.
    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("Source database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl SyncError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            reason: reason.into(),
        }
    }

    pub fn remote(reason: impl Into<String>) -> Self {
        Self::RemoteSync {
            reason: reason.into(),
        }
    }

    /// Playlists failing this way are reported as skipped rather than failed.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFilter { .. })
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
