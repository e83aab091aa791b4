use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{self, Context};
use sea_orm::{
    ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbBackend, FromQueryResult,
    Statement, Value,
};

use crate::error::Result;
use crate::library::filter::Predicate;

/// MediaMonkey declares its text columns with this custom collation.
const MEDIAMONKEY_COLLATION: &str = "IUNICODE";

const PLAYLISTS_SQL: &str = "SELECT IDPlaylist AS id, COALESCE(PlaylistName, '') AS name, \
     ParentPlaylist AS parent, IsAutoPlaylist AS auto, QueryData AS query \
     FROM Playlists ORDER BY IDPlaylist";

const TRACK_COLUMNS: &str = "Songs.ID AS id, COALESCE(Songs.SongTitle, '') AS title, \
     Songs.Artist AS artist, Songs.Album AS album, COALESCE(Songs.SongPath, '') AS path, \
     Songs.Custom1 AS custom1, Songs.Custom2 AS custom2, Songs.Custom3 AS custom3, \
     Songs.Custom4 AS custom4, Songs.IDMedia AS volume_id";

const VOLUMES_SQL: &str = "SELECT IDMedia AS id, DriveLetter AS drive_letter FROM Medias";

/* ---------- Row mappings ---------- */

#[derive(Debug, Clone, FromQueryResult)]
pub struct PlaylistRow {
    pub id: i64,
    pub name: String,
    /// MediaMonkey uses `0` for top-level playlists.
    pub parent: Option<i64>,
    pub auto: Option<i64>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct TrackRow {
    pub id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Stored without its drive, e.g. `:\Music\Artist\01 Song.mp3`.
    pub path: String,
    pub custom1: Option<String>,
    pub custom2: Option<String>,
    pub custom3: Option<String>,
    pub custom4: Option<String>,
    pub volume_id: Option<i64>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct VolumeRow {
    pub id: i64,
    pub drive_letter: Option<i64>,
}

/* ---------- Connection ---------- */

/// Read-only handle on a MediaMonkey library database.
///
/// A sync session owns exactly one of these and must [`Database::close`] it.
pub struct Database {
    pub(crate) conn: DatabaseConnection,
}

fn compare_nocase(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl Database {
    /// Open an existing library database read-only
    pub async fn open(path: &Path) -> eyre::Result<Self> {
        log::debug!("Opening library database at: {}", path.display());

        if !path.is_file() {
            eyre::bail!("Library database not found: {}", path.display());
        }

        // The file is set on the sqlx options directly; a URL would percent-decode it
        let file = path.to_path_buf();
        let mut opt = Self::connect_options("sqlite://MM5.DB".to_string());
        opt.map_sqlx_sqlite_opts(move |opts| {
            opts.filename(&file)
                .read_only(true)
                .collation(MEDIAMONKEY_COLLATION, compare_nocase)
        });

        Self::connect_with(opt)
            .await
            .with_context(|| format!("Failed to open library database: {}", path.display()))
    }

    pub async fn connect(url: String) -> eyre::Result<Self> {
        let mut opt = Self::connect_options(url);
        opt.map_sqlx_sqlite_opts(|opts| opts.collation(MEDIAMONKEY_COLLATION, compare_nocase));
        Self::connect_with(opt).await
    }

    fn connect_options(url: String) -> ConnectOptions {
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);
        opt
    }

    async fn connect_with(opt: ConnectOptions) -> eyre::Result<Self> {
        let conn = SeaDatabase::connect(opt)
            .await
            .wrap_err("Failed to connect to library database")?;

        Ok(Self { conn })
    }

    pub async fn close(self) -> eyre::Result<()> {
        log::debug!("Closing library database");
        self.conn
            .close()
            .await
            .wrap_err("Failed to close library database")
    }

    pub async fn playlists(&self) -> Result<Vec<PlaylistRow>> {
        let rows = PlaylistRow::find_by_statement(Statement::from_string(
            DbBackend::Sqlite,
            PLAYLISTS_SQL,
        ))
        .all(&self.conn)
        .await?;
        Ok(rows)
    }

    /// Run a translated autoplaylist predicate against `Songs`, ordered by song id.
    pub async fn query_tracks(&self, predicate: &Predicate) -> Result<Vec<TrackRow>> {
        let (filter, values) = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM Songs WHERE {} ORDER BY Songs.ID",
            TRACK_COLUMNS, filter
        );
        log::debug!("Track query: {} {:?}", sql, values);

        let rows = TrackRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            values,
        ))
        .all(&self.conn)
        .await?;
        Ok(rows)
    }

    /// Explicit membership of a static playlist, in playlist order.
    pub async fn playlist_members(&self, playlist_id: i64) -> Result<Vec<TrackRow>> {
        let sql = format!(
            "SELECT {} FROM PlaylistSongs JOIN Songs ON Songs.ID = PlaylistSongs.IDSong \
             WHERE PlaylistSongs.IDPlaylist = ? \
             ORDER BY PlaylistSongs.SongOrder, PlaylistSongs.IDPlaylistSong",
            TRACK_COLUMNS
        );

        let rows = TrackRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            [Value::from(playlist_id)],
        ))
        .all(&self.conn)
        .await?;
        Ok(rows)
    }

    pub async fn volumes(&self) -> Result<Vec<VolumeRow>> {
        let rows =
            VolumeRow::find_by_statement(Statement::from_string(DbBackend::Sqlite, VOLUMES_SQL))
                .all(&self.conn)
                .await?;
        Ok(rows)
    }
}
