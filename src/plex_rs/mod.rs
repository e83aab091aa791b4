use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

pub mod library;
pub mod playlist;

pub const APP_NAME: &str = "MM Playlist Sync";
pub const APP_IDENTIFIER: &str = "mm-playlist-sync";

/// Plex responses are wrapped in a top level `MediaContainer`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlexResponse<T> {
    #[serde(rename = "MediaContainer")]
    pub media_container: T,
}

/// The `MediaContainer` payload of list style endpoints.
///
/// Notes
/// - `totalSize` appears on paged requests.
/// - `metadata` defaults to an empty vec when missing (empty playlists omit it).
#[derive(Debug, Clone, Deserialize)]
pub struct PlexMediaContainer<T> {
    #[serde(rename = "totalSize", default)]
    pub total_size: Option<u32>,

    #[serde(rename = "Metadata", default = "Vec::new")]
    pub metadata: Vec<T>,
}

/// Authenticated access to one Plex Media Server.
///
/// Docs:
/// https://developer.plex.tv/pms/#section/API-Info/Authenticating-with-Plex
pub struct PlexApi {
    client: Client,
    base_url: Url,
    token: String,
}

impl PlexApi {
    /// `timeout` bounds every request, connect included.
    pub fn new(base_url: Url, token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .wrap_err("Failed to build Plex HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Plex-Token", &self.token)
            .header("X-Plex-Product", APP_NAME)
            .header("X-Plex-Client-Identifier", APP_IDENTIFIER)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        request
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
            .wrap_err_with(|| format!("Failed to deserialize {}", what))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<()> {
        request
            .send()
            .await?
            .error_for_status()
            .wrap_err_with(|| format!("Failed to {}", what))?;
        Ok(())
    }
}
