use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{keys, Store};
use crate::scraping::base;

#[derive(Debug, Error)]
pub enum ArtistListError {
    #[error("{0}")]
    Fetch(String),
    #[error("Artists list is empty after parsing")]
    Empty,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Any Unicode line boundary, including a bare `\r`.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}'
            | '\u{2028}' | '\u{2029}'
    )
}

/// Trims every line, drops blanks and repeats, keeps first-seen order.
pub fn parse_artist_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Where the raw artist list text comes from.
#[async_trait]
pub trait ArtistListSource: Send + Sync {
    async fn download(&self, url: &str) -> Result<String, ArtistListError>;
}

/// Plain HTTP(S) GET with the shared client; no retries.
pub struct HttpArtistList {
    client: Client,
}

impl HttpArtistList {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpArtistList {
    fn default() -> Self {
        Self::new(base::http_client().clone())
    }
}

#[async_trait]
impl ArtistListSource for HttpArtistList {
    async fn download(&self, url: &str) -> Result<String, ArtistListError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ArtistListError::Fetch(err.to_string()))?;
        response
            .text()
            .await
            .map_err(|err| ArtistListError::Fetch(err.to_string()))
    }
}

/// Fetches the live list and refreshes the cached snapshot on success.
///
/// Never reads the cache itself; falling back is the caller's decision.
pub async fn fetch_artists(
    source: &dyn ArtistListSource,
    store: &Store,
    url: &str,
) -> Result<Vec<String>, ArtistListError> {
    let body = source.download(url).await.map_err(|err| {
        warn!(url, error = %err, "artists list fetch failed");
        err
    })?;
    let artists = parse_artist_lines(&body);
    if artists.is_empty() {
        return Err(ArtistListError::Empty);
    }
    store.set_setting(keys::ARTISTS_LIST_CACHED, &artists.join("\n"))?;
    info!(url, artists = artists.len(), "artists list refreshed");
    Ok(artists)
}

/// Last successfully fetched list, or empty when nothing was ever cached.
pub fn get_cached_artists(store: &Store) -> rusqlite::Result<Vec<String>> {
    Ok(store
        .get_setting(keys::ARTISTS_LIST_CACHED)?
        .map(|raw| parse_artist_lines(&raw))
        .unwrap_or_default())
}

/// Validates a candidate list URL by fetching it; on success the URL and the
/// fresh cache are both stored.
pub async fn verify_and_store_url(
    source: &dyn ArtistListSource,
    store: &Store,
    url: &str,
) -> Result<Vec<String>, ArtistListError> {
    let artists = fetch_artists(source, store, url).await?;
    store.set_setting(keys::ARTISTS_LIST_URL, url)?;
    Ok(artists)
}
