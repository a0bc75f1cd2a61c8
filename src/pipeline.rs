//! One full run: artists → concurrent venue fetch → match → dedupe → notify → summary.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::artists::{self, ArtistListError, ArtistListSource, HttpArtistList};
use crate::db::{self, keys, Store};
use crate::dedupe;
use crate::matcher;
use crate::models::{Event, Match, RunReport, RunStatus, RunSummary};
use crate::notify::{self, Notifier};
use crate::scraping::Connector;

/// More new matches than this are announced with a summary message first.
pub const DIGEST_THRESHOLD: usize = 10;

pub const MISSING_URL_ERROR: &str = "artists_list_url not set";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a run is already in progress")]
    RunInProgress,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub struct Pipeline {
    store: Arc<Store>,
    connectors: Vec<Arc<dyn Connector>>,
    artist_source: Arc<dyn ArtistListSource>,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, connectors: Vec<Arc<dyn Connector>>) -> Self {
        Self::with_artist_source(store, connectors, Arc::new(HttpArtistList::default()))
    }

    pub fn with_artist_source(
        store: Arc<Store>,
        connectors: Vec<Arc<dyn Connector>>,
        artist_source: Arc<dyn ArtistListSource>,
    ) -> Self {
        Self {
            store,
            connectors,
            artist_source,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn artist_source(&self) -> &dyn ArtistListSource {
        self.artist_source.as_ref()
    }

    /// Executes one run. A dry run records nothing in history and sends nothing
    /// except through `notifier`, which callers pass as a no-op sink.
    ///
    /// Returns `RunInProgress` without side effects when another run holds the guard.
    pub async fn run(
        &self,
        notifier: &dyn Notifier,
        dry_run: bool,
    ) -> Result<RunReport, PipelineError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress)?;
        info!(dry_run, "run started");
        let report = self.run_locked(notifier, dry_run).await?;
        info!(
            status = %report.status,
            events = report.events_scanned_total,
            matches = report.matches_total,
            sent = report.notifications_sent,
            errors = report.errors.len(),
            "run finished"
        );
        Ok(report)
    }

    async fn run_locked(
        &self,
        notifier: &dyn Notifier,
        dry_run: bool,
    ) -> Result<RunReport, PipelineError> {
        let started_at = db::now_rfc3339();

        let url = self
            .store
            .get_setting(keys::ARTISTS_LIST_URL)?
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        let Some(url) = url else {
            warn!("no artists list url configured");
            return self.fail_early(&started_at, MISSING_URL_ERROR);
        };

        let (artists, artists_fetch_error) =
            match artists::fetch_artists(self.artist_source.as_ref(), &self.store, &url).await {
                Ok(list) => (list, None),
                Err(ArtistListError::Storage(err)) => return Err(err.into()),
                Err(err) => {
                    let message = err.to_string();
                    let cached = artists::get_cached_artists(&self.store)?;
                    if cached.is_empty() {
                        warn!(error = %message, "artists list unavailable and no cache");
                        return self.fail_early(&started_at, &message);
                    }
                    warn!(error = %message, cached = cached.len(), "using cached artists list");
                    if let Err(send_err) = notifier
                        .send(&notify::format_stale_artists_warning(&message))
                        .await
                    {
                        debug!(error = %send_err, "stale list warning not delivered");
                    }
                    (cached, Some(message))
                }
            };

        let mut errors = Vec::new();
        let events = self.fetch_all(&mut errors).await;
        let events_scanned_total = events.len();
        info!(
            events = events_scanned_total,
            artists = artists.len(),
            "fetched events"
        );

        let matches = matcher::match_events(&events, &artists);
        let matches_total = matches.len();
        info!(matches = matches_total, "matched before dedupe");

        let new_matches = dedupe::filter_new(&self.store, matches, dry_run)?;
        info!(new = new_matches.len(), "new matches after dedupe");

        let notifications_sent = if dry_run {
            0
        } else {
            deliver(notifier, &new_matches, &mut errors).await
        };

        let status = if errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        };
        let summary = RunSummary {
            events_scanned_total,
            matches_total,
            notifications_sent,
            errors,
        };
        let summary_json = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
        self.persist_last_run(&db::now_rfc3339(), status, &summary_json)?;

        Ok(RunReport {
            status,
            events_scanned_total,
            matches_total,
            notifications_sent,
            errors: summary.errors,
            artists_fetch_error,
            new_matches,
        })
    }

    /// Spawns every connector at once and waits for all of them. Failed or
    /// panicked sources add an error and no events; order follows the registry.
    async fn fetch_all(&self, errors: &mut Vec<String>) -> Vec<Event> {
        let handles = self.connectors.iter().map(|connector| {
            let connector = Arc::clone(connector);
            tokio::spawn(async move { connector.fetch_events().await })
        });
        let results = join_all(handles).await;

        let mut pool = Vec::new();
        for (connector, result) in self.connectors.iter().zip(results) {
            let source = connector.source();
            match result {
                Ok(Ok(mut events)) => {
                    info!(source = %source, events = events.len(), "source fetched");
                    pool.append(&mut events);
                }
                Ok(Err(err)) => {
                    warn!(source = %source, error = %err, "source failed");
                    errors.push(format!("{source}: {err}"));
                }
                Err(join_err) => {
                    warn!(source = %source, error = %join_err, "source task aborted");
                    errors.push(format!("{source}: {join_err}"));
                }
            }
        }
        pool
    }

    fn fail_early(&self, started_at: &str, error: &str) -> Result<RunReport, PipelineError> {
        let summary_json = json!({ "error": error }).to_string();
        self.persist_last_run(started_at, RunStatus::Failure, &summary_json)?;
        Ok(RunReport {
            status: RunStatus::Failure,
            events_scanned_total: 0,
            matches_total: 0,
            notifications_sent: 0,
            errors: vec![error.to_string()],
            artists_fetch_error: Some(error.to_string()),
            new_matches: Vec::new(),
        })
    }

    fn persist_last_run(
        &self,
        at: &str,
        status: RunStatus,
        summary_json: &str,
    ) -> Result<(), PipelineError> {
        self.store.set_setting(keys::LAST_RUN_AT, at)?;
        self.store.set_setting(keys::LAST_RUN_STATUS, status.as_str())?;
        self.store
            .set_setting(keys::LAST_RUN_SUMMARY_JSON, summary_json)?;
        Ok(())
    }
}

/// Sends the optional digest and one message per match. Per-match failures are
/// collected; a lost digest is only logged.
async fn deliver(notifier: &dyn Notifier, matches: &[Match], errors: &mut Vec<String>) -> usize {
    if matches.len() > DIGEST_THRESHOLD {
        if let Err(err) = notifier.send(&notify::format_digest(matches.len())).await {
            warn!(error = %err, "digest not delivered");
        }
    }

    let mut sent = 0;
    for m in matches {
        match notifier
            .send(&notify::format_match(&m.artist, &m.event))
            .await
        {
            Ok(()) => sent += 1,
            Err(err) => {
                warn!(artist = %m.artist, url = %m.event.url, error = %err, "notification not delivered");
                errors.push(format!("send: {err}"));
            }
        }
    }
    sent
}
