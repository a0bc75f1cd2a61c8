use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TBA: &str = "TBA";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ticketmaster,
    Paradiso,
    Melkweg,
    AfasLive,
    ZiggoDome,
    JohanCruijffArena,
}

impl Source {
    pub fn id(&self) -> &'static str {
        match self {
            Source::Ticketmaster => "ticketmaster",
            Source::Paradiso => "paradiso",
            Source::Melkweg => "melkweg",
            Source::AfasLive => "afaslive",
            Source::ZiggoDome => "ziggodome",
            Source::JohanCruijffArena => "johancruijffarena",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Ticketmaster => "Ticketmaster NL",
            Source::Paradiso => "Paradiso",
            Source::Melkweg => "Melkweg",
            Source::AfasLive => "AFAS Live",
            Source::ZiggoDome => "Ziggo Dome",
            Source::JohanCruijffArena => "Johan Cruijff ArenA",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub source: Source,
    pub title: String,
    pub venue: String,
    pub date_raw: String,
    pub date_normalized: String, // YYYY-MM-DD or TBA
    pub url: String,
    pub status: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        source: Source,
        title: impl Into<String>,
        venue: impl Into<String>,
        date_raw: impl Into<String>,
        date_normalized: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            title: title.into(),
            venue: venue.into(),
            date_raw: date_raw.into(),
            date_normalized: date_normalized.into(),
            url: url.into(),
            status: None,
            fetched_at: Utc::now(),
        }
    }
}

/// An artist from the list paired with the event whose title mentions it.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub artist: String,
    pub event: Event,
}

impl Match {
    /// Dedup key: (artist, venue or "", normalized date or "TBA").
    pub fn key(&self) -> (String, String, String) {
        let date = if self.event.date_normalized.is_empty() {
            TBA.to_string()
        } else {
            self.event.date_normalized.clone()
        };
        (self.artist.clone(), self.event.venue.clone(), date)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationHistoryEntry {
    pub artist: String,
    pub venue: String,
    pub date_normalized: String,
    pub event_title: String,
    pub event_url: String,
    pub source: String,
    pub first_seen_at: String,
    pub notified_at: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted as `last_run_summary_json`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub events_scanned_total: usize,
    pub matches_total: usize,
    pub notifications_sent: usize,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub events_scanned_total: usize,
    pub matches_total: usize,
    pub notifications_sent: usize,
    pub errors: Vec<String>,
    pub artists_fetch_error: Option<String>,
    /// Matches that passed dedupe; a rehearsal run fills this without notifying.
    pub new_matches: Vec<Match>,
}

impl RunReport {
    pub fn errors_json(&self) -> String {
        serde_json::to_string(&self.errors).unwrap_or_else(|_| "[]".to_string())
    }
}
