use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source, TBA};
use crate::utils::prefix_chars;

const URL: &str = "https://www.afaslive.nl/en/agenda";
const BASE: &str = "https://www.afaslive.nl";
const VENUE_NAME: &str = "AFAS Live";

// "Monday 16 February 2026"
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s+(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})",
    )
    .expect("afas live date regex")
});

pub struct AfasLive;

#[async_trait]
impl Connector for AfasLive {
    fn source(&self) -> Source {
        Source::AfasLive
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "AFAS Live fetch failed");
            err
        })?;
        Ok(self.parse_document(&html))
    }
}

impl AfasLive {
    pub(crate) fn parse_document(&self, html: &str) -> Vec<Event> {
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| a.href.contains("/en/agenda/") && !a.href.ends_with("/agenda"))
            .filter(|a| a.text.chars().count() >= 2)
            .map(|a| {
                Event::new(
                    Source::AfasLive,
                    a.text.clone(),
                    VENUE_NAME,
                    prefix_chars(&a.text, 50),
                    normalize_date(&a.text),
                    a.url,
                )
            })
            .collect();
        base::dedupe_by_url(events, None)
    }
}

fn normalize_date(text: &str) -> String {
    let Some(caps) = DATE_RE.captures(text) else {
        return TBA.to_string();
    };
    let (Ok(day), Some(month), Ok(year)) = (
        caps[1].parse::<u32>(),
        base::month_from_name(&caps[2]),
        caps[3].parse::<i32>(),
    ) else {
        return TBA.to_string();
    };
    base::ymd_or_tba(year, month, day)
}
