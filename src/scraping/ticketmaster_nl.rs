use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source, TBA};
use crate::utils::prefix_chars;

const URL: &str = "https://www.ticketmaster.nl/music";
const BASE: &str = "https://www.ticketmaster.nl";
const VENUE_NAME: &str = "Ticketmaster NL";
const MAX_EVENTS: usize = 500;

const DUTCH_MONTHS: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("mei", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("okt", 10),
    ("nov", 11),
    ("dec", 12),
];

pub struct TicketmasterNl;

#[async_trait]
impl Connector for TicketmasterNl {
    fn source(&self) -> Source {
        Source::Ticketmaster
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "Ticketmaster NL fetch failed");
            err
        })?;
        Ok(self.parse_document(&html, base::today_local()))
    }
}

impl TicketmasterNl {
    pub(crate) fn parse_document(&self, html: &str, today: NaiveDate) -> Vec<Event> {
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| a.href.contains("/event/") || a.href.contains("/music/"))
            .filter(|a| a.href.trim_matches('/').rsplit('/').next() != Some("music"))
            .filter(|a| a.text.chars().count() >= 2)
            .map(|a| {
                Event::new(
                    Source::Ticketmaster,
                    a.text.clone(),
                    VENUE_NAME,
                    prefix_chars(&a.text, 50),
                    normalize_date(&a.text, today),
                    a.url,
                )
            })
            .collect();
        base::dedupe_by_url(events, Some(MAX_EVENTS))
    }
}

fn normalize_date(text: &str, today: NaiveDate) -> String {
    base::normalize_numeric_date(text)
        .or_else(|| base::normalize_month_mention(text, &DUTCH_MONTHS, r"\s*", today))
        .unwrap_or_else(|| TBA.to_string())
}
