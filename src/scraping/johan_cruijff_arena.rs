use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source, TBA};
use crate::utils::prefix_chars;

const URL: &str = "https://www.johancruijffarena.nl/en/calendar/";
const BASE: &str = "https://www.johancruijffarena.nl";
const VENUE_NAME: &str = "Johan Cruijff ArenA";
const MAX_EVENTS: usize = 300;

const MONTHS: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

pub struct JohanCruijffArena;

#[async_trait]
impl Connector for JohanCruijffArena {
    fn source(&self) -> Source {
        Source::JohanCruijffArena
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "Johan Cruijff ArenA fetch failed");
            err
        })?;
        Ok(self.parse_document(&html, base::today_local()))
    }
}

impl JohanCruijffArena {
    pub(crate) fn parse_document(&self, html: &str, today: NaiveDate) -> Vec<Event> {
        let root = format!("{BASE}/");
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| !a.href.contains("calendar") && !a.href.trim_matches('/').is_empty())
            .filter(|a| a.href.contains("/en/") || a.href.contains("/nl/"))
            .filter(|a| (3..=250).contains(&a.text.chars().count()))
            .filter(|a| a.url != BASE && a.url != root)
            .map(|a| {
                Event::new(
                    Source::JohanCruijffArena,
                    a.text.clone(),
                    VENUE_NAME,
                    prefix_chars(&a.text, 60),
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
        .or_else(|| base::normalize_month_mention(text, &MONTHS, r"\s+", today))
        .unwrap_or_else(|| TBA.to_string())
}
