use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source};
use crate::utils::prefix_chars;

const URL: &str = "https://www.melkweg.nl/en/agenda";
const BASE: &str = "https://www.melkweg.nl";
const VENUE_NAME: &str = "Melkweg";

pub struct Melkweg;

#[async_trait]
impl Connector for Melkweg {
    fn source(&self) -> Source {
        Source::Melkweg
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "Melkweg fetch failed");
            err
        })?;
        Ok(self.parse_document(&html, base::today_local()))
    }
}

impl Melkweg {
    pub(crate) fn parse_document(&self, html: &str, today: NaiveDate) -> Vec<Event> {
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| a.href.contains("/en/") && !a.href.contains("agenda"))
            .filter(|a| a.text.chars().count() >= 2)
            .map(|a| {
                Event::new(
                    Source::Melkweg,
                    a.text.clone(),
                    VENUE_NAME,
                    prefix_chars(&a.text, 30),
                    base::normalize_weekday_date(&a.text, today),
                    a.url,
                )
            })
            .collect();
        base::dedupe_by_url(events, None)
    }
}
