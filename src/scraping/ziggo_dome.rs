use async_trait::async_trait;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source, TBA};

const URL: &str = "https://www.ziggodome.nl/agenda";
const BASE: &str = "https://www.ziggodome.nl";
const VENUE_NAME: &str = "Ziggo Dome";
const MAX_EVENTS: usize = 200;

/// The agenda page is mostly script-rendered; dates are not reliably present in
/// the markup, so every event is TBA.
pub struct ZiggoDome;

#[async_trait]
impl Connector for ZiggoDome {
    fn source(&self) -> Source {
        Source::ZiggoDome
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "Ziggo Dome fetch failed");
            err
        })?;
        Ok(self.parse_document(&html))
    }
}

impl ZiggoDome {
    pub(crate) fn parse_document(&self, html: &str) -> Vec<Event> {
        let root = format!("{BASE}/");
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| !a.href.is_empty() && a.href != "/" && !a.href.contains("agenda"))
            .filter(|a| (3..=200).contains(&a.text.chars().count()))
            .filter(|a| a.url != BASE && a.url != root)
            .map(|a| Event::new(Source::ZiggoDome, a.text, VENUE_NAME, TBA, TBA, a.url))
            .collect();
        base::dedupe_by_url(events, Some(MAX_EVENTS))
    }
}
