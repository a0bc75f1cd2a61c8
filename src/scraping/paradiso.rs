use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use super::base;
use super::{Connector, ConnectorError};
use crate::models::{Event, Source};
use crate::utils::prefix_chars;

const URL: &str = "https://www.paradiso.nl/en/landing/concertagenda-paradiso/2069817";
const BASE: &str = "https://www.paradiso.nl";
const VENUE_NAME: &str = "Paradiso";

/// Sub-venues Paradiso programs under its own agenda.
const SUB_VENUES: [(&str, &str); 7] = [
    ("bitterzoet", "Bitterzoet"),
    ("tolhuistuin", "Tolhuistuin"),
    ("cinetol", "Cinetol"),
    ("zonnehuis", "Zonnehuis"),
    ("vondelkerk", "Vondelkerk"),
    ("de duif", "De Duif"),
    ("afas live", "AFAS Live"),
];

pub struct Paradiso;

#[async_trait]
impl Connector for Paradiso {
    fn source(&self) -> Source {
        Source::Paradiso
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        let html = base::fetch_page(URL).await.map_err(|err| {
            warn!(source = %self.source(), error = %err, "Paradiso fetch failed");
            err
        })?;
        Ok(self.parse_document(&html, base::today_local()))
    }
}

impl Paradiso {
    pub(crate) fn parse_document(&self, html: &str, today: NaiveDate) -> Vec<Event> {
        let events = base::anchors(html, BASE)
            .into_iter()
            .filter(|a| a.href.contains("/en/program/") && !a.href.contains("/landing/"))
            .filter(|a| a.text.chars().count() >= 2)
            .map(|a| {
                Event::new(
                    Source::Paradiso,
                    a.text.clone(),
                    venue_from_text(&a.text),
                    prefix_chars(&a.text, 20),
                    base::normalize_weekday_date(&a.text, today),
                    a.url,
                )
            })
            .collect();
        base::dedupe_by_url(events, None)
    }
}

fn venue_from_text(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    SUB_VENUES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, name)| *name)
        .unwrap_or(VENUE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
    <html><body>
        <a href="/en/landing/concertagenda-paradiso/2069817">Agenda</a>
        <a href="/en/program/burna-boy/12345">Fr 20 Mar Burna Boy</a>
        <a href="/en/program/burna-boy/12345">Fr 20 Mar Burna Boy (again)</a>
        <a href="https://www.paradiso.nl/en/program/nightshift/555">Sa 31 Oct Nightshift Bitterzoet</a>
        <a href="/en/program/x/1">X</a>
        <a href="/en/news/something">News</a>
        <a href="/en/program/tba-artist/777">Special guest announcement</a>
    </body></html>
    "#;

    #[test]
    fn parses_paradiso_agenda_links() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let events = Paradiso.parse_document(SAMPLE_HTML, today);
        assert_eq!(events.len(), 3, "landing, news, short and duplicate links are skipped");

        let first = &events[0];
        assert_eq!(first.title, "Fr 20 Mar Burna Boy");
        assert_eq!(first.url, "https://www.paradiso.nl/en/program/burna-boy/12345");
        assert_eq!(first.venue, "Paradiso");
        assert_eq!(first.date_normalized, "2027-03-20");
        assert_eq!(first.date_raw, "Fr 20 Mar Burna Boy");
        assert_eq!(first.source, Source::Paradiso);

        let second = &events[1];
        assert_eq!(second.venue, "Bitterzoet");
        assert_eq!(second.date_normalized, "2026-10-31");

        assert_eq!(events[2].date_normalized, "TBA");
        assert_eq!(events[2].date_raw, "Special guest announ");
    }
}
