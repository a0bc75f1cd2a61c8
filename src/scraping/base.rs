use std::collections::HashSet;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::warn;

use crate::models::{Event, TBA};

use super::ConnectorError;

pub const USER_AGENT: &str = "AmsterdamConcertTracker/1.0 (NL concert notifications; bot)";
pub const TIMEZONE: Tz = chrono_tz::Europe::Amsterdam;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRIES: u32 = 4;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .expect("http client")
});

static WEEKDAY_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Mo|Tu|We|Th|Fr|Sa|Su)\s+(\d{1,2})\s+([A-Za-z]{3})")
        .expect("weekday date regex")
});
static NUMERIC_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[-/](\d{1,2})[-/](\d{4})").expect("numeric date regex"));

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

pub fn http_client() -> &'static Client {
    &CLIENT
}

/// Delay before attempt `n + 1` after attempt `n` (zero based) failed: 1s, 2s, 4s, 8s.
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(attempt)
}

/// GET with exponential backoff. The last error is returned once all attempts fail.
pub async fn fetch_with_retries(client: &Client, url: &str) -> Result<String, ConnectorError> {
    let mut last_error = None;
    for attempt in 0..RETRIES {
        match fetch_once(client, url).await {
            Ok(body) => return Ok(body),
            Err(err) => {
                if attempt + 1 < RETRIES {
                    let delay = backoff_delay(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        error = %err,
                        "request failed; retrying in {}s",
                        delay.as_secs()
                    );
                    sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ConnectorError::Http(format!("no attempts made for {url}"))))
}

async fn fetch_once(client: &Client, url: &str) -> Result<String, ConnectorError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| ConnectorError::Http(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ConnectorError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|err| ConnectorError::Http(err.to_string()))
}

/// Waits the per-connector politeness delay, then fetches with retries.
pub async fn fetch_page(url: &str) -> Result<String, ConnectorError> {
    sleep(RATE_LIMIT_DELAY).await;
    fetch_with_retries(http_client(), url).await
}

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// A link found on an agenda page: raw href, absolute url and cleaned text.
pub struct Anchor {
    pub href: String,
    pub url: String,
    pub text: String,
}

pub fn anchors(html: &str, base: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let url = absolute_url(base, &href)?;
            Some(Anchor {
                href,
                url,
                text: inner_text(a),
            })
        })
        .collect()
}

/// Keeps the first event for each url, preserving order, then applies the cap.
pub fn dedupe_by_url(events: Vec<Event>, cap: Option<usize>) -> Vec<Event> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Event> = events
        .into_iter()
        .filter(|event| seen.insert(event.url.clone()))
        .collect();
    if let Some(cap) = cap {
        unique.truncate(cap);
    }
    unique
}

pub fn today_local() -> NaiveDate {
    Utc::now().with_timezone(&TIMEZONE).date_naive()
}

pub fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Year for a date printed without one: this year, or next year once (month, day) has passed.
pub fn infer_year_by_day(month: u32, day: u32, today: NaiveDate) -> i32 {
    if (month, day) < (today.month(), today.day()) {
        today.year() + 1
    } else {
        today.year()
    }
}

/// Coarser rollover used by the ticketing sites: only the month is compared.
pub fn infer_year_by_month(month: u32, today: NaiveDate) -> i32 {
    if month < today.month() {
        today.year() + 1
    } else {
        today.year()
    }
}

pub fn ymd_or_tba(year: i32, month: u32, day: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(iso)
        .unwrap_or_else(|| TBA.to_string())
}

/// "Fr 20 Mar" style agenda labels; the year is inferred from today.
pub fn normalize_weekday_date(text: &str, today: NaiveDate) -> String {
    let Some(caps) = WEEKDAY_DATE_RE.captures(text) else {
        return TBA.to_string();
    };
    let Ok(day) = caps[1].parse::<u32>() else {
        return TBA.to_string();
    };
    let Some(month) = month_from_abbrev(&caps[2]) else {
        return TBA.to_string();
    };
    ymd_or_tba(infer_year_by_day(month, day, today), month, day)
}

/// `DD-MM-YYYY` or `DD/MM/YYYY` anywhere in the text.
pub fn normalize_numeric_date(text: &str) -> Option<String> {
    let caps = NUMERIC_DATE_RE.captures(text)?;
    let day = caps[1].parse::<u32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let year = caps[3].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(iso)
}

/// Tries each `(name, month)` in order: the name must appear in the text with a
/// day number before it. Yearless dates roll over by month only.
pub fn normalize_month_mention(
    text: &str,
    months: &[(&str, u32)],
    separator: &str,
    today: NaiveDate,
) -> Option<String> {
    let lowered = text.to_lowercase();
    for (name, month) in months {
        if !lowered.contains(name) {
            continue;
        }
        let pattern = format!(r"(?i)(\d{{1,2}}){separator}{name}");
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(text) {
            let Ok(day) = caps[1].parse::<u32>() else {
                continue;
            };
            let year = infer_year_by_month(*month, today);
            if let Some(date) = NaiveDate::from_ymd_opt(year, *month, day) {
                return Some(iso(date));
            }
        }
    }
    None
}
