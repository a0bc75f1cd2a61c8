use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Event, TBA};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Something that can deliver a text message to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Builds a notifier bound to one chat.
pub trait NotifierFactory: Send + Sync {
    fn for_chat(&self, chat_id: i64) -> Box<dyn Notifier>;
}

/// Sink for rehearsal runs.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
}

pub fn format_match(artist: &str, event: &Event) -> String {
    let date = if event.date_normalized.is_empty() {
        TBA
    } else {
        event.date_normalized.as_str()
    };
    format!(
        "🎵 Match found: **{artist}**\n**Event:** {title}\n**Venue:** {venue}\n**Date:** {date}\n**Source:** {source}\nLink: {url}",
        artist = escape_markdown(artist),
        title = escape_markdown(&event.title),
        venue = escape_markdown(&event.venue),
        date = date,
        source = event.source,
        url = event.url,
    )
}

pub fn format_digest(count: usize) -> String {
    format!("You have {count} new matches. Sending details below.")
}

pub fn format_stale_artists_warning(error: &str) -> String {
    format!("Artists list URL could not be fetched; using cached list. Error: {error}")
}
