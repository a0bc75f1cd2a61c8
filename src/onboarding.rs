//! First-run wizard: artists list URL, then location, then daily check time.

use anyhow::Result;
use tracing::info;

use crate::artists::{self, ArtistListError, ArtistListSource};
use crate::commands::{is_http_url, is_valid_time};
use crate::db::{keys, Store, DEFAULT_TIMEZONE};
use crate::notify::Notifier;

pub const PROMPT_URL: &str = "Send the URL to your GitHub-hosted .txt list (one artist per line).\nExample: https://raw.githubusercontent.com/username/repo/main/artists.txt";
pub const PROMPT_LOCATION: &str = "Location? For MVP only Netherlands is supported. Send: NL";
pub const PROMPT_TIME: &str =
    "Daily check time? Send HH:MM in Europe/Amsterdam (e.g. 09:00). Default is 09:00.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Url,
    Location,
    Time,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Url => "url",
            Step::Location => "location",
            Step::Time => "time",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "url" => Some(Step::Url),
            "location" => Some(Step::Location),
            "time" => Some(Step::Time),
            _ => None,
        }
    }
}

pub fn current_step(store: &Store) -> rusqlite::Result<Option<Step>> {
    Ok(store
        .get_setting(keys::ONBOARDING_STEP)?
        .and_then(|raw| Step::parse(raw.trim())))
}

fn set_step(store: &Store, step: Option<Step>) -> rusqlite::Result<()> {
    store.set_setting(keys::ONBOARDING_STEP, step.map_or("", |s| s.as_str()))
}

/// True while no artists list URL is stored.
pub fn needs_onboarding(store: &Store) -> rusqlite::Result<bool> {
    Ok(store
        .get_setting(keys::ARTISTS_LIST_URL)?
        .map_or(true, |url| url.trim().is_empty()))
}

pub async fn start(store: &Store, reply: &dyn Notifier) -> Result<()> {
    set_step(store, Some(Step::Url))?;
    reply.send(PROMPT_URL).await?;
    Ok(())
}

/// Handles free text for the active step. Returns false when no step is
/// active so the caller can answer it some other way.
pub async fn handle_message(
    store: &Store,
    source: &dyn ArtistListSource,
    text: &str,
    reply: &dyn Notifier,
) -> Result<bool> {
    let Some(step) = current_step(store)? else {
        return Ok(false);
    };

    let text = text.trim();
    if text.is_empty() {
        reply.send("Please send a non-empty message.").await?;
        return Ok(true);
    }

    match step {
        Step::Url => url_step(store, source, text, reply).await?,
        Step::Location => location_step(store, text, reply).await?,
        Step::Time => time_step(store, text, reply).await?,
    }
    Ok(true)
}

async fn url_step(
    store: &Store,
    source: &dyn ArtistListSource,
    text: &str,
    reply: &dyn Notifier,
) -> Result<()> {
    if !is_http_url(text) {
        reply.send("Please send a valid URL (http or https).").await?;
        return Ok(());
    }
    match artists::verify_and_store_url(source, store, text).await {
        Ok(list) => {
            info!(artists = list.len(), "onboarding: artists list verified");
            set_step(store, Some(Step::Location))?;
            reply.send(PROMPT_LOCATION).await?;
        }
        Err(ArtistListError::Empty) => {
            reply
                .send("The file is empty or has no valid lines. Please use a .txt with one artist per line.")
                .await?;
        }
        Err(ArtistListError::Storage(err)) => return Err(err.into()),
        Err(err) => {
            reply
                .send(&format!(
                    "Could not fetch that URL: {err}. Please try another."
                ))
                .await?;
        }
    }
    Ok(())
}

async fn location_step(store: &Store, text: &str, reply: &dyn Notifier) -> Result<()> {
    if !text.eq_ignore_ascii_case("NL") {
        reply
            .send("For MVP only NL (Netherlands) is supported. Please send: NL")
            .await?;
        return Ok(());
    }
    store.set_setting(keys::LOCATION, "NL")?;
    set_step(store, Some(Step::Time))?;
    reply.send(PROMPT_TIME).await?;
    Ok(())
}

async fn time_step(store: &Store, text: &str, reply: &dyn Notifier) -> Result<()> {
    if !is_valid_time(text) {
        reply.send("Please send time as HH:MM (e.g. 09:00).").await?;
        return Ok(());
    }
    store.set_setting(keys::CHECK_TIME_LOCAL, text)?;
    store.set_setting(keys::TIMEZONE, DEFAULT_TIMEZONE)?;
    set_step(store, None)?;
    info!(check_time = text, "onboarding complete");
    reply
        .send(&format!(
            "Setup complete. I'll check for concerts daily at {text} (Europe/Amsterdam). Use /settings to see your config and /run_now to run a check now."
        ))
        .await?;
    Ok(())
}
