//! Chat commands for the single authorized user.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::artists::{self, ArtistListError};
use crate::db::{keys, Store, DEFAULT_CHECK_TIME, DEFAULT_TIMEZONE};
use crate::models::RunReport;
use crate::notify::{NoopNotifier, Notifier, NotifierFactory};
use crate::onboarding;
use crate::pipeline::{Pipeline, PipelineError};
use crate::scraping;

pub const REJECT_MESSAGE: &str = "This bot is private.";
pub const HELP_HINT: &str = "Send /help for commands.";
const DRY_RUN_PREVIEW_LIMIT: usize = 10;
const STATUS_ERROR_LIMIT: usize = 3;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])$").expect("time regex"));

pub const HELP_TEXT: &str = "Commands:
/start — Show settings or start setup
/help — This message
/settings — Show current settings
/set_artists_url <url> — Set your artists list URL (GitHub raw .txt)
/set_time <HH:MM> — Daily check time (Europe/Amsterdam)
/set_location NL — Location (MVP: NL only)
/run_now — Run a full check now
/status — Last run time and counts
/reset_history — Clear notification history (you'll get confirmations again)
/sources — List monitored sources
/dry_run — Run check and report matches without sending notifications

Matching: case-insensitive substring. If an artist name appears in the event title, you get notified once per (artist, venue, date).";

pub fn is_http_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

pub fn is_valid_time(text: &str) -> bool {
    TIME_RE.is_match(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Settings,
    SetArtistsUrl(Option<String>),
    SetTime(Option<String>),
    SetLocation(Option<String>),
    RunNow,
    Status,
    ResetHistory,
    ResetHistoryConfirm,
    Sources,
    DryRun,
    Unknown(String),
}

impl Command {
    /// Parses `/name[@bot] [args...]`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let arg = parts.next().map(str::to_string);

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "settings" => Command::Settings,
            "set_artists_url" => Command::SetArtistsUrl(arg),
            "set_time" => Command::SetTime(arg),
            "set_location" => Command::SetLocation(arg),
            "run_now" => Command::RunNow,
            "status" => Command::Status,
            "reset_history" => Command::ResetHistory,
            "reset_history_confirm" => Command::ResetHistoryConfirm,
            "sources" => Command::Sources,
            "dry_run" => Command::DryRun,
            _ => Command::Unknown(name),
        })
    }
}

/// Who sent a message and where to answer.
#[derive(Debug, Clone, Copy)]
pub struct Incoming {
    pub user_id: i64,
    pub chat_id: i64,
}

pub struct ChatContext {
    pub store: Arc<Store>,
    pub pipeline: Arc<Pipeline>,
    pub delivery: Arc<dyn NotifierFactory>,
    /// Fixed owner from configuration; takes precedence over the stored one.
    pub configured_user_id: Option<i64>,
}

impl ChatContext {
    pub fn authorized_user_id(&self) -> rusqlite::Result<Option<i64>> {
        if self.configured_user_id.is_some() {
            return Ok(self.configured_user_id);
        }
        Ok(self
            .store
            .get_setting(keys::AUTHORIZED_USER_ID)?
            .and_then(|raw| raw.trim().parse().ok()))
    }

    /// Anyone may talk to the bot until an owner exists.
    pub fn is_authorized(&self, user_id: i64) -> rusqlite::Result<bool> {
        Ok(self
            .authorized_user_id()?
            .map_or(true, |owner| owner == user_id))
    }

    fn notification_chat_id(&self) -> rusqlite::Result<Option<i64>> {
        Ok(self
            .store
            .get_setting(keys::NOTIFICATION_CHAT_ID)?
            .and_then(|raw| raw.trim().parse().ok()))
    }
}

/// Entry point for every text message from the chat.
pub async fn handle_text(
    ctx: &ChatContext,
    incoming: Incoming,
    text: &str,
    reply: &dyn Notifier,
) -> Result<()> {
    if !ctx.is_authorized(incoming.user_id)? {
        info!(user_id = incoming.user_id, "rejected message from unknown user");
        reply.send(REJECT_MESSAGE).await?;
        return Ok(());
    }

    if let Some(command) = Command::parse(text) {
        return handle_command(ctx, incoming, command, reply).await;
    }

    let handled =
        onboarding::handle_message(&ctx.store, ctx.pipeline.artist_source(), text, reply).await?;
    if !handled {
        reply.send(HELP_HINT).await?;
    }
    Ok(())
}

pub async fn handle_command(
    ctx: &ChatContext,
    incoming: Incoming,
    command: Command,
    reply: &dyn Notifier,
) -> Result<()> {
    match command {
        Command::Start => start(ctx, incoming, reply).await,
        Command::Help => Ok(reply.send(HELP_TEXT).await?),
        Command::Settings => Ok(reply.send(&settings_text(&ctx.store)?).await?),
        Command::SetArtistsUrl(arg) => set_artists_url(ctx, arg, reply).await,
        Command::SetTime(arg) => set_time(&ctx.store, arg, reply).await,
        Command::SetLocation(arg) => set_location(&ctx.store, arg, reply).await,
        Command::RunNow => run_now(ctx, reply).await,
        Command::Status => Ok(reply.send(&status_text(&ctx.store)?).await?),
        Command::ResetHistory => Ok(reply
            .send("This will clear all notification history so you can receive the same matches again. Reply /reset_history_confirm to confirm.")
            .await?),
        Command::ResetHistoryConfirm => {
            let cleared = ctx.store.clear_history()?;
            info!(cleared, "notification history cleared");
            Ok(reply
                .send(&format!("Notification history cleared ({cleared} entries)."))
                .await?)
        }
        Command::Sources => Ok(reply.send(&sources_text(ctx.pipeline.connectors())).await?),
        Command::DryRun => dry_run(ctx, reply).await,
        Command::Unknown(name) => {
            info!(command = %name, "unknown command");
            Ok(reply.send(HELP_HINT).await?)
        }
    }
}

async fn start(ctx: &ChatContext, incoming: Incoming, reply: &dyn Notifier) -> Result<()> {
    if ctx.authorized_user_id()?.is_none() {
        ctx.store
            .set_setting(keys::AUTHORIZED_USER_ID, &incoming.user_id.to_string())?;
        info!(user_id = incoming.user_id, "authorized first user");
    }
    ctx.store
        .set_setting(keys::NOTIFICATION_CHAT_ID, &incoming.chat_id.to_string())?;

    if onboarding::needs_onboarding(&ctx.store)? {
        return onboarding::start(&ctx.store, reply).await;
    }

    let store = &ctx.store;
    let url = store.get_setting_or_default(keys::ARTISTS_LIST_URL)?;
    let text = format!(
        "Current settings:\n• Artists list: {}\n• Location: {}\n• Daily check: {} ({})\n\nUse /settings, /run_now, /status, or /help.",
        or_placeholder(&url),
        store.get_setting_or_default(keys::LOCATION)?,
        check_time(store)?,
        timezone(store)?,
    );
    reply.send(&text).await?;
    Ok(())
}

fn or_placeholder(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn check_time(store: &Store) -> rusqlite::Result<String> {
    let value = store.get_setting_or_default(keys::CHECK_TIME_LOCAL)?;
    Ok(if value.trim().is_empty() {
        DEFAULT_CHECK_TIME.to_string()
    } else {
        value
    })
}

fn timezone(store: &Store) -> rusqlite::Result<String> {
    let value = store.get_setting_or_default(keys::TIMEZONE)?;
    Ok(if value.trim().is_empty() {
        DEFAULT_TIMEZONE.to_string()
    } else {
        value
    })
}

pub fn settings_text(store: &Store) -> rusqlite::Result<String> {
    let url = store.get_setting_or_default(keys::ARTISTS_LIST_URL)?;
    Ok(format!(
        "Artists list URL: {}\nLocation: {}\nCheck time: {} ({})",
        or_placeholder(&url),
        store.get_setting_or_default(keys::LOCATION)?,
        check_time(store)?,
        timezone(store)?,
    ))
}

async fn set_artists_url(
    ctx: &ChatContext,
    arg: Option<String>,
    reply: &dyn Notifier,
) -> Result<()> {
    let Some(url) = arg.map(|url| url.trim().to_string()) else {
        reply.send("Usage: /set_artists_url <url>").await?;
        return Ok(());
    };
    if !is_http_url(&url) {
        reply.send("URL must start with http:// or https://").await?;
        return Ok(());
    }

    match artists::verify_and_store_url(ctx.pipeline.artist_source(), &ctx.store, &url).await {
        Ok(list) => {
            info!(artists = list.len(), "artists list url updated");
            reply.send("Artists list URL updated and verified.").await?;
        }
        Err(ArtistListError::Empty) => {
            reply
                .send("URL returned no lines. Use a .txt with one artist per line.")
                .await?;
        }
        Err(ArtistListError::Storage(err)) => return Err(err.into()),
        Err(err) => {
            reply.send(&format!("Could not fetch URL: {err}")).await?;
        }
    }
    Ok(())
}

async fn set_time(store: &Store, arg: Option<String>, reply: &dyn Notifier) -> Result<()> {
    let Some(raw) = arg.map(|raw| raw.trim().to_string()) else {
        reply.send("Usage: /set_time <HH:MM> (e.g. 09:00)").await?;
        return Ok(());
    };
    if !is_valid_time(&raw) {
        reply.send("Please use HH:MM format (e.g. 09:00).").await?;
        return Ok(());
    }
    store.set_setting(keys::CHECK_TIME_LOCAL, &raw)?;
    store.set_setting(keys::TIMEZONE, DEFAULT_TIMEZONE)?;
    reply
        .send(&format!("Daily check time set to {raw} (Europe/Amsterdam)."))
        .await?;
    Ok(())
}

async fn set_location(store: &Store, arg: Option<String>, reply: &dyn Notifier) -> Result<()> {
    let Some(raw) = arg else {
        reply.send("Usage: /set_location NL (MVP: NL only)").await?;
        return Ok(());
    };
    if !raw.trim().eq_ignore_ascii_case("NL") {
        reply.send("For MVP only NL is supported.").await?;
        return Ok(());
    }
    store.set_setting(keys::LOCATION, "NL")?;
    reply.send("Location set to NL.").await?;
    Ok(())
}

async fn run_now(ctx: &ChatContext, reply: &dyn Notifier) -> Result<()> {
    let Some(chat_id) = ctx.notification_chat_id()? else {
        reply
            .send("Send /start first so I know where to send notifications.")
            .await?;
        return Ok(());
    };
    reply.send("Running check…").await?;

    let notifier = ctx.delivery.for_chat(chat_id);
    match ctx.pipeline.run(notifier.as_ref(), false).await {
        Ok(report) => {
            let text = format!(
                "Run finished. Status: {}\nEvents scanned: {}, Matches: {}, Notifications sent: {}\nErrors: {}",
                report.status,
                report.events_scanned_total,
                report.matches_total,
                report.notifications_sent,
                error_digest(&report.errors),
            );
            reply.send(&text).await?;
        }
        Err(err) => reply_run_error(reply, err).await?,
    }
    Ok(())
}

async fn dry_run(ctx: &ChatContext, reply: &dyn Notifier) -> Result<()> {
    if ctx.notification_chat_id()?.is_none() {
        reply.send("Send /start first.").await?;
        return Ok(());
    }
    reply
        .send("Running dry run (no notifications will be sent)…")
        .await?;

    match ctx.pipeline.run(&NoopNotifier, true).await {
        Ok(report) => reply.send(&dry_run_text(&report)).await?,
        Err(err) => reply_run_error(reply, err).await?,
    }
    Ok(())
}

async fn reply_run_error(reply: &dyn Notifier, err: PipelineError) -> Result<()> {
    match err {
        PipelineError::RunInProgress => reply.send("A run is already in progress.").await?,
        other => {
            warn!(error = %other, "manual run failed");
            reply.send(&format!("Run failed: {other}")).await?;
        }
    }
    Ok(())
}

pub fn dry_run_text(report: &RunReport) -> String {
    let mut text = format!(
        "Dry run finished. Status: {}\nEvents scanned: {}, Matches found: {} (no notifications sent).",
        report.status, report.events_scanned_total, report.matches_total,
    );
    if !report.new_matches.is_empty() {
        text.push_str("\n\nWould notify:");
        for m in report.new_matches.iter().take(DRY_RUN_PREVIEW_LIMIT) {
            let (_, venue, date) = m.key();
            text.push_str(&format!("\n• {}: {} @ {venue}, {date}", m.artist, m.event.title));
        }
        let hidden = report.new_matches.len().saturating_sub(DRY_RUN_PREVIEW_LIMIT);
        if hidden > 0 {
            text.push_str(&format!("\n…and {hidden} more"));
        }
    }
    if !report.errors.is_empty() {
        text.push_str(&format!("\nErrors: {}", error_digest(&report.errors)));
    }
    text
}

fn error_digest(errors: &[String]) -> String {
    if errors.is_empty() {
        "none".to_string()
    } else {
        errors
            .iter()
            .take(STATUS_ERROR_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn status_text(store: &Store) -> rusqlite::Result<String> {
    let Some(last_at) = store
        .get_setting(keys::LAST_RUN_AT)?
        .filter(|value| !value.is_empty())
    else {
        return Ok("No run yet. Use /run_now to run a check.".to_string());
    };
    let status = store.get_setting_or_default(keys::LAST_RUN_STATUS)?;
    let summary: serde_json::Value = store
        .get_setting(keys::LAST_RUN_SUMMARY_JSON)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let count = |field: &str| {
        summary
            .get(field)
            .and_then(serde_json::Value::as_u64)
            .map_or_else(|| "?".to_string(), |n| n.to_string())
    };
    let mut errors: Vec<String> = summary
        .get("errors")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if let Some(single) = summary.get("error").and_then(serde_json::Value::as_str) {
        errors.push(single.to_string());
    }

    Ok(format!(
        "Last run: {last_at}\nOutcome: {status}\nEvents scanned: {}, Matches: {}, Notifications sent: {}\nErrors: {}",
        count("events_scanned_total"),
        count("matches_total"),
        count("notifications_sent"),
        error_digest(&errors),
    ))
}

pub fn sources_text(connectors: &[Arc<dyn scraping::Connector>]) -> String {
    let mut text = String::from("Monitored sources:");
    for info in scraping::list_sources(connectors) {
        text.push_str("\n• ");
        text.push_str(&info.name);
    }
    text
}
