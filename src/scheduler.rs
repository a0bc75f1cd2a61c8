use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::db::{keys, Store};
use crate::notify::{Notifier, NotifierFactory};
use crate::pipeline::{Pipeline, PipelineError};
use crate::scraping::base::TIMEZONE;

/// A run older than this at startup triggers one immediate catch-up run.
pub const CATCH_UP_HOURS: i64 = 6;

/// `HH:MM` or a bare hour; anything else falls back to 09:00.
pub fn parse_check_time(raw: &str) -> (u32, u32) {
    const FALLBACK: (u32, u32) = (9, 0);
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let parsed: Option<(u32, u32)> = match parts.as_slice() {
        [hour, minute, ..] => hour.trim().parse().ok().zip(minute.trim().parse().ok()),
        [hour] => hour.trim().parse().ok().map(|h| (h, 0)),
        [] => None,
    };
    match parsed {
        Some((hour, minute)) if hour < 24 && minute < 60 => (hour, minute),
        _ => FALLBACK,
    }
}

/// Six-field cron expression firing once a day.
pub fn cron_expression(hour: u32, minute: u32) -> String {
    format!("0 {minute} {hour} * * *")
}

/// Unparseable timestamps never trigger a catch-up.
pub fn needs_catch_up(last_run_at: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(raw) = last_run_at.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return false;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(last) => {
            now.signed_duration_since(last.with_timezone(&Utc)) > Duration::hours(CATCH_UP_HOURS)
        }
        Err(err) => {
            debug!(raw, error = %err, "catch-up check skipped");
            false
        }
    }
}

async fn scheduled_run(pipeline: &Pipeline, notifier: &dyn Notifier) {
    match pipeline.run(notifier, false).await {
        Ok(report) => info!(status = %report.status, "scheduled run finished"),
        Err(PipelineError::RunInProgress) => info!("scheduled run skipped; a run is already in progress"),
        Err(err) => {
            error!(error = %err, "scheduled run failed");
            if let Err(send_err) = notifier.send(&format!("Daily run failed: {err}")).await {
                debug!(error = %send_err, "failure notice not delivered");
            }
        }
    }
}

/// Starts the daily job at the stored check time (Amsterdam local) and fires a
/// catch-up run when the last one is stale. Returns `None` when no chat to
/// notify is known yet.
pub async fn start_daily(
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    delivery: Arc<dyn NotifierFactory>,
) -> Result<Option<JobScheduler>> {
    let chat_id = match store.get_setting(keys::NOTIFICATION_CHAT_ID)? {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                warn!(raw = %raw, "invalid notification_chat_id; scheduler not started");
                return Ok(None);
            }
        },
        _ => {
            warn!("no notification_chat_id set; scheduler not started");
            return Ok(None);
        }
    };

    let (hour, minute) = parse_check_time(&store.get_setting_or_default(keys::CHECK_TIME_LOCAL)?);
    let cron = cron_expression(hour, minute);

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job_pipeline = Arc::clone(&pipeline);
    let job_delivery = Arc::clone(&delivery);
    let job = Job::new_async_tz(cron.as_str(), TIMEZONE, move |_uuid, _l| {
        let pipeline = Arc::clone(&job_pipeline);
        let delivery = Arc::clone(&job_delivery);
        Box::pin(async move {
            let notifier = delivery.for_chat(chat_id);
            scheduled_run(&pipeline, notifier.as_ref()).await;
        })
    })
    .with_context(|| format!("creating daily job for cron {cron}"))?;
    sched.add(job).await.context("adding daily job")?;
    sched.start().await.context("starting scheduler")?;
    info!(hour, minute, "scheduler started: daily, Europe/Amsterdam");

    let last_run_at = store.get_setting(keys::LAST_RUN_AT)?;
    if needs_catch_up(last_run_at.as_deref(), Utc::now()) {
        info!(hours = CATCH_UP_HOURS, "catch-up: last run is stale, running now");
        tokio::spawn(async move {
            let notifier = delivery.for_chat(chat_id);
            scheduled_run(&pipeline, notifier.as_ref()).await;
        });
    }

    Ok(Some(sched))
}
