use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use concert_tracker::config::AppConfig;
use concert_tracker::App;

/// Daily Amsterdam concert tracker with a Telegram front end.
#[derive(Parser, Debug)]
#[command(name = "concert-tracker", version, about)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram bot and the daily scheduler (default)
    Serve,
    /// Run one full check and deliver notifications
    Run,
    /// Run one check without sending or recording anything
    DryRun,
    /// Show the last run summary
    Status,
    /// List monitored sources
    Sources,
    /// Clear the notification history
    ResetHistory,
    /// Verify and store the artists list URL
    SetArtistsUrl { url: String },
    /// Set the daily check time (HH:MM, Europe/Amsterdam)
    SetTime { time: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concert_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }
    let app = App::open(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app.serve().await?,
        Command::Run => print_report(&app.run_once(false).await?),
        Command::DryRun => {
            let report = app.run_once(true).await?;
            print_report(&report);
            for m in &report.new_matches {
                let (_, venue, date) = m.key();
                println!("  {} | {} | {venue} | {date} | {}", m.artist, m.event.title, m.event.url);
            }
        }
        Command::Status => println!("{}", app.status()?),
        Command::Sources => {
            for source in app.list_sources() {
                println!("{:<20} {}", source.id, source.name);
            }
        }
        Command::ResetHistory => {
            let cleared = app.reset_history()?;
            println!("Notification history cleared ({cleared} entries).");
        }
        Command::SetArtistsUrl { url } => {
            let count = app.set_artists_url(&url).await?;
            println!("Artists list URL updated and verified ({count} artists).");
        }
        Command::SetTime { time } => {
            app.set_check_time(&time)?;
            info!(time = %time, "check time updated; restart serve to apply");
            println!("Daily check time set to {} (Europe/Amsterdam).", time.trim());
        }
    }
    Ok(())
}

fn print_report(report: &concert_tracker::models::RunReport) {
    println!("status: {}", report.status);
    println!(
        "events scanned: {}, matches: {}, new: {}, notifications sent: {}",
        report.events_scanned_total,
        report.matches_total,
        report.new_matches.len(),
        report.notifications_sent
    );
    if let Some(err) = &report.artists_fetch_error {
        println!("artists list: {err}");
    }
    for err in &report.errors {
        println!("error: {err}");
    }
}
