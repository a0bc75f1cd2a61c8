pub mod artists;
pub mod bot;
pub mod commands;
pub mod config;
pub mod db;
pub mod dedupe;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod onboarding;
pub mod pipeline;
pub mod scheduler;
pub mod scraping;
pub mod telegram;
pub mod utils;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use artists::HttpArtistList;
use commands::ChatContext;
use config::AppConfig;
use db::{keys, Store};
use models::RunReport;
use notify::{NoopNotifier, NotifierFactory};
use pipeline::Pipeline;
use scraping::SourceInfo;
use telegram::{TelegramClient, TelegramNotifier};

/// Opened store plus the pipeline over the fixed venue registry.
pub struct App {
    config: AppConfig,
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
}

impl App {
    pub fn open(config: AppConfig) -> Result<Self> {
        let path = config.database_path();
        let store = Arc::new(
            Store::open(&path).with_context(|| format!("opening database {}", path.display()))?,
        );
        info!(path = %path.display(), "database ready");
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            scraping::default_connectors(),
        ));
        Ok(Self {
            config,
            store,
            pipeline,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn telegram(&self) -> Result<TelegramClient> {
        let token = self.config.bot_token()?;
        Ok(TelegramClient::new(token)?)
    }

    /// Bot polling plus the daily job; runs until the process is stopped.
    pub async fn serve(&self) -> Result<()> {
        let client = self.telegram()?;
        let delivery: Arc<dyn NotifierFactory> = Arc::new(client.clone());

        // Keep the scheduler alive for the lifetime of the polling loop.
        let _scheduler = scheduler::start_daily(
            Arc::clone(&self.store),
            Arc::clone(&self.pipeline),
            Arc::clone(&delivery),
        )
        .await
        .context("starting daily scheduler")?;

        let ctx = Arc::new(ChatContext {
            store: Arc::clone(&self.store),
            pipeline: Arc::clone(&self.pipeline),
            delivery,
            configured_user_id: self.config.authorized_user_id,
        });
        bot::run_polling(client, ctx).await;
        Ok(())
    }

    /// One run from the command line. Real runs deliver to the stored chat.
    pub async fn run_once(&self, dry_run: bool) -> Result<RunReport> {
        if dry_run {
            return Ok(self.pipeline.run(&NoopNotifier, true).await?);
        }
        let chat_id: i64 = self
            .store
            .get_setting(keys::NOTIFICATION_CHAT_ID)?
            .and_then(|raw| raw.trim().parse().ok())
            .ok_or_else(|| anyhow!("no notification chat yet; send /start to the bot first"))?;
        let notifier = TelegramNotifier::markdown(self.telegram()?, chat_id);
        Ok(self.pipeline.run(&notifier, false).await?)
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        scraping::list_sources(self.pipeline.connectors())
    }

    pub fn status(&self) -> Result<String> {
        Ok(commands::status_text(&self.store)?)
    }

    pub fn reset_history(&self) -> Result<usize> {
        Ok(self.store.clear_history()?)
    }

    pub async fn set_artists_url(&self, url: &str) -> Result<usize> {
        let url = url.trim();
        if !commands::is_http_url(url) {
            bail!("URL must start with http:// or https://");
        }
        let list =
            artists::verify_and_store_url(&HttpArtistList::default(), &self.store, url).await?;
        Ok(list.len())
    }

    pub fn set_check_time(&self, time: &str) -> Result<()> {
        let time = time.trim();
        if !commands::is_valid_time(time) {
            bail!("Please use HH:MM format (e.g. 09:00).");
        }
        self.store.set_setting(keys::CHECK_TIME_LOCAL, time)?;
        self.store.set_setting(keys::TIMEZONE, db::DEFAULT_TIMEZONE)?;
        Ok(())
    }
}
