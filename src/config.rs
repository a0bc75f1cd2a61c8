use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },
    #[error("missing telegram bot token (set TELEGRAM_BOT_TOKEN)")]
    MissingToken,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub telegram_bot_token: Option<String>,
    pub database_path: Option<PathBuf>,
    pub authorized_user_id: Option<i64>,
}

impl AppConfig {
    /// Reads `config.json` from the data root, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = read_config(&utils::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram_bot_token = Some(token.trim().to_string());
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(id) = lookup("AUTHORIZED_USER_ID").and_then(|s| s.trim().parse::<i64>().ok())
        {
            self.authorized_user_id = Some(id);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let to_error = |message: String| ConfigError::Read {
        path: path.display().to_string(),
        message,
    };
    let contents = fs::read_to_string(path).map_err(|err| to_error(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| to_error(err.to_string()))
}
