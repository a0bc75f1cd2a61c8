use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::notify::{Notifier, NotifierFactory, NotifyError};

const API_BASE: &str = "https://api.telegram.org";
pub const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http error: {0}")]
    Http(String),
    #[error("telegram api error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    client: Client,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|err| TelegramError::Http(err.to_string()))?;
        Ok(Self {
            token: token.trim().to_string(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|err| TelegramError::Http(err.to_string()))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|err| TelegramError::Http(err.to_string()))?;
        unwrap_response(body)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            payload["parse_mode"] = json!(mode);
        }
        let _: serde_json::Value = self.call("sendMessage", payload).await?;
        Ok(())
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let mut payload = json!({
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        self.call("getUpdates", payload).await
    }
}

fn unwrap_response<T>(body: ApiResponse<T>) -> Result<T, TelegramError> {
    if !body.ok {
        return Err(TelegramError::Api(
            body.description
                .unwrap_or_else(|| "request was not ok".to_string()),
        ));
    }
    body.result
        .ok_or_else(|| TelegramError::Api("response missing result".to_string()))
}

/// Sends to one chat. Match notifications use Markdown; command replies are plain.
pub struct TelegramNotifier {
    client: TelegramClient,
    chat_id: i64,
    parse_mode: Option<&'static str>,
}

impl TelegramNotifier {
    pub fn markdown(client: TelegramClient, chat_id: i64) -> Self {
        Self {
            client,
            chat_id,
            parse_mode: Some("Markdown"),
        }
    }

    pub fn plain(client: TelegramClient, chat_id: i64) -> Self {
        Self {
            client,
            chat_id,
            parse_mode: None,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.client
            .send_message(self.chat_id, text, self.parse_mode)
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))
    }
}

impl NotifierFactory for TelegramClient {
    fn for_chat(&self, chat_id: i64) -> Box<dyn Notifier> {
        Box::new(TelegramNotifier::markdown(self.clone(), chat_id))
    }
}
