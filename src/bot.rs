use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::commands::{self, ChatContext, Incoming};
use crate::telegram::{TelegramClient, TelegramNotifier, Update};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls Telegram forever, handling each message on its own task so a
/// running check does not block other commands.
pub async fn run_polling(client: TelegramClient, ctx: Arc<ChatContext>) {
    let mut offset: Option<i64> = None;
    info!("starting polling");
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(error = %err, "getUpdates failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let Some((incoming, text)) = incoming_text(&update) else {
                debug!(update_id = update.update_id, "ignoring non-text update");
                continue;
            };
            let client = client.clone();
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let reply = TelegramNotifier::plain(client, incoming.chat_id);
                if let Err(err) = commands::handle_text(&ctx, incoming, &text, &reply).await {
                    warn!(chat_id = incoming.chat_id, error = %err, "message handling failed");
                }
            });
        }
    }
}

fn incoming_text(update: &Update) -> Option<(Incoming, String)> {
    let message = update.message.as_ref()?;
    let text = message.text.clone()?;
    let user_id = message.from.as_ref()?.id;
    Some((
        Incoming {
            user_id,
            chat_id: message.chat.id,
        },
        text,
    ))
}
