use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::notify::NotificationSink;

/// Sends feedback to the text channel a command came from.
///
/// Each message goes out on its own task; delivery failures are only logged.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
    guild_id: GuildId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId, guild_id: GuildId) -> Self {
        Self {
            http,
            channel_id,
            guild_id,
        }
    }

    fn send(&self, content: String) {
        let http = self.http.clone();
        let channel_id = self.channel_id;

        tokio::spawn(async move {
            if let Err(e) = channel_id
                .send_message(&http, CreateMessage::new().content(content))
                .await
            {
                warn!("Couldn't send message to channel {}: {:?}", channel_id, e);
            }
        });
    }
}

impl NotificationSink for ChannelNotifier {
    fn status(&self, text: &str) {
        info!("📣 [guild {}] {}", self.guild_id, text);
        self.send(text.to_string());
    }

    fn success(&self, text: &str) {
        info!("✅ [guild {}] {}", self.guild_id, text);
        self.send(text.to_string());
    }

    fn error(&self, text: &str) {
        error!("❌ [guild {}] {}", self.guild_id, text);
        self.send(format!("⚠️ {}", text));
    }
}
