//! # Bot Module
//!
//! Discord side of Clamster.
//!
//! - [`ClamsterBot`] implements serenity's [`EventHandler`]: it answers
//!   `ping`, parses prefixed chat commands and watches for the bot being
//!   disconnected from voice or removed from a guild
//! - [`commands::CommandRouter`] maps each command to one playback controller
//!   call and reports failures
//! - [`notifier::ChannelNotifier`] sends the controller's feedback back to the
//!   text channel a command came from
//! - [`help`] holds the usage text

use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Message, Ready, UnavailableGuild, UserId,
        VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, info};

pub mod commands;
pub mod help;
pub mod notifier;

use crate::audio::player::RequestContext;
use commands::CommandRouter;
use notifier::ChannelNotifier;

/// Main Discord event handler.
pub struct ClamsterBot {
    router: Arc<CommandRouter>,
}

impl ClamsterBot {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for ClamsterBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 Bot online. I'm Clamster! The clam with the pain. Actually though I'm `{}`.", ready.user.tag());
        info!("📊 Connected to {} guilds", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if msg.content == "ping" {
            if let Err(e) = msg.reply(&ctx, "pong").await {
                debug!("Couldn't answer ping: {:?}", e);
            }
            return;
        }

        let Some(body) = msg.content.strip_prefix(self.router.prefix()) else {
            return;
        };
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let mut parts = body.split_whitespace();
        let Some(name) = parts.next() else {
            return;
        };
        let args: Vec<&str> = parts.collect();

        let sink = Arc::new(ChannelNotifier::new(ctx.http.clone(), msg.channel_id, guild_id));
        let mut request = RequestContext::new(guild_id, sink).by(msg.author.name.clone());
        request.voice_channel = get_user_voice_channel(&ctx, guild_id, msg.author.id);

        if let Err(e) = self.router.dispatch(&request, name, &args).await {
            debug!("Command `{}` in guild {} ended with: {:?}", name, guild_id, e);
        }
    }

    /// Moves the guild to idle when someone else disconnects the bot.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot disconnected from voice in guild {}", guild_id);
            self.router.controller().handle_disconnected(guild_id).await;
        }
    }

    /// Drops the guild's playlist once the bot was kicked or the guild deleted.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Outages also arrive here, flagged unavailable.
        if incomplete.unavailable {
            return;
        }
        if self.router.controller().forget_guild(incomplete.id).await {
            info!("👋 Removed from guild {}", incomplete.id);
        }
    }
}

/// The requester's current voice channel, read from the cache.
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
