use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{playlist::GuildPlaylist, state::PlayerSlot};
use crate::notify::NotificationSink;

/// Everything the bot tracks for one guild. Always accessed through the
/// guild's mutex, so one lock holder sees a consistent playlist and player.
pub struct GuildSession {
    pub playlist: GuildPlaylist,
    pub(crate) player: PlayerSlot,
    /// Channel of the most recent command; completion events report here.
    pub(crate) announce: Option<Arc<dyn NotificationSink>>,
}

impl GuildSession {
    fn new(default_volume: f32, max_playlist_size: usize) -> Self {
        Self {
            playlist: GuildPlaylist::new(default_volume, max_playlist_size),
            player: PlayerSlot::default(),
            announce: None,
        }
    }
}

/// Registry of guild sessions, created lazily and kept for the life of the
/// process.
pub struct GuildRegistry {
    sessions: DashMap<GuildId, Arc<Mutex<GuildSession>>>,
    default_volume: f32,
    max_playlist_size: usize,
}

impl GuildRegistry {
    pub fn new(default_volume: f32, max_playlist_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            default_volume,
            max_playlist_size,
        }
    }

    /// Returns the guild's session, creating an empty one on first use.
    pub fn insert_or_get_lazy(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("📁 New playlist state for guild {}", guild_id);
                Arc::new(Mutex::new(GuildSession::new(
                    self.default_volume,
                    self.max_playlist_size,
                )))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildSession>>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Drops a guild's state, e.g. after the bot was removed from it.
    pub fn remove(&self, guild_id: GuildId) -> bool {
        self.sessions.remove(&guild_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_created_once_per_guild() {
        let registry = GuildRegistry::new(0.7, 10);
        let guild = GuildId::new(1);
        assert!(registry.get(guild).is_none());

        let first = registry.insert_or_get_lazy(guild);
        let second = registry.insert_or_get_lazy(guild);
        assert!(Arc::ptr_eq(&first, &second));

        let session = first.lock().await;
        assert_eq!(session.playlist.volume(), 0.7);
        assert_eq!(session.playlist.cursor(), None);
    }

    #[tokio::test]
    async fn test_guilds_are_isolated() {
        let registry = GuildRegistry::new(1.0, 10);
        let a = registry.insert_or_get_lazy(GuildId::new(1));
        let b = registry.insert_or_get_lazy(GuildId::new(2));

        // Holding one guild's lock must not block another guild.
        let _held = a.lock().await;
        assert!(b.try_lock().is_ok());
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(GuildId::new(2)));
    }
}
