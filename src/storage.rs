use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::audio::playlist::Track;

/// Named playlists saved per guild.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn save_playlist(&self, guild_id: GuildId, name: &str, tracks: &[Track]) -> Result<()>;

    async fn load_playlist(&self, guild_id: GuildId, name: &str) -> Result<Vec<Track>>;

    /// Names of the playlists saved for a guild, sorted.
    async fn list_playlists(&self, guild_id: GuildId) -> Result<Vec<String>>;
}

/// Playlist file written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedPlaylist {
    name: String,
    guild_id: u64,
    tracks: Vec<Track>,
}

/// JSON-file storage: one file per saved playlist under
/// `<data_dir>/playlists/guild_<id>/<name>.json`.
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(data_dir.join("playlists")).await?;
        info!("📁 Storage initialised at: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    fn guild_dir(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir
            .join("playlists")
            .join(format!("guild_{}", guild_id.get()))
    }

    fn playlist_path(&self, guild_id: GuildId, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.guild_dir(guild_id).join(format!("{}.json", name)))
    }
}

#[async_trait]
impl PersistentStore for JsonStorage {
    async fn save_playlist(&self, guild_id: GuildId, name: &str, tracks: &[Track]) -> Result<()> {
        let path = self.playlist_path(guild_id, name)?;
        fs::create_dir_all(self.guild_dir(guild_id)).await?;

        let saved = SavedPlaylist {
            name: name.to_string(),
            guild_id: guild_id.get(),
            tracks: tracks.to_vec(),
        };
        fs::write(&path, serde_json::to_string_pretty(&saved)?).await?;

        info!("💾 Saved playlist '{}' ({} tracks) for guild {}", name, tracks.len(), guild_id);
        Ok(())
    }

    async fn load_playlist(&self, guild_id: GuildId, name: &str) -> Result<Vec<Track>> {
        let path = self.playlist_path(guild_id, name)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                anyhow::bail!("There's no saved playlist called '{}'", name)
            }
            Err(e) => return Err(e.into()),
        };

        let saved: SavedPlaylist = serde_json::from_str(&content).map_err(|e| {
            warn!("Corrupt playlist file {}: {}", path.display(), e);
            anyhow::anyhow!("The saved playlist '{}' is unreadable", name)
        })?;

        info!("📂 Loaded playlist '{}' ({} tracks) for guild {}", name, saved.tracks.len(), guild_id);
        Ok(saved.tracks)
    }

    async fn list_playlists(&self, guild_id: GuildId) -> Result<Vec<String>> {
        let dir = self.guild_dir(guild_id);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut files = fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        anyhow::bail!("Playlist names may only use letters, digits, '-' and '_'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_saved_playlists_load_back_per_guild() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let guild = GuildId::new(42);
        let tracks = vec![
            Track::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ").with_title("Rick"),
            Track::new("https://youtu.be/aaaaaaaaaaa").with_added_by("zach"),
        ];

        storage.save_playlist(guild, "party", &tracks).await.unwrap();
        let loaded = storage.load_playlist(guild, "party").await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title.as_deref(), Some("Rick"));
        assert_eq!(loaded[1].added_by.as_deref(), Some("zach"));
        assert_eq!(storage.list_playlists(guild).await.unwrap(), vec!["party".to_string()]);
        assert!(storage.load_playlist(GuildId::new(7), "party").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let guild = GuildId::new(1);

        assert!(storage.save_playlist(guild, "../escape", &[]).await.is_err());
        assert!(storage.load_playlist(guild, "").await.is_err());
    }
}
