use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Playback
    pub default_volume: f32,
    pub max_playlist_size: usize,
    pub exit_sound_path: Option<PathBuf>,

    // Paths
    pub data_dir: PathBuf,

    // APIs (optional)
    pub youtube_api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Couldn't create {}", config.data_dir.display()))?;

        Ok(config)
    }

    /// Builds the configuration from any key/value source; `load` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            max_playlist_size: parse_or(
                var("MAX_PLAYLIST_SIZE"),
                "MAX_PLAYLIST_SIZE",
                defaults.max_playlist_size,
            )?,
            exit_sound_path: var("EXIT_SOUND_PATH").map(PathBuf::from),

            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),

            youtube_api_key: var("YOUTUBE_API_KEY"),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Playlist size must be greater than 0
    /// - Command prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging. The token
    /// and API key are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Playback: {}% vol, {} max Sounds per playlist\n  \
            Exit sound: {}\n  \
            Data: {}\n  \
            YouTube API: {}",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_playlist_size,
            self.exit_sound_path
                .as_ref()
                .map_or("disabled".to_string(), |p| p.display().to_string()),
            self.data_dir.display(),
            if self.youtube_api_key.is_some() { "enabled" } else { "disabled" },
        )
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 1.0,
            max_playlist_size: 1000,
            exit_sound_path: None,

            data_dir: "./data".into(),

            youtube_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.default_volume, 1.0);
        assert_eq!(config.max_playlist_size, 1000);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.exit_sound_path, None);
        assert_eq!(config.youtube_api_key, None);
    }

    #[test]
    fn test_token_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_VOLUME", "2.5")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_VOLUME", "loud")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("MAX_PLAYLIST_SIZE", "0")]).is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "very-secret-token"),
            ("YOUTUBE_API_KEY", "very-secret-key"),
            ("EXIT_SOUND_PATH", "sounds/bye.mp3"),
        ])
        .unwrap();

        let summary = config.summary();
        assert!(!summary.contains("very-secret"));
        assert!(summary.contains("YouTube API: enabled"));
        assert!(summary.contains("sounds/bye.mp3"));
    }
}
