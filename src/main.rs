use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use clamster::{
    audio::{player::PlaybackController, registry::GuildRegistry, songbird_backend::SongbirdBackend},
    bot::{commands::CommandRouter, help::CommandCatalog, ClamsterBot},
    config::Config,
    sources::youtube_api_v3::YouTubeApiV3Client,
    storage::JsonStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clamster=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Starting Clamster v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    let songbird = Songbird::serenity();
    let registry = Arc::new(GuildRegistry::new(config.default_volume, config.max_playlist_size));
    let backend = Arc::new(SongbirdBackend::new(songbird.clone()));

    let mut controller = PlaybackController::new(registry, backend).with_store(storage);

    match &config.youtube_api_key {
        Some(key) => {
            let youtube = Arc::new(YouTubeApiV3Client::new(key.clone())?);
            controller = controller
                .with_metadata(youtube.clone())
                .with_search(youtube);
            info!("🔍 YouTube API v3 enabled for titles and search");
        }
        None => warn!("⚠️ No YOUTUBE_API_KEY set; titles won't be looked up and searching is disabled"),
    }

    if let Some(path) = &config.exit_sound_path {
        if path.exists() {
            controller = controller.with_exit_sound(path.clone());
        } else {
            warn!("⚠️ Exit sound {} not found, leaving without it", path.display());
        }
    }

    let router = Arc::new(CommandRouter::new(
        controller,
        Arc::new(CommandCatalog::new(config.command_prefix.clone())),
        config.command_prefix.clone(),
    ));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(ClamsterBot::new(router))
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Couldn't listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Missing dependencies: yt-dlp and ffmpeg must both be runnable");
    }
}
