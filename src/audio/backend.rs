//! Contract between the playback controller and whatever actually moves
//! audio to a voice channel.
//!
//! The controller only needs three capabilities: join a channel, play a
//! source on a joined connection, and control/observe the resulting stream.
//! Completion is delivered through a one-shot channel, so each playback ends
//! exactly once.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::error::AudioError;

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Remote media page (YouTube and friends).
    Url(String),
    /// Local file, used for the exit clip.
    File(PathBuf),
}

/// Terminal event of one playback, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    Finished(Option<String>),
    Errored(String),
    Closed,
}

/// Control surface of a live stream.
pub trait PlaybackHandle: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn set_volume(&self, volume: f32);
    fn stop(&self);
}

/// A started stream: its controls plus the receiver that fires once when it
/// ends.
pub struct Playback {
    pub handle: Box<dyn PlaybackHandle>,
    pub ended: oneshot::Receiver<TrackEnd>,
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    async fn play(&self, source: AudioSource, volume: f32) -> Result<Playback, AudioError>;

    async fn leave(&self);
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, AudioError>;
}
