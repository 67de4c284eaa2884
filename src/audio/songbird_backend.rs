use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File as FileInput, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

use super::backend::{AudioBackend, AudioSource, Playback, PlaybackHandle, TrackEnd, VoiceConnection};
use crate::error::AudioError;

/// Voice backend on top of the songbird manager registered with serenity.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http_client: reqwest::Client,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, AudioError> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error joining voice channel {} in guild {}: {:?}", channel_id, guild_id, e);
            AudioError::Join(e.to_string())
        })?;

        Ok(Box::new(SongbirdConnection {
            call,
            manager: self.manager.clone(),
            http_client: self.http_client.clone(),
            guild_id,
            channel_id,
        }))
    }
}

struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    http_client: reqwest::Client,
    guild_id: GuildId,
    channel_id: ChannelId,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(&self, source: AudioSource, volume: f32) -> Result<Playback, AudioError> {
        let input: Input = match source {
            AudioSource::Url(url) => YoutubeDl::new(self.http_client.clone(), url).into(),
            AudioSource::File(path) => {
                if !path.exists() {
                    return Err(AudioError::Play(format!("{} does not exist", path.display())));
                }
                FileInput::new(path).into()
            }
        };

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(volume) {
            warn!("Couldn't set volume on new track in guild {}: {:?}", self.guild_id, e);
        }

        let (tx, rx) = oneshot::channel();
        let notifier = TrackEndNotifier {
            guild_id: self.guild_id,
            sender: Arc::new(SyncMutex::new(Some(tx))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| AudioError::Play(format!("couldn't watch track: {}", e)))?;
        }

        Ok(Playback {
            handle: Box::new(SongbirdHandle(handle)),
            ended: rx,
        })
    }

    async fn leave(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Leaving voice in guild {}: {:?}", self.guild_id, e);
        }
    }
}

struct SongbirdHandle(TrackHandle);

impl PlaybackHandle for SongbirdHandle {
    fn pause(&self) {
        let _ = self.0.pause();
    }

    fn resume(&self) {
        let _ = self.0.play();
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.0.set_volume(volume);
    }

    fn stop(&self) {
        let _ = self.0.stop();
    }
}

/// Forwards the first end or error event of a track to its playback's
/// one-shot channel. Later events for the same track are dropped.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    sender: Arc<SyncMutex<Option<oneshot::Sender<TrackEnd>>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = match ctx {
            EventContext::Track(tracks) => match tracks.first().map(|(state, _)| &state.playing) {
                Some(PlayMode::Errored(e)) => {
                    error!("❌ Track error in guild {}: {:?}", self.guild_id, e);
                    TrackEnd::Errored(format!("{:?}", e))
                }
                Some(PlayMode::Stop) => TrackEnd::Closed,
                _ => TrackEnd::Finished(None),
            },
            _ => TrackEnd::Finished(None),
        };

        if let Some(sender) = self.sender.lock().take() {
            debug!("🎵 Track ended in guild {}: {:?}", self.guild_id, end);
            let _ = sender.send(end);
        }

        None
    }
}
