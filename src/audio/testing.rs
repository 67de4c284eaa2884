//! In-memory collaborators for controller tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::{oneshot, Semaphore};

use super::backend::{AudioBackend, AudioSource, Playback, PlaybackHandle, TrackEnd, VoiceConnection};
use crate::{error::AudioError, notify::NotificationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status,
    Success,
    Error,
}

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.messages.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl NotificationSink for RecordingSink {
    fn status(&self, text: &str) {
        self.messages.lock().push((Level::Status, text.to_string()));
    }

    fn success(&self, text: &str) {
        self.messages.lock().push((Level::Success, text.to_string()));
    }

    fn error(&self, text: &str) {
        self.messages.lock().push((Level::Error, text.to_string()));
    }
}

#[derive(Default)]
pub struct HandleState {
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub volume: Mutex<f32>,
}

struct FakeHandle(Arc<HandleState>);

impl PlaybackHandle for FakeHandle {
    fn pause(&self) {
        self.0.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.0.paused.store(false, Ordering::SeqCst);
    }

    fn set_volume(&self, volume: f32) {
        *self.0.volume.lock() = volume;
    }

    fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct FakePlay {
    pub source: AudioSource,
    pub volume: f32,
    pub state: Arc<HandleState>,
    finisher: Option<oneshot::Sender<TrackEnd>>,
}

#[derive(Default)]
struct Shared {
    plays: Mutex<Vec<FakePlay>>,
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
    leaves: AtomicUsize,
    fail_joins: AtomicBool,
    fail_plays: AtomicBool,
    join_gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Backend that records every call and lets the test end playbacks.
#[derive(Default, Clone)]
pub struct FakeBackend {
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub fn fail_joins(&self, fail: bool) {
        self.shared.fail_joins.store(fail, Ordering::SeqCst);
    }

    pub fn fail_plays(&self, fail: bool) {
        self.shared.fail_plays.store(fail, Ordering::SeqCst);
    }

    /// Holds every later join until the returned gate hands out a permit.
    pub fn gate_joins(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.shared.join_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.shared.joins.lock().clone()
    }

    pub fn leaves(&self) -> usize {
        self.shared.leaves.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<AudioSource> {
        self.shared.plays.lock().iter().map(|p| p.source.clone()).collect()
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.played()
            .into_iter()
            .filter_map(|s| match s {
                AudioSource::Url(url) => Some(url),
                AudioSource::File(_) => None,
            })
            .collect()
    }

    pub fn last_handle(&self) -> Option<Arc<HandleState>> {
        self.shared.plays.lock().last().map(|p| p.state.clone())
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.shared.plays.lock().last().map(|p| p.volume)
    }

    /// Fires the completion of the most recent playback.
    pub fn end_last(&self, end: TrackEnd) {
        if let Some(sender) = self
            .shared
            .plays
            .lock()
            .last_mut()
            .and_then(|p| p.finisher.take())
        {
            let _ = sender.send(end);
        }
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, AudioError> {
        self.shared.joins.lock().push((guild_id, channel_id));
        let gate = self.shared.join_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.shared.fail_joins.load(Ordering::SeqCst) {
            return Err(AudioError::Join("missing permissions".into()));
        }
        Ok(Box::new(FakeConnection {
            channel_id,
            shared: self.shared.clone(),
        }))
    }
}

struct FakeConnection {
    channel_id: ChannelId,
    shared: Arc<Shared>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(&self, source: AudioSource, volume: f32) -> Result<Playback, AudioError> {
        if self.shared.fail_plays.load(Ordering::SeqCst) {
            return Err(AudioError::Play("unplayable".into()));
        }

        let (tx, rx) = oneshot::channel();
        let state = Arc::new(HandleState::default());
        *state.volume.lock() = volume;
        self.shared.plays.lock().push(FakePlay {
            source,
            volume,
            state: state.clone(),
            finisher: Some(tx),
        });

        Ok(Playback {
            handle: Box::new(FakeHandle(state)),
            ended: rx,
        })
    }

    async fn leave(&self) {
        self.shared.leaves.fetch_add(1, Ordering::SeqCst);
    }
}
