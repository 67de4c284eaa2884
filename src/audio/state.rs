//! Playback state machine of a single guild.
//!
//! [`transition`] is the whole table: every (state, event) pair maps to one
//! [`Transition`]. The controller consults it before touching the backend,
//! so no branch of the playback logic decides on its own which state comes
//! next.

use std::fmt;

use super::{
    backend::{PlaybackHandle, TrackEnd, VoiceConnection},
    playlist::TrackId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// No connection, nothing playing.
    #[default]
    Idle,
    /// Voice join in flight.
    Connecting,
    Playing,
    Paused,
    /// Exit clip playing; the connection is released when it ends.
    Leaving,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlayerState::Idle => "idle",
            PlayerState::Connecting => "connecting",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Leaving => "leaving",
        })
    }
}

/// Why a playback ended, as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReason {
    Finished(Option<String>),
    Error(String),
    /// A newer playback replaced this one.
    Superseded,
    /// Stopped by a stop/clear, or the stream was closed underneath us.
    Cleared,
}

impl From<TrackEnd> for CompletionReason {
    fn from(end: TrackEnd) -> Self {
        match end {
            TrackEnd::Finished(reason) => CompletionReason::Finished(reason),
            TrackEnd::Errored(err) => CompletionReason::Error(err),
            TrackEnd::Closed => CompletionReason::Cleared,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Join,
    JoinSucceeded,
    JoinFailed,
    TrackStarted,
    Pause,
    Resume,
    Completed(CompletionReason),
    Stop { exit_clip: bool },
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter(PlayerState),
    /// Run the next-track algorithm and play its result.
    Advance,
    /// Stop playing, release the connection, keep the cursor.
    Halt,
    /// Already in the requested state.
    Ignore,
    /// Event makes no sense in this state.
    Reject,
}

pub fn transition(from: PlayerState, event: &PlayerEvent) -> Transition {
    use PlayerState::*;

    match (from, event) {
        (_, PlayerEvent::Join) => Transition::Enter(Connecting),

        (Connecting, PlayerEvent::JoinSucceeded) => Transition::Enter(Playing),
        (Connecting, PlayerEvent::JoinFailed) => Transition::Enter(Idle),
        (Idle | Playing | Paused | Leaving, PlayerEvent::JoinSucceeded | PlayerEvent::JoinFailed) => {
            Transition::Reject
        }

        (Connecting | Playing | Paused | Leaving, PlayerEvent::TrackStarted) => {
            Transition::Enter(Playing)
        }
        (Idle, PlayerEvent::TrackStarted) => Transition::Reject,

        (Playing, PlayerEvent::Pause) => Transition::Enter(Paused),
        (Paused, PlayerEvent::Pause) => Transition::Ignore,
        (Idle | Connecting | Leaving, PlayerEvent::Pause) => Transition::Reject,

        (Paused, PlayerEvent::Resume) => Transition::Enter(Playing),
        (Playing, PlayerEvent::Resume) => Transition::Ignore,
        (Idle | Connecting | Leaving, PlayerEvent::Resume) => Transition::Reject,

        (Playing | Paused, PlayerEvent::Completed(CompletionReason::Finished(_))) => {
            Transition::Advance
        }
        (Playing | Paused, PlayerEvent::Completed(CompletionReason::Error(_) | CompletionReason::Cleared)) => {
            Transition::Halt
        }
        (Leaving, PlayerEvent::Completed(reason)) if *reason != CompletionReason::Superseded => {
            Transition::Enter(Idle)
        }
        (_, PlayerEvent::Completed(_)) => Transition::Ignore,

        (Idle, PlayerEvent::Stop { .. }) => Transition::Ignore,
        (Connecting, PlayerEvent::Stop { .. }) => Transition::Enter(Idle),
        (Playing | Paused, PlayerEvent::Stop { exit_clip: true }) => Transition::Enter(Leaving),
        (Playing | Paused, PlayerEvent::Stop { exit_clip: false }) => Transition::Enter(Idle),
        (Leaving, PlayerEvent::Stop { exit_clip: true }) => Transition::Ignore,
        (Leaving, PlayerEvent::Stop { exit_clip: false }) => Transition::Enter(Idle),

        (Idle | Connecting, PlayerEvent::Disconnected) => Transition::Ignore,
        (_, PlayerEvent::Disconnected) => Transition::Enter(Idle),
    }
}

/// Identifies one playback within a guild; completions carrying an older id
/// belong to a superseded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackId(pub(crate) u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Track(TrackId),
    ExitClip,
}

pub(crate) struct ActivePlayback {
    pub id: PlaybackId,
    pub kind: PlaybackKind,
    pub handle: Box<dyn PlaybackHandle>,
}

/// Voice-side half of a guild session, owned by the controller.
#[derive(Default)]
pub(crate) struct PlayerSlot {
    pub state: PlayerState,
    pub connection: Option<Box<dyn VoiceConnection>>,
    pub active: Option<ActivePlayback>,
    pub join_attempt: u64,
    last_playback: u64,
}

impl PlayerSlot {
    pub fn next_playback_id(&mut self) -> PlaybackId {
        self.last_playback += 1;
        PlaybackId(self.last_playback)
    }

    pub fn next_join_attempt(&mut self) -> u64 {
        self.join_attempt += 1;
        self.join_attempt
    }

    pub fn is_current(&self, id: PlaybackId) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Stops and drops the active stream, if any. Its completion will arrive
    /// with a stale id.
    pub fn retire_active(&mut self) -> Option<PlaybackKind> {
        self.active.take().map(|active| {
            active.handle.stop();
            active.kind
        })
    }
}
