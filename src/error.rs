//! Error taxonomy shared by the playlist store, the playback controller and
//! the command router.
//!
//! Each layer owns one enum and wraps the layer below it with `#[from]`, so a
//! failure keeps its original kind all the way up to the router, which turns
//! it into exactly one user-facing message.

use thiserror::Error;

/// Failures of the per-guild playlist data structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("Index {index} is out of range (the playlist has {len} Sounds).")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Unhandled repeat mode `{0}`. Use `none`, `one` or `all`.")]
    InvalidMode(String),

    #[error("A Sound needs a non-empty URL.")]
    EmptyUrl,

    #[error("The playlist is full (maximum {0} Sounds).")]
    Full(usize),
}

/// Failures reported by an [`AudioBackend`](crate::audio::backend::AudioBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("The bot ran into an error when joining your voice channel: {0}")]
    Join(String),

    #[error("Couldn't start the audio stream: {0}")]
    Play(String),
}

/// Failures of playback controller operations.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    #[error("Join a voice channel first.")]
    NoVoiceChannel,

    #[error(transparent)]
    Connection(#[from] AudioError),

    #[error("There's no playlist here.")]
    PlaylistEmpty,

    #[error("I'm either not in a voice channel or I can't detect that I'm in one.")]
    NotConnected,

    #[error("You haven't set up a YouTube API key, so I can't search YouTube!")]
    SearchUnavailable,

    #[error("The YouTube API returned an error: {0}")]
    Search(String),

    #[error("Playlist storage isn't configured.")]
    StorageUnavailable,

    #[error("Playlist storage failed: {0}")]
    Storage(String),
}

/// Failures of the command router.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("There is no command `{prefix}{command}`!")]
    UnknownCommand { prefix: String, command: String },

    #[error("Invalid arguments for `{command}`.")]
    InvalidArguments {
        command: String,
        arg: Option<String>,
    },

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl From<PlaylistError> for CommandError {
    fn from(err: PlaylistError) -> Self {
        CommandError::Playback(PlaybackError::Playlist(err))
    }
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
