//! # Audio Module
//!
//! Per-guild playlists and the playback state machine that drives them.
//!
//! ## Architecture
//!
//! ### [`playlist`] - Playlist Store
//! - Ordered tracks, the play cursor, repeat mode and volume of one guild
//! - Index bookkeeping when tracks are deleted
//!
//! ### [`repeat`] - Repeat Policy
//! - Pure next/previous selection for `none`, `one` and `all`
//!
//! ### [`state`] - Player State Machine
//! - `Idle → Connecting → Playing ⇄ Paused → Leaving → Idle`
//! - Playback ids that make stale completions harmless
//!
//! ### [`player`] - Playback Controller
//! - Join, play, advance, stop and leave for every guild
//! - Serialises each guild's operations behind that guild's lock
//!
//! ### [`backend`] / [`songbird_backend`] - Voice Backend
//! - The controller only talks to the [`backend::AudioBackend`] trait
//! - [`songbird_backend::SongbirdBackend`] implements it with songbird and yt-dlp
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use clamster::audio::{player::{PlaybackController, RequestContext}, registry::GuildRegistry};
//! use clamster::notify::LogSink;
//! use serenity::all::{ChannelId, GuildId};
//! use std::sync::Arc;
//!
//! # async fn example(backend: Arc<dyn clamster::audio::backend::AudioBackend>) -> anyhow::Result<()> {
//! let registry = Arc::new(GuildRegistry::new(1.0, 1000));
//! let controller = PlaybackController::new(registry, backend);
//!
//! let ctx = RequestContext::new(GuildId::new(1), Arc::new(LogSink)).in_voice(ChannelId::new(2));
//! controller.request_query(&ctx, "https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//! controller.pause(&ctx).await?;
//! controller.play_current_or_resume(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod player;
pub mod playlist;
pub mod registry;
pub mod repeat;
pub mod songbird_backend;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
