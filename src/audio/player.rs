use serenity::model::id::{ChannelId, GuildId};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{oneshot, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    backend::{AudioBackend, AudioSource, TrackEnd},
    playlist::{RemovalOutcome, RepeatMode, Track, TrackId},
    registry::{GuildRegistry, GuildSession},
    repeat::{self, NextTrack},
    state::{
        transition, ActivePlayback, CompletionReason, PlaybackId, PlaybackKind, PlayerEvent,
        PlayerState, Transition,
    },
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    notify::{LogSink, NotificationSink},
    sources::{is_youtube_url, MetadataLookup, TrackSearch},
    storage::PersistentStore,
};

/// Who asked for an operation, and where to answer.
///
/// `voice_channel` is the requester's voice channel at the time of the
/// command; it is looked up fresh for every command, never cached.
#[derive(Clone)]
pub struct RequestContext {
    pub guild_id: GuildId,
    pub voice_channel: Option<ChannelId>,
    pub user: Option<String>,
    pub sink: Arc<dyn NotificationSink>,
}

impl RequestContext {
    pub fn new(guild_id: GuildId, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            guild_id,
            voice_channel: None,
            user: None,
            sink,
        }
    }

    pub fn in_voice(mut self, channel_id: ChannelId) -> Self {
        self.voice_channel = Some(channel_id);
        self
    }

    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn require_voice(&self) -> PlaybackResult<ChannelId> {
        self.voice_channel.ok_or(PlaybackError::NoVoiceChannel)
    }
}

/// Read-only copy of a guild's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    pub tracks: Vec<Track>,
    pub cursor: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub volume: f32,
    pub state: PlayerState,
    pub connected_to: Option<ChannelId>,
}

/// Voice join to run once the guild lock is released.
#[must_use]
struct PendingJoin {
    attempt: u64,
    channel_id: ChannelId,
}

/// Drives join → play → completion → advance for every guild.
///
/// Each public operation locks the guild's session for the whole state
/// change. The voice join is the only step that runs unlocked; its result is
/// applied under the lock again and dropped if the guild moved on meanwhile.
#[derive(Clone)]
pub struct PlaybackController {
    registry: Arc<GuildRegistry>,
    backend: Arc<dyn AudioBackend>,
    lookup: Option<Arc<dyn MetadataLookup>>,
    search: Option<Arc<dyn TrackSearch>>,
    store: Option<Arc<dyn PersistentStore>>,
    exit_sound: Option<PathBuf>,
}

impl PlaybackController {
    pub fn new(registry: Arc<GuildRegistry>, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            registry,
            backend,
            lookup: None,
            search: None,
            store: None,
            exit_sound: None,
        }
    }

    pub fn with_metadata(mut self, lookup: Arc<dyn MetadataLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn TrackSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_exit_sound(mut self, path: PathBuf) -> Self {
        self.exit_sound = Some(path);
        self
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Adds a YouTube link, or the first search hit for free text.
    ///
    /// Returns the new index, or `None` when the search found nothing.
    pub async fn request_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> PlaybackResult<Option<usize>> {
        let query = query.trim();

        let track = if is_youtube_url(query) || query.starts_with("http") {
            Track::new(query)
        } else {
            let search = self.search.as_ref().ok_or(PlaybackError::SearchUnavailable)?;
            let hit = search
                .search_first(query)
                .await
                .map_err(|e| PlaybackError::Search(e.to_string()))?;

            match hit {
                Some(hit) => Track::new(hit.url).with_title(hit.title),
                None => {
                    ctx.sink.status(&format!(
                        "Your search query \"{}\" returned 0 results on YouTube.",
                        query
                    ));
                    return Ok(None);
                }
            }
        };

        let track = match &ctx.user {
            Some(user) => track.with_added_by(user.clone()),
            None => track,
        };
        self.request_track(ctx, track).await.map(Some)
    }

    /// Appends a track. Starts it right away when nothing was selected or the
    /// bot isn't connected; during playback it is only queued.
    pub async fn request_track(&self, ctx: &RequestContext, track: Track) -> PlaybackResult<usize> {
        let (index, pending) = {
            let mut session = self.session(ctx).await;
            let was_stopped = session.playlist.cursor().is_none();
            let connected = session.player.connection.is_some()
                || session.player.state == PlayerState::Connecting;

            let index = session.playlist.append(track)?;
            let added = session.playlist.tracks()[index].clone();
            match &added.title {
                Some(title) => ctx.sink.status(&format!(
                    "Adding \"{}\" from `{}` to the Sounds Playlist.",
                    title, added.url
                )),
                None => {
                    ctx.sink
                        .status(&format!("Adding `{}` to the Sounds Playlist.", added.url));
                    self.spawn_title_lookup(ctx.guild_id, added.id(), added.url.clone(), ctx.sink.clone());
                }
            }

            let pending = if was_stopped {
                session.playlist.set_cursor(Some(index));
                self.start_current(ctx, &mut session).await?
            } else if !connected {
                ctx.sink.status(
                    "I'm not connected to a voice channel, so I'm just going to start playing the Sound you just added to the list.",
                );
                session.playlist.set_cursor(Some(index));
                self.start_current(ctx, &mut session).await?
            } else {
                None
            };

            (index, pending)
        };

        if let Some(pending) = pending {
            self.finish_join(ctx, pending).await?;
        }
        Ok(index)
    }

    /// Resumes a paused stream, otherwise (re)joins and plays the track under
    /// the cursor (track 0 when stopped).
    pub async fn play_current_or_resume(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        ctx.require_voice()?;

        let pending = {
            let mut session = self.session(ctx).await;
            if session.player.state == PlayerState::Paused {
                self.resume_locked(ctx.guild_id, &mut session, ctx.sink.as_ref());
                None
            } else {
                self.start_current(ctx, &mut session).await?
            }
        };

        if let Some(pending) = pending {
            self.finish_join(ctx, pending).await?;
        }
        Ok(())
    }

    pub async fn pause(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        let mut session = self.session(ctx).await;

        match self.apply(ctx.guild_id, &mut session, PlayerEvent::Pause) {
            Transition::Enter(PlayerState::Paused) => {
                if let Some(active) = &session.player.active {
                    active.handle.pause();
                }
                info!("⏸️ Playback paused in guild {}", ctx.guild_id);
                ctx.sink.status("Paused.");
            }
            Transition::Ignore => debug!("Already paused in guild {}", ctx.guild_id),
            _ => ctx.sink.status("Nothing to pause, captain."),
        }
        Ok(())
    }

    /// Skips forward. Repeat-one does not apply to manual skips.
    pub async fn next(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        ctx.require_voice()?;

        let pending = {
            let mut session = self.session(ctx).await;
            let playlist = &session.playlist;
            let decision =
                repeat::next_track(playlist.cursor(), playlist.len(), playlist.repeat_mode());
            self.announce_advance(&session, decision, ctx.sink.as_ref());
            self.start_decision(ctx, &mut session, decision).await?
        };

        if let Some(pending) = pending {
            self.finish_join(ctx, pending).await?;
        }
        Ok(())
    }

    pub async fn previous(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        ctx.require_voice()?;

        let pending = {
            let mut session = self.session(ctx).await;
            let playlist = &session.playlist;
            let decision =
                repeat::previous_track(playlist.cursor(), playlist.len(), playlist.repeat_mode());
            match decision {
                NextTrack::Play(_) => ctx.sink.success("Skipping to the previous Sound..."),
                NextTrack::PlaylistExhausted => ctx.sink.success(
                    "There are no more previous Sounds in the Sounds Playlist. Stopping playback...",
                ),
                NextTrack::PlaylistEmpty => {}
            }
            self.start_decision(ctx, &mut session, decision).await?
        };

        if let Some(pending) = pending {
            self.finish_join(ctx, pending).await?;
        }
        Ok(())
    }

    /// Moves the cursor to `index` and plays it.
    pub async fn goto(&self, ctx: &RequestContext, index: i64) -> PlaybackResult<()> {
        ctx.require_voice()?;

        let pending = {
            let mut session = self.session(ctx).await;
            let index = session.playlist.resolve_index(index)?;
            session.playlist.goto(index)?;
            ctx.sink.success(&format!("Jumping to Sound {}.", index));
            self.start_current(ctx, &mut session).await?
        };

        if let Some(pending) = pending {
            self.finish_join(ctx, pending).await?;
        }
        Ok(())
    }

    /// Deletes a track. Removing the track that is playing moves on to the
    /// track that took its place.
    pub async fn remove_at(&self, ctx: &RequestContext, index: i64) -> PlaybackResult<RemovalOutcome> {
        let mut session = self.session(ctx).await;
        let index = session.playlist.resolve_index(index)?;
        let outcome = session.playlist.remove_at(index)?;
        ctx.sink
            .success(&format!("Sound with index {} deleted from Playlist.", index));

        if outcome.was_current_track_removed {
            let playlist = &session.playlist;
            let decision =
                repeat::next_track(playlist.cursor(), playlist.len(), playlist.repeat_mode());

            let state = session.player.state;
            match state {
                PlayerState::Playing | PlayerState::Paused => {
                    self.continue_decision(ctx.guild_id, &mut session, decision, ctx.sink.as_ref())
                        .await?;
                }
                PlayerState::Connecting => match decision {
                    // The pending join plays whatever the cursor points at.
                    NextTrack::Play(next) => session.playlist.set_cursor(Some(next)),
                    NextTrack::PlaylistEmpty | NextTrack::PlaylistExhausted => {
                        self.stop_locked(ctx.guild_id, &mut session, false, ctx.sink.as_ref())
                            .await;
                    }
                },
                PlayerState::Idle | PlayerState::Leaving => {}
            }
        }

        Ok(outcome)
    }

    /// Empties the playlist and stops playback.
    pub async fn clear(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        let mut session = self.session(ctx).await;
        session.playlist.clear();
        ctx.sink.success("Playlist cleared.");
        self.stop_locked(ctx.guild_id, &mut session, false, ctx.sink.as_ref())
            .await;
        Ok(())
    }

    pub async fn set_repeat_mode(&self, ctx: &RequestContext, mode: RepeatMode) -> PlaybackResult<()> {
        let mut session = self.session(ctx).await;
        session.playlist.set_repeat_mode(mode);
        ctx.sink
            .success(&format!("Playlist repeat mode is now \"{}\".", mode));
        Ok(())
    }

    /// Sets the guild volume; applies to the live stream and to every later
    /// track.
    pub async fn set_volume(&self, ctx: &RequestContext, volume: f32) -> PlaybackResult<()> {
        let volume = volume.clamp(0.0, 2.0);
        let mut session = self.session(ctx).await;
        session.playlist.set_volume(volume);
        if let Some(active) = &session.player.active {
            active.handle.set_volume(volume);
        }
        info!("🔊 Volume set to {}% in guild {}", (volume * 100.0) as u32, ctx.guild_id);
        ctx.sink.success(&format!("Volume set to {}.", volume));
        Ok(())
    }

    pub async fn list(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        let session = self.session(ctx).await;
        if session.playlist.is_empty() {
            return Err(PlaybackError::PlaylistEmpty);
        }
        ctx.sink.status(&session.playlist.render_listing());
        Ok(())
    }

    /// Resets the cursor and leaves voice. With `play_exit_sound` and a
    /// configured clip, the clip plays first and the disconnect happens when
    /// it ends.
    pub async fn stop(&self, ctx: &RequestContext, play_exit_sound: bool) -> PlaybackResult<()> {
        let mut session = self.session(ctx).await;
        self.stop_locked(ctx.guild_id, &mut session, play_exit_sound, ctx.sink.as_ref())
            .await;
        Ok(())
    }

    /// Leaves the voice channel, playing the exit clip when one is configured.
    pub async fn leave(&self, ctx: &RequestContext) -> PlaybackResult<()> {
        let mut session = self.session(ctx).await;
        if session.player.connection.is_none() && session.player.state != PlayerState::Connecting {
            return Err(PlaybackError::NotConnected);
        }
        self.stop_locked(ctx.guild_id, &mut session, true, ctx.sink.as_ref())
            .await;
        Ok(())
    }

    pub async fn save_playlist(&self, ctx: &RequestContext, name: &str) -> PlaybackResult<()> {
        let store = self.store.as_ref().ok_or(PlaybackError::StorageUnavailable)?;
        let tracks = {
            let session = self.session(ctx).await;
            if session.playlist.is_empty() {
                return Err(PlaybackError::PlaylistEmpty);
            }
            session.playlist.tracks().to_vec()
        };

        store
            .save_playlist(ctx.guild_id, name, &tracks)
            .await
            .map_err(|e| PlaybackError::Storage(e.to_string()))?;
        ctx.sink.success(&format!(
            "Saved {} Sounds as the playlist \"{}\".",
            tracks.len(),
            name
        ));
        Ok(())
    }

    /// Replaces the guild's playlist with a saved one. Playback stops; the
    /// cursor starts out unset.
    pub async fn load_playlist(&self, ctx: &RequestContext, name: &str) -> PlaybackResult<usize> {
        let store = self.store.as_ref().ok_or(PlaybackError::StorageUnavailable)?;
        let tracks = store
            .load_playlist(ctx.guild_id, name)
            .await
            .map_err(|e| PlaybackError::Storage(e.to_string()))?;

        let mut session = self.session(ctx).await;
        if session.player.state != PlayerState::Idle {
            self.stop_locked(ctx.guild_id, &mut session, false, ctx.sink.as_ref())
                .await;
        }
        let loaded = session.playlist.replace_tracks(tracks);
        ctx.sink
            .success(&format!("Loaded {} Sounds from the playlist \"{}\".", loaded, name));
        Ok(loaded)
    }

    /// Lists the names of the guild's saved playlists.
    pub async fn saved_playlists(&self, ctx: &RequestContext) -> PlaybackResult<Vec<String>> {
        let store = self.store.as_ref().ok_or(PlaybackError::StorageUnavailable)?;
        let names = store
            .list_playlists(ctx.guild_id)
            .await
            .map_err(|e| PlaybackError::Storage(e.to_string()))?;

        if names.is_empty() {
            ctx.sink.status("No saved playlists yet.");
        } else {
            ctx.sink
                .status(&format!("Saved playlists: {}", names.join(", ")));
        }
        Ok(names)
    }

    /// Drops everything kept for a guild the bot no longer belongs to.
    pub async fn forget_guild(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.registry.get(guild_id) else {
            return false;
        };
        {
            let mut session = session.lock_owned().await;
            self.release(guild_id, &mut session).await;
        }
        info!("🗑️ Forgot state of guild {}", guild_id);
        self.registry.remove(guild_id)
    }

    // ------------------------------------------------------------------
    // Backend events
    // ------------------------------------------------------------------

    /// Completion of one playback. Completions of superseded playbacks are
    /// recognised by their id and ignored.
    pub async fn on_playback_completed(
        &self,
        guild_id: GuildId,
        playback: PlaybackId,
        reason: CompletionReason,
    ) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut session = session.lock_owned().await;

        if !session.player.is_current(playback) {
            debug!(
                "⏭️ Ignoring end of superseded playback {} in guild {} ({:?})",
                playback, guild_id, reason
            );
            return;
        }

        let kind = session.player.active.as_ref().map(|a| a.kind);
        debug!("🏁 Playback {} ({:?}) ended in guild {}: {:?}", playback, kind, guild_id, reason);

        let sink = self.announcer(&session);
        match self.apply(guild_id, &mut session, PlayerEvent::Completed(reason.clone())) {
            Transition::Advance => {
                session.player.active = None;
                let playlist = &session.playlist;
                let decision =
                    repeat::after_finished(playlist.cursor(), playlist.len(), playlist.repeat_mode());
                debug!("🎵 Playback {} finished in guild {}: {:?}", playback, guild_id, decision);

                self.announce_advance(&session, decision, sink.as_ref());
                if let Err(e) = self
                    .continue_decision(guild_id, &mut session, decision, sink.as_ref())
                    .await
                {
                    error!("Error playing next track in guild {}: {:?}", guild_id, e);
                    sink.error(&e.to_string());
                }
            }
            Transition::Halt => {
                session.player.active = None;
                if let CompletionReason::Error(err) = &reason {
                    error!("❌ Stream error in guild {}: {}", guild_id, err);
                    sink.error(&format!("The audio stream ran into an error: {}", err));
                }
                self.release(guild_id, &mut session).await;
            }
            Transition::Enter(PlayerState::Idle) => {
                // Exit clip done.
                session.player.active = None;
                self.release(guild_id, &mut session).await;
            }
            _ => {}
        }
    }

    /// The bot was disconnected from voice by someone else. Disconnects
    /// while a join is in flight are the bot's own and are ignored.
    pub async fn handle_disconnected(&self, guild_id: GuildId) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut session = session.lock_owned().await;

        if let Transition::Enter(PlayerState::Idle) =
            self.apply(guild_id, &mut session, PlayerEvent::Disconnected)
        {
            session.player.retire_active();
            session.player.connection = None;
            info!("🔌 Voice connection lost in guild {}", guild_id);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn state(&self, guild_id: GuildId) -> PlayerState {
        match self.registry.get(guild_id) {
            Some(session) => {
                let session = session.lock().await;
                session.player.state
            }
            None => PlayerState::Idle,
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<PlaylistSnapshot> {
        let session = self.registry.get(guild_id)?;
        let session = session.lock().await;
        Some(PlaylistSnapshot {
            tracks: session.playlist.tracks().to_vec(),
            cursor: session.playlist.cursor(),
            repeat_mode: session.playlist.repeat_mode(),
            volume: session.playlist.volume(),
            state: session.player.state,
            connected_to: session.player.connection.as_ref().map(|c| c.channel_id()),
        })
    }

    /// Id of the playback currently owning the guild's stream.
    pub async fn current_playback(&self, guild_id: GuildId) -> Option<PlaybackId> {
        let session = self.registry.get(guild_id)?;
        let session = session.lock().await;
        session.player.active.as_ref().map(|a| a.id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn session(&self, ctx: &RequestContext) -> OwnedMutexGuard<GuildSession> {
        let mut session = self
            .registry
            .insert_or_get_lazy(ctx.guild_id)
            .lock_owned()
            .await;
        session.announce = Some(ctx.sink.clone());
        session
    }

    fn announcer(&self, session: &GuildSession) -> Arc<dyn NotificationSink> {
        session
            .announce
            .clone()
            .unwrap_or_else(|| Arc::new(LogSink))
    }

    /// Looks the event up in the transition table and enters the new state.
    fn apply(&self, guild_id: GuildId, session: &mut GuildSession, event: PlayerEvent) -> Transition {
        let from = session.player.state;
        let step = transition(from, &event);
        if let Transition::Enter(to) = step {
            session.player.state = to;
        }
        debug!("🔁 Guild {}: {} --{:?}--> {:?}", guild_id, from, event, step);
        step
    }

    fn resume_locked(&self, guild_id: GuildId, session: &mut GuildSession, sink: &dyn NotificationSink) {
        if let Transition::Enter(PlayerState::Playing) =
            self.apply(guild_id, session, PlayerEvent::Resume)
        {
            if let Some(active) = &session.player.active {
                active.handle.resume();
            }
            info!("▶️ Playback resumed in guild {}", guild_id);
            sink.status("Resuming playback.");
        }
    }

    fn announce_advance(&self, session: &GuildSession, decision: NextTrack, sink: &dyn NotificationSink) {
        let playlist = &session.playlist;
        match decision {
            NextTrack::Play(0) if playlist.cursor() == Some(playlist.len().saturating_sub(1)) && playlist.len() > 1 => {
                sink.success("The Playlist's repeat mode is \"all\". That was the end of the playlist. Starting the playlist over...");
            }
            NextTrack::Play(_) => {}
            NextTrack::PlaylistExhausted => sink.success(
                "There are no more Sounds in the Sounds Playlist. Stopping playback...",
            ),
            NextTrack::PlaylistEmpty => {}
        }
    }

    /// Applies a user-requested cursor move: play it (joining if needed) or
    /// stop when there is nothing left.
    async fn start_decision(
        &self,
        ctx: &RequestContext,
        session: &mut GuildSession,
        decision: NextTrack,
    ) -> PlaybackResult<Option<PendingJoin>> {
        match decision {
            NextTrack::Play(index) => {
                session.playlist.set_cursor(Some(index));
                self.start_current(ctx, session).await
            }
            NextTrack::PlaylistExhausted => {
                self.stop_locked(ctx.guild_id, session, false, ctx.sink.as_ref())
                    .await;
                Ok(None)
            }
            NextTrack::PlaylistEmpty => Err(PlaybackError::PlaylistEmpty),
        }
    }

    /// Applies a cursor move on the existing connection, for completions and
    /// deletions where nobody is there to join a channel.
    async fn continue_decision(
        &self,
        guild_id: GuildId,
        session: &mut GuildSession,
        decision: NextTrack,
        sink: &dyn NotificationSink,
    ) -> PlaybackResult<()> {
        match decision {
            NextTrack::Play(index) => {
                session.playlist.set_cursor(Some(index));
                if session.player.connection.is_none() {
                    self.release(guild_id, session).await;
                    return Err(PlaybackError::NotConnected);
                }
                self.play_cursor(guild_id, session, sink).await
            }
            NextTrack::PlaylistExhausted | NextTrack::PlaylistEmpty => {
                self.stop_locked(guild_id, session, false, sink).await;
                Ok(())
            }
        }
    }

    /// Plays the cursor track for the requester: right away when already in
    /// their channel, otherwise through a voice join.
    async fn start_current(
        &self,
        ctx: &RequestContext,
        session: &mut GuildSession,
    ) -> PlaybackResult<Option<PendingJoin>> {
        let channel_id = ctx.require_voice()?;

        if session.playlist.current_track().is_none() {
            let playlist = &session.playlist;
            match repeat::next_track(playlist.cursor(), playlist.len(), playlist.repeat_mode()) {
                NextTrack::Play(index) => session.playlist.set_cursor(Some(index)),
                NextTrack::PlaylistEmpty | NextTrack::PlaylistExhausted => {
                    return Err(PlaybackError::PlaylistEmpty)
                }
            }
        }

        let in_channel = session
            .player
            .connection
            .as_ref()
            .is_some_and(|c| c.channel_id() == channel_id);
        if in_channel {
            self.play_cursor(ctx.guild_id, session, ctx.sink.as_ref()).await?;
            return Ok(None);
        }

        if let Some(kind) = session.player.retire_active() {
            debug!("⏹️ Dropping {:?} in guild {} to change channels", kind, ctx.guild_id);
        }
        if let Some(previous) = session.player.connection.take() {
            previous.leave().await;
        }
        self.apply(ctx.guild_id, session, PlayerEvent::Join);
        let attempt = session.player.next_join_attempt();
        Ok(Some(PendingJoin { attempt, channel_id }))
    }

    /// Runs a voice join outside the guild lock and applies its result.
    async fn finish_join(&self, ctx: &RequestContext, pending: PendingJoin) -> PlaybackResult<()> {
        let result = self.backend.join(ctx.guild_id, pending.channel_id).await;

        let mut session = self.session(ctx).await;
        let still_wanted = session.player.state == PlayerState::Connecting
            && session.player.join_attempt == pending.attempt;

        match result {
            Ok(connection) if !still_wanted => {
                debug!("Join attempt {} in guild {} was superseded", pending.attempt, ctx.guild_id);
                // The voice call is per guild; a newer join or a live
                // connection shares it.
                let in_use = session.player.state == PlayerState::Connecting
                    || session.player.connection.is_some();
                if !in_use {
                    connection.leave().await;
                }
                Ok(())
            }
            Ok(connection) => {
                info!("🔊 Connected to voice channel {} in guild {}", pending.channel_id, ctx.guild_id);
                session.player.connection = Some(connection);
                self.apply(ctx.guild_id, &mut session, PlayerEvent::JoinSucceeded);
                ctx.sink.success("I joined your voice channel successfully!");

                if session.playlist.current_track().is_none() {
                    let playlist = &session.playlist;
                    let decision =
                        repeat::next_track(playlist.cursor(), playlist.len(), playlist.repeat_mode());
                    return self
                        .continue_decision(ctx.guild_id, &mut session, decision, ctx.sink.as_ref())
                        .await;
                }
                self.play_cursor(ctx.guild_id, &mut session, ctx.sink.as_ref()).await
            }
            Err(e) if !still_wanted => {
                debug!("Ignoring failed, superseded join in guild {}: {}", ctx.guild_id, e);
                Ok(())
            }
            Err(e) => {
                warn!("Voice join failed in guild {}: {}", ctx.guild_id, e);
                self.apply(ctx.guild_id, &mut session, PlayerEvent::JoinFailed);
                Err(e.into())
            }
        }
    }

    /// Starts the cursor track on the current connection, replacing any
    /// active stream.
    async fn play_cursor(
        &self,
        guild_id: GuildId,
        session: &mut GuildSession,
        sink: &dyn NotificationSink,
    ) -> PlaybackResult<()> {
        let track = session
            .playlist
            .current_track()
            .cloned()
            .ok_or(PlaybackError::PlaylistEmpty)?;

        // The previous stream is gone before the next one exists.
        if let Some(kind) = session.player.retire_active() {
            debug!("⏹️ Replacing {:?} in guild {}", kind, guild_id);
        }

        let volume = session.playlist.volume();
        let connection = session
            .player
            .connection
            .as_ref()
            .ok_or(PlaybackError::NotConnected)?;
        let started = connection
            .play(AudioSource::Url(track.url.clone()), volume)
            .await;

        let playback = match started {
            Ok(playback) => playback,
            Err(e) => {
                error!("Error starting {} in guild {}: {}", track.url, guild_id, e);
                self.release(guild_id, session).await;
                return Err(e.into());
            }
        };

        let id = session.player.next_playback_id();
        session.player.active = Some(ActivePlayback {
            id,
            kind: PlaybackKind::Track(track.id()),
            handle: playback.handle,
        });
        self.apply(guild_id, session, PlayerEvent::TrackStarted);
        self.watch(guild_id, id, playback.ended);

        info!("🎵 Playing {} in guild {} ({})", track.display_title(), guild_id, id);
        sink.success(&format!("Attempting to play Sound: `{}`", track.display_title()));
        Ok(())
    }

    async fn stop_locked(
        &self,
        guild_id: GuildId,
        session: &mut GuildSession,
        play_exit_sound: bool,
        sink: &dyn NotificationSink,
    ) {
        session.playlist.set_cursor(None);

        let exit_clip = match (&self.exit_sound, play_exit_sound, &session.player.connection) {
            (Some(path), true, Some(_)) => Some(path.clone()),
            _ => None,
        };
        let from = session.player.state;

        match self.apply(
            guild_id,
            session,
            PlayerEvent::Stop {
                exit_clip: exit_clip.is_some(),
            },
        ) {
            Transition::Enter(PlayerState::Leaving) => {
                sink.success("Resetting Current Playlist Index and leaving voice channel.");
                if let Some(path) = exit_clip {
                    self.play_exit_clip(guild_id, session, path).await;
                }
            }
            Transition::Enter(PlayerState::Idle) => {
                sink.success("Resetting Current Playlist Index and leaving voice channel.");
                self.release(guild_id, session).await;
            }
            _ if from == PlayerState::Idle => sink.status(
                "I'm not in a voice channel, so I can't stop anything. I'll still reset the Current Playlist Index, though.",
            ),
            _ => {}
        }
    }

    async fn play_exit_clip(&self, guild_id: GuildId, session: &mut GuildSession, path: PathBuf) {
        session.player.retire_active();

        let volume = session.playlist.volume();
        let Some(connection) = session.player.connection.as_ref() else {
            self.release(guild_id, session).await;
            return;
        };

        match connection.play(AudioSource::File(path), volume).await {
            Ok(playback) => {
                let id = session.player.next_playback_id();
                session.player.active = Some(ActivePlayback {
                    id,
                    kind: PlaybackKind::ExitClip,
                    handle: playback.handle,
                });
                self.watch(guild_id, id, playback.ended);
                debug!("👋 Exit clip {} playing in guild {}", id, guild_id);
            }
            Err(e) => {
                warn!("Exit clip failed in guild {}, leaving right away: {}", guild_id, e);
                self.release(guild_id, session).await;
            }
        }
    }

    /// Stops the stream, leaves voice and goes idle. The cursor is kept.
    async fn release(&self, guild_id: GuildId, session: &mut GuildSession) {
        session.player.retire_active();
        if let Some(connection) = session.player.connection.take() {
            connection.leave().await;
            info!("👋 Left voice channel in guild {}", guild_id);
        }
        session.player.state = PlayerState::Idle;
    }

    /// Delivers the playback's single completion back into the controller.
    fn watch(&self, guild_id: GuildId, playback: PlaybackId, ended: oneshot::Receiver<TrackEnd>) {
        let controller = self.clone();
        tokio::spawn(async move {
            let reason = match ended.await {
                Ok(end) => CompletionReason::from(end),
                Err(_) => CompletionReason::Cleared,
            };
            controller
                .on_playback_completed(guild_id, playback, reason)
                .await;
        });
    }

    fn spawn_title_lookup(
        &self,
        guild_id: GuildId,
        track_id: TrackId,
        url: String,
        sink: Arc<dyn NotificationSink>,
    ) {
        let Some(lookup) = self.lookup.clone() else {
            return;
        };
        let registry = self.registry.clone();

        tokio::spawn(async move {
            let title = match lookup.resolve_title(&url).await {
                Ok(title) => title,
                Err(e) => {
                    warn!("Title lookup for {} failed: {:?}", url, e);
                    return;
                }
            };

            let Some(session) = registry.get(guild_id) else {
                return;
            };
            let mut session = session.lock().await;
            if session.playlist.patch_title(track_id, title.clone()) {
                sink.status(&format!(
                    "Updating title associated with `{}` to \"{}\".",
                    url, title
                ));
            }
        });
    }
}
