use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, info, warn};

use crate::error::PlaylistError;

/// Per-guild identifier of a track, stable across deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TrackId(u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(skip)]
    id: TrackId,
    pub url: String,
    pub title: Option<String>,
    pub added_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: TrackId::default(),
            url: url.into(),
            title: None,
            added_by: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_added_by(mut self, user: impl Into<String>) -> Self {
        self.added_by = Some(user.into());
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Title if the lookup has resolved, otherwise the URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl FromStr for RepeatMode {
    type Err = PlaylistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(RepeatMode::None),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            _ => Err(PlaylistError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        })
    }
}

/// Result of [`GuildPlaylist::remove_at`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalOutcome {
    pub removed: Track,
    pub index: usize,
    /// The removed track was the one under the cursor; the caller has to
    /// advance.
    pub was_current_track_removed: bool,
}

/// Ordered track list, cursor and repeat mode of one guild.
///
/// Invariant: `cursor` is `None` or a valid index, and always `None` while
/// the list is empty.
#[derive(Debug, Clone)]
pub struct GuildPlaylist {
    tracks: Vec<Track>,
    cursor: Option<usize>,
    repeat_mode: RepeatMode,
    volume: f32,
    max_size: usize,
    next_track_id: u64,
}

impl GuildPlaylist {
    pub fn new(volume: f32, max_size: usize) -> Self {
        Self {
            tracks: Vec::new(),
            cursor: None,
            repeat_mode: RepeatMode::None,
            volume,
            max_size,
            next_track_id: 1,
        }
    }

    /// Pushes a track to the end and returns its index.
    pub fn append(&mut self, mut track: Track) -> Result<usize, PlaylistError> {
        if track.url.trim().is_empty() {
            return Err(PlaylistError::EmptyUrl);
        }
        if self.tracks.len() >= self.max_size {
            return Err(PlaylistError::Full(self.max_size));
        }

        track.id = TrackId(self.next_track_id);
        self.next_track_id += 1;

        info!("➕ Added to the playlist: {}", track.display_title());
        self.tracks.push(track);
        Ok(self.tracks.len() - 1)
    }

    /// Replaces every track, resetting the cursor. Used when a saved playlist
    /// is loaded.
    pub fn replace_tracks(&mut self, tracks: Vec<Track>) -> usize {
        self.clear();
        for track in tracks.into_iter().take(self.max_size) {
            let url = track.url.clone();
            if let Err(e) = self.append(track) {
                warn!("Skipping saved track {}: {}", url, e);
            }
        }
        self.tracks.len()
    }

    /// Converts a user-supplied index into a valid position.
    pub fn resolve_index(&self, index: i64) -> Result<usize, PlaylistError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.tracks.len())
            .ok_or(PlaylistError::IndexOutOfRange {
                index,
                len: self.tracks.len(),
            })
    }

    pub fn remove_at(&mut self, index: usize) -> Result<RemovalOutcome, PlaylistError> {
        if index >= self.tracks.len() {
            return Err(PlaylistError::IndexOutOfRange {
                index: index as i64,
                len: self.tracks.len(),
            });
        }

        let removed = self.tracks.remove(index);
        let mut was_current_track_removed = false;

        if let Some(cursor) = self.cursor {
            if index < cursor {
                self.cursor = Some(cursor - 1);
            } else if index == cursor {
                // Step back so the next advance lands on the track that slid
                // into the removed slot.
                self.cursor = cursor.checked_sub(1);
                was_current_track_removed = true;
            }
        }

        debug!("❌ Removed track at position {}: {}", index, removed.display_title());
        Ok(RemovalOutcome {
            removed,
            index,
            was_current_track_removed,
        })
    }

    /// Empties the list and resets the cursor. Repeat mode and volume survive.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = None;
        info!("🗑️ Playlist cleared");
    }

    pub fn goto(&mut self, index: usize) -> Result<(), PlaylistError> {
        if index >= self.tracks.len() {
            return Err(PlaylistError::IndexOutOfRange {
                index: index as i64,
                len: self.tracks.len(),
            });
        }
        self.cursor = Some(index);
        Ok(())
    }

    /// Sets the cursor without bounds checks beyond the invariant; `None`
    /// means stopped.
    pub(crate) fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor.filter(|&c| c < self.tracks.len());
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::None => info!("➡️ Repeat disabled"),
            RepeatMode::One => info!("🔂 Repeat one enabled"),
            RepeatMode::All => info!("🔁 Repeat all enabled"),
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    /// Fills in a title that arrived after the track was queued. Returns
    /// false when the track has been deleted in the meantime.
    pub fn patch_title(&mut self, id: TrackId, title: String) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == id) {
            Some(track) => {
                track.title = Some(title);
                true
            }
            None => false,
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Numbered listing, the current track marked with 🎶.
    pub fn render_listing(&self) -> String {
        let mut listing = String::from("```\n");
        for (i, track) in self.tracks.iter().enumerate() {
            if self.cursor == Some(i) {
                listing.push_str("🎶 ");
            }
            listing.push_str(&format!("{}. {}\n", i, track.display_title()));
        }
        listing.push_str("```");
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn playlist_of(urls: &[&str]) -> GuildPlaylist {
        let mut playlist = GuildPlaylist::new(1.0, 100);
        for url in urls {
            playlist.append(Track::new(*url)).unwrap();
        }
        playlist
    }

    #[test]
    fn test_append_returns_new_index_and_leaves_cursor_alone() {
        let mut playlist = GuildPlaylist::new(1.0, 100);
        assert_eq!(playlist.append(Track::new("a")).unwrap(), 0);
        assert_eq!(playlist.append(Track::new("b")).unwrap(), 1);
        assert_eq!(playlist.cursor(), None);
        assert_ne!(playlist.tracks()[0].id(), playlist.tracks()[1].id());
    }

    #[test]
    fn test_append_rejects_empty_url_and_full_list() {
        let mut playlist = GuildPlaylist::new(1.0, 1);
        assert_eq!(playlist.append(Track::new("  ")), Err(PlaylistError::EmptyUrl));
        playlist.append(Track::new("a")).unwrap();
        assert_eq!(playlist.append(Track::new("b")), Err(PlaylistError::Full(1)));
    }

    #[test]
    fn test_replacing_tracks_skips_unusable_entries() {
        let mut playlist = playlist_of(&["old"]);
        playlist.goto(0).unwrap();

        let loaded = playlist.replace_tracks(vec![Track::new("a"), Track::new(" "), Track::new("b")]);

        assert_eq!(loaded, 2);
        assert_eq!(playlist.cursor(), None);
        let urls: Vec<&str> = playlist.tracks().iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
    }

    #[test]
    fn test_goto_bounds() {
        let mut playlist = playlist_of(&["a", "b", "c"]);
        assert!(matches!(
            playlist.resolve_index(-1),
            Err(PlaylistError::IndexOutOfRange { index: -1, len: 3 })
        ));
        assert!(matches!(
            playlist.goto(3),
            Err(PlaylistError::IndexOutOfRange { index: 3, len: 3 })
        ));
        playlist.goto(2).unwrap();
        assert_eq!(playlist.cursor(), Some(2));
        assert_eq!(playlist.current_track().unwrap().url, "c");
    }

    #[test]
    fn test_removing_before_cursor_keeps_pointing_at_same_track() {
        let mut playlist = playlist_of(&["a", "b", "c"]);
        playlist.goto(2).unwrap();

        let outcome = playlist.remove_at(0).unwrap();

        assert!(!outcome.was_current_track_removed);
        assert_eq!(playlist.cursor(), Some(1));
        assert_eq!(playlist.current_track().unwrap().url, "c");
    }

    #[test]
    fn test_removing_after_cursor_changes_nothing() {
        let mut playlist = playlist_of(&["a", "b", "c"]);
        playlist.goto(0).unwrap();

        let outcome = playlist.remove_at(2).unwrap();

        assert!(!outcome.was_current_track_removed);
        assert_eq!(playlist.cursor(), Some(0));
    }

    #[test]
    fn test_removing_current_flags_and_steps_back() {
        let mut playlist = playlist_of(&["a", "b"]);
        playlist.goto(0).unwrap();

        let outcome = playlist.remove_at(0).unwrap();

        assert!(outcome.was_current_track_removed);
        assert_eq!(outcome.removed.url, "a");
        assert_eq!(playlist.cursor(), None);
        assert_eq!(playlist.len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_fails() {
        let mut playlist = playlist_of(&["a"]);
        assert!(matches!(
            playlist.remove_at(1),
            Err(PlaylistError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_clear_keeps_repeat_mode_and_volume() {
        let mut playlist = playlist_of(&["a", "b"]);
        playlist.goto(1).unwrap();
        playlist.set_repeat_mode(RepeatMode::All);
        playlist.set_volume(0.4);

        playlist.clear();

        assert!(playlist.is_empty());
        assert_eq!(playlist.cursor(), None);
        assert_eq!(playlist.repeat_mode(), RepeatMode::All);
        assert_eq!(playlist.volume(), 0.4);
    }

    #[test]
    fn test_repeat_mode_parsing() {
        assert_eq!("ALL".parse::<RepeatMode>(), Ok(RepeatMode::All));
        assert_eq!("one".parse::<RepeatMode>(), Ok(RepeatMode::One));
        assert_eq!("none".parse::<RepeatMode>(), Ok(RepeatMode::None));
        assert_eq!(
            "shuffle".parse::<RepeatMode>(),
            Err(PlaylistError::InvalidMode("shuffle".into()))
        );
    }

    #[test]
    fn test_title_patch_survives_deletions() {
        let mut playlist = playlist_of(&["a", "b"]);
        let id = playlist.tracks()[1].id();
        playlist.remove_at(0).unwrap();

        assert!(playlist.patch_title(id, "Bee".into()));
        assert_eq!(playlist.tracks()[0].display_title(), "Bee");

        playlist.remove_at(0).unwrap();
        assert!(!playlist.patch_title(id, "gone".into()));
    }

    #[test]
    fn test_listing_marks_cursor_and_falls_back_to_url() {
        let mut playlist = GuildPlaylist::new(1.0, 10);
        playlist.append(Track::new("https://a").with_title("Alpha")).unwrap();
        playlist.append(Track::new("https://b")).unwrap();
        playlist.goto(1).unwrap();

        assert_eq!(
            playlist.render_listing(),
            "```\n0. Alpha\n🎶 1. https://b\n```"
        );
    }
}
