//! Cursor arithmetic for moving through a playlist.
//!
//! Everything here is pure: the controller feeds in the cursor, the length
//! and the repeat mode, and applies the returned decision itself.

use super::playlist::RepeatMode;

/// What to play after a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTrack {
    /// Move the cursor here and play it.
    Play(usize),
    /// Nothing queued at all.
    PlaylistEmpty,
    /// End of the list without wraparound; playback should stop.
    PlaylistExhausted,
}

/// Next-track algorithm.
///
/// A `None` cursor behaves like index -1, so the first advance from a stopped
/// playlist lands on track 0.
pub fn next_track(cursor: Option<usize>, len: usize, mode: RepeatMode) -> NextTrack {
    if len == 0 {
        return NextTrack::PlaylistEmpty;
    }

    match cursor {
        None => NextTrack::Play(0),
        Some(c) if c + 1 < len => NextTrack::Play(c + 1),
        Some(_) if mode == RepeatMode::All => next_track(None, len, mode),
        Some(_) => NextTrack::PlaylistExhausted,
    }
}

/// Decision after a track finished on its own.
///
/// With repeat-one the cursor is stepped back first, so the next-track
/// algorithm lands on the same track again.
pub fn after_finished(cursor: Option<usize>, len: usize, mode: RepeatMode) -> NextTrack {
    let cursor = match mode {
        RepeatMode::One => cursor.and_then(|c| c.checked_sub(1)),
        RepeatMode::None | RepeatMode::All => cursor,
    };
    next_track(cursor, len, mode)
}

/// Step backwards. At index 0 repeat-all wraps to the last track; otherwise
/// there is nothing before and playback stops.
pub fn previous_track(cursor: Option<usize>, len: usize, mode: RepeatMode) -> NextTrack {
    if len == 0 {
        return NextTrack::PlaylistEmpty;
    }

    match cursor {
        Some(c) if c > 0 => NextTrack::Play((c - 1).min(len - 1)),
        Some(_) if mode == RepeatMode::All => NextTrack::Play(len - 1),
        Some(_) => NextTrack::PlaylistExhausted,
        None => NextTrack::Play(0),
    }
}
