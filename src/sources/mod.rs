//! # Sources
//!
//! External metadata for queued tracks. The playback core only sees the two
//! traits below; [`youtube_api_v3`] implements both against the YouTube Data
//! API v3.

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

pub mod youtube_api_v3;

/// Resolves a display title for a track URL.
///
/// Failures are logged by the caller and never shown to the user; the URL
/// stays the display fallback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn resolve_title(&self, url: &str) -> Result<String>;
}

/// First search result for a free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSearch: Send + Sync {
    async fn search_first(&self, query: &str) -> Result<Option<SearchHit>>;
}

/// True for links the bot can play directly instead of searching for.
pub fn is_youtube_url(input: &str) -> bool {
    extract_video_id(input).is_some()
}

/// Video id of a `youtube.com/watch?v=`, `youtu.be/` or `/shorts/` link.
pub fn extract_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let id = match host {
        "youtube.com" | "music.youtube.com" => {
            if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
                v.into_owned()
            } else {
                let mut segments = url.path_segments()?;
                match segments.next()? {
                    "shorts" | "embed" | "live" => segments.next()?.to_string(),
                    _ => return None,
                }
            }
        }
        "youtu.be" => url.path_segments()?.next()?.to_string(),
        _ => return None,
    };

    (id.len() == 11).then_some(id)
}
