use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{extract_video_id, MetadataLookup, SearchHit, TrackSearch};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

pub struct YouTubeApiV3Client {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeApiV3Client {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            base_url: API_BASE.to_string(),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("❌ YouTube API error: {} - {}", status, error_text);
            anyhow::bail!("YouTube API error: {} - {}", status, error_text);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataLookup for YouTubeApiV3Client {
    async fn resolve_title(&self, url: &str) -> Result<String> {
        let video_id = extract_video_id(url)
            .with_context(|| format!("No YouTube video id in {}", url))?;
        debug!("🔍 Resolving title for video {}", video_id);

        let response: VideosResponse = self
            .get("videos", &[("part", "snippet"), ("id", video_id.as_str())])
            .await?;

        response
            .items
            .into_iter()
            .next()
            .map(|video| video.snippet.title)
            .with_context(|| format!("Video {} not found", video_id))
    }
}

#[async_trait]
impl TrackSearch for YouTubeApiV3Client {
    async fn search_first(&self, query: &str) -> Result<Option<SearchHit>> {
        debug!("🔍 YouTube API v3 search: {}", query);

        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("q", query),
                    ("type", "video"),
                    ("maxResults", "1"),
                    ("regionCode", "US"),
                ],
            )
            .await?;

        let hit = response.items.into_iter().find_map(|item| {
            item.id.video_id.map(|id| SearchHit {
                url: format!("https://www.youtube.com/watch?v={}", id),
                title: item.snippet.title,
            })
        });

        info!("✅ YouTube API v3: {} for \"{}\"", if hit.is_some() { "1 result" } else { "no results" }, query);
        Ok(hit)
    }
}
