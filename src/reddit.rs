//! Official Reddit API: post metadata for known submission ids.

use crate::retry::ensure_success;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;

pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const REDDIT_API_URL: &str = "https://oauth.reddit.com";

/// `/api/info` accepts at most this many fullnames per call.
pub const INFO_BATCH: usize = 100;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GalleryItem {
    pub media_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GalleryData {
    #[serde(default)]
    pub items: Vec<GalleryItem>,
}

/// The subset of a submission's fields the resolver reads.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PostInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub removed_by_category: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub gallery_data: Option<GalleryData>,
}

/// Metadata lookup for up to `INFO_BATCH` bare ids (no `t3_` prefix).
pub trait PostSource {
    fn get_info(&self, ids: &[String]) -> Result<Vec<PostInfo>>;
}

#[derive(Clone, Debug, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

pub struct RedditClient {
    client: reqwest::blocking::Client,
    creds: RedditCredentials,
    token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    data: PostInfo,
}

impl RedditClient {
    pub fn new(creds: RedditCredentials) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(Duration::from_secs(60))
            .build()
            .context("build reddit http client")?;
        Ok(Self { client, creds, token: Mutex::new(None) })
    }

    /// Application-only OAuth token, fetched once and reused until rejected.
    fn token(&self) -> Result<String> {
        let mut guard = self.token.lock();
        if let Some(t) = guard.as_ref() {
            return Ok(t.clone());
        }
        let resp = self
            .client
            .post(REDDIT_TOKEN_URL)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("reddit token request")?;
        ensure_success(resp.status(), "reddit token endpoint")?;
        let tok: TokenResponse = resp.json().context("reddit token body")?;
        *guard = Some(tok.access_token.clone());
        Ok(tok.access_token)
    }
}

impl PostSource for RedditClient {
    fn get_info(&self, ids: &[String]) -> Result<Vec<PostInfo>> {
        let fullnames: Vec<String> = ids.iter().map(|id| format!("t3_{}", id)).collect();
        let token = self.token()?;
        let resp = self
            .client
            .get(format!("{}/api/info", REDDIT_API_URL))
            .bearer_auth(token)
            .query(&[("id", fullnames.join(",").as_str()), ("raw_json", "1")])
            .send()
            .context("reddit info request")?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            *self.token.lock() = None;
        }
        ensure_success(resp.status(), "reddit /api/info")?;
        let listing: Listing = resp.json().context("reddit info body")?;
        Ok(listing.data.children.into_iter().map(|t| t.data).collect())
    }
}
