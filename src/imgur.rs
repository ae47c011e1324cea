//! Imgur album API: direct link of an album's first image plus the rate-limit
//! budget reported alongside it.

use anyhow::{anyhow, Context, Result};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;

pub const IMGUR_API_URL: &str = "https://api.imgur.com/3";

/// Returned in place of any album link that could not be resolved.
pub const REMOVED_PLACEHOLDER: &str = "https://i.imgur.com/removed.png";

/// Remaining request budget as reported by `X-RateLimit-*` headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
    pub user_remaining: i64,
    /// Epoch second at which the per-user budget refills.
    pub user_reset: i64,
    pub client_remaining: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlbumReply {
    pub first_link: String,
    pub quota: RateQuota,
}

/// A malformed body, empty album or missing quota header is an `Err`.
pub trait AlbumSource {
    fn get_album(&self, album_id: &str) -> Result<AlbumReply>;
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImgurCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

pub struct ImgurClient {
    client: reqwest::blocking::Client,
    client_id: String,
}

#[derive(Deserialize)]
struct AlbumBody {
    data: AlbumData,
}

#[derive(Deserialize)]
struct AlbumData {
    #[serde(default)]
    images: Vec<AlbumImage>,
}

#[derive(Deserialize)]
struct AlbumImage {
    link: String,
}

impl ImgurClient {
    pub fn new(creds: &ImgurCredentials) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build imgur http client")?;
        Ok(Self { client, client_id: creds.client_id.clone() })
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Result<i64> {
    let raw = headers
        .get(name)
        .ok_or_else(|| anyhow!("missing header {}", name))?
        .to_str()
        .with_context(|| format!("non-ascii header {}", name))?;
    raw.trim().parse::<i64>().with_context(|| format!("header {}={}", name, raw))
}

pub fn parse_quota(headers: &HeaderMap) -> Result<RateQuota> {
    Ok(RateQuota {
        user_remaining: header_i64(headers, "X-RateLimit-UserRemaining")?,
        user_reset: header_i64(headers, "X-RateLimit-UserReset")?,
        client_remaining: header_i64(headers, "X-RateLimit-ClientRemaining")?,
    })
}

impl AlbumSource for ImgurClient {
    fn get_album(&self, album_id: &str) -> Result<AlbumReply> {
        let resp = self
            .client
            .get(format!("{}/album/{}", IMGUR_API_URL, album_id))
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .send()
            .context("imgur album request")?;
        let quota = parse_quota(resp.headers());
        let body: AlbumBody = resp.json().context("imgur album body")?;
        let first_link = body
            .data
            .images
            .into_iter()
            .next()
            .map(|img| img.link)
            .ok_or_else(|| anyhow!("album {} has no images", album_id))?;
        Ok(AlbumReply { first_link, quota: quota? })
    }
}
