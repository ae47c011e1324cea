//! Info resolution: turn harvested ids into annotation records.
//!
//! Posts are fetched from the Reddit API, ineligible ones are dropped, image
//! URLs are normalized to directly fetchable links and titles are sanitized.

use crate::caption::sanitize;
use crate::error::CurateError;
use crate::imgur::{AlbumSource, RateQuota, REMOVED_PLACEHOLDER};
use crate::limiter::HostLimiter;
use crate::progress::ProgressScope;
use crate::reddit::{PostInfo, PostSource, INFO_BATCH, REDDIT_API_URL};
use crate::retry::RetryPolicy;
use crate::store::AnnotationRecord;
use anyhow::Result;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Posts below this score are not worth curating.
pub const MIN_SCORE: i64 = 2;

/// Per-user Imgur budget at which we wait for the hourly reset.
pub const IMGUR_USER_FLOOR: i64 = 3;

/// Per-client Imgur budget at which the run stops. Going past it gets the IP banned.
pub const IMGUR_CLIENT_FLOOR: i64 = 500;

/// Where an Imgur URL points after canonicalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImgurTarget {
    /// Directly fetchable `i.imgur.com` link.
    Direct(String),
    /// Album or gallery; needs an API call to find its first image.
    Album(String),
}

/// Canonicalize an Imgur URL without touching the network.
///
/// - `i.imgur.com/...` passes through.
/// - `m.imgur.com` becomes `imgur.com`.
/// - `imgur.com/<id>` becomes `i.imgur.com/<id>.jpg` (exactly one `.jpg`).
/// - `imgur.com/a/<id>` and `imgur.com/gallery/<id>` are albums.
pub fn classify_imgur_url(url: &str) -> ImgurTarget {
    if url.contains("i.imgur.com") {
        return ImgurTarget::Direct(url.to_string());
    }
    let url = url.replace("m.imgur.com", "imgur.com");

    if !url.contains("/a/") && !url.contains("gallery") {
        let direct = url.replacen("imgur.com", "i.imgur.com", 1);
        let stem = direct.strip_suffix(".jpg").unwrap_or(&direct);
        return ImgurTarget::Direct(format!("{}.jpg", stem));
    }

    let album_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string();
    ImgurTarget::Album(album_id)
}

/// `https://i.redd.it/<media_id>.jpg` for the first gallery item, if any.
pub fn reddit_gallery_url(info: &PostInfo) -> Option<String> {
    let first = info.gallery_data.as_ref()?.items.first()?;
    Some(format!("https://i.redd.it/{}.jpg", first.media_id))
}

fn is_reddit_gallery(url: &str) -> bool {
    url.contains("reddit.com") && url.contains("gallery")
}

/// Removed, adult-only and low-score posts are skipped silently.
pub fn is_eligible(info: &PostInfo) -> bool {
    info.removed_by_category.is_none() && !info.over_18 && info.score >= MIN_SCORE
}

fn now_epoch() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub struct InfoResolver<P: PostSource, A: AlbumSource> {
    posts: P,
    albums: A,
    retry: RetryPolicy,
    pacer: HostLimiter,
    progress: bool,
}

impl<P: PostSource, A: AlbumSource> InfoResolver<P, A> {
    pub fn new(posts: P, albums: A) -> Self {
        Self {
            posts,
            albums,
            retry: RetryPolicy::default(),
            pacer: HostLimiter::new(Duration::from_secs(1)),
            progress: false,
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self { self.retry = policy; self }
    /// Minimum spacing between Reddit info requests (retries included).
    pub fn info_pause(mut self, pause: Duration) -> Self { self.pacer = HostLimiter::new(pause); self }
    pub fn progress(mut self, yes: bool) -> Self { self.progress = yes; self }

    pub fn posts(&self) -> &P {
        &self.posts
    }

    /// Resolve `ids` into records, in the order Reddit returns them.
    /// Only quota exhaustion (and a retry policy giving up) surfaces as an error.
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<AnnotationRecord>> {
        let pb = ProgressScope::count(self.progress, "Downloading", ids.len() as u64);
        let mut out = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(INFO_BATCH) {
            let infos = self.retry.run("reddit info", || {
                self.pacer.acquire(REDDIT_API_URL);
                self.posts.get_info(chunk)
            })?;
            for info in infos {
                if let Some(rec) = self.resolve_post(info)? {
                    out.push(rec);
                }
            }
            pb.inc(chunk.len() as u64);
        }
        pb.finish("done");
        Ok(out)
    }

    /// One post to one record, or `None` when the post is not usable.
    pub fn resolve_post(&self, info: PostInfo) -> Result<Option<AnnotationRecord>> {
        if !is_eligible(&info) {
            return Ok(None);
        }

        let url = if is_reddit_gallery(&info.url) {
            match reddit_gallery_url(&info) {
                Some(u) => u,
                None => return Ok(None),
            }
        } else if info.url.contains("imgur") {
            self.normalize_secondary_url(&info.url)?
        } else {
            info.url.clone()
        };

        Ok(Some(AnnotationRecord {
            caption: sanitize(&info.title),
            raw_caption: info.title,
            image_id: info.id,
            subreddit: info.subreddit.to_lowercase(),
            url,
            score: info.score,
            author: info.author,
            created_utc: info.created_utc as i64,
            permalink: info.permalink,
        }))
    }

    /// Direct `i.imgur.com` link for any Imgur URL. Albums that cannot be
    /// resolved map to the removed placeholder; only a spent client quota errors.
    pub fn normalize_secondary_url(&self, url: &str) -> Result<String> {
        match classify_imgur_url(url) {
            ImgurTarget::Direct(u) => Ok(u),
            ImgurTarget::Album(album_id) => match self.albums.get_album(&album_id) {
                Ok(reply) => {
                    enforce_quota(reply.quota)?;
                    Ok(reply.first_link)
                }
                Err(e) => {
                    tracing::debug!("album {} unresolved ({:#}), using placeholder", album_id, e);
                    Ok(REMOVED_PLACEHOLDER.to_string())
                }
            },
        }
    }
}

/// Wait out a spent per-user budget; abort on a spent per-client budget.
pub fn enforce_quota(quota: RateQuota) -> Result<(), CurateError> {
    if quota.user_remaining <= IMGUR_USER_FLOOR {
        let wait = quota.user_reset - now_epoch() + 1;
        if wait > 0 {
            tracing::warn!("Exceeded Imgur UserLimit, sleeping till reset: {} seconds.", wait);
            sleep(Duration::from_secs(wait as u64));
        }
    }
    if quota.client_remaining <= IMGUR_CLIENT_FLOOR {
        tracing::error!("!! Exceeded Imgur ClientLimit, pause script for 1 day !!");
        return Err(CurateError::QuotaExhausted { remaining: quota.client_remaining });
    }
    Ok(())
}
