//! Identifier harvesting: collect the ids of image posts submitted to one
//! subreddit on one UTC day from the Pushshift search endpoint.
//!
//! Pushshift returns at most `PAGE_CAP` posts per request. A full page means
//! the window may hold more posts than we saw, so the window is halved and
//! both halves are queried again (depth-first) until every leaf window comes
//! back with fewer than `PAGE_CAP` hits.

use crate::concurrency::map_limited;
use crate::date::{day_start_utc, fmt_epoch, YearMonth, SECONDS_PER_DAY};
use crate::limiter::HostLimiter;
use crate::retry::{ensure_success, RetryPolicy};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use time::Date;

pub const PUSHSHIFT_SEARCH_URL: &str = "https://api.pushshift.io/reddit/submission/search";

/// Fixed page size of the search endpoint.
pub const PAGE_CAP: usize = 100;

/// Windows this short (seconds) are never split further.
pub const MIN_SPLIT_SECONDS: i64 = 1;

/// One search hit. Only the id is kept; the domain feeds the allow-list.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IdHit {
    pub id: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Half-open window `[start, end)` in epoch seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn seconds(&self) -> i64 {
        self.end - self.start
    }

    /// `[start, mid)` and `[mid, end)`; `None` once the window is at the floor.
    pub fn halves(&self) -> Option<(TimeWindow, TimeWindow)> {
        if self.seconds() <= MIN_SPLIT_SECONDS {
            return None;
        }
        let mid = self.start + self.seconds() / 2;
        Some((TimeWindow::new(self.start, mid), TimeWindow::new(mid, self.end)))
    }
}

/// Consecutive top-level windows of `step_seconds` covering one UTC day; the last one is clipped.
pub fn plan_day_windows(day: Date, step_seconds: i64) -> Vec<TimeWindow> {
    let step = step_seconds.max(1);
    let day_start = day_start_utc(day);
    let day_end = day_start + SECONDS_PER_DAY;
    let mut out = Vec::new();
    let mut s = day_start;
    while s < day_end {
        let e = (s + step).min(day_end);
        out.push(TimeWindow::new(s, e));
        s = e;
    }
    out
}

/// Domains whose posts can lead to a directly fetchable image.
pub fn default_allowed_domains() -> Vec<String> {
    let mut v: Vec<String> = ["reddit.com", "i.redd.it", "i.imgur.com", "imgur.com", "m.imgur.com"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for i in 0..9 {
        v.push(format!("farm{}.static.flickr.com", i));
        v.push(format!("farm{}.staticflickr.com", i));
    }
    v.sort();
    v
}

/// Upstream search contract. A non-success response must come back as `Err`
/// so the harvester's retry policy sees it.
pub trait IdSource: Sync {
    fn search(&self, subreddit: &str, window: TimeWindow, size: usize) -> Result<Vec<IdHit>>;
}

pub struct PushshiftClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl PushshiftClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_base_url(user_agent, PUSHSHIFT_SEARCH_URL)
    }

    pub fn with_base_url(user_agent: &str, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .context("build pushshift http client")?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Vec<IdHit>,
}

impl IdSource for PushshiftClient {
    fn search(&self, subreddit: &str, window: TimeWindow, size: usize) -> Result<Vec<IdHit>> {
        // Pushshift bounds are exclusive on both sides.
        let after = (window.start - 1).to_string();
        let before = window.end.to_string();
        let size = size.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("subreddit", subreddit),
                ("after", after.as_str()),
                ("before", before.as_str()),
                ("size", size.as_str()),
                ("fields", "id,domain"),
            ])
            .send()
            .context("pushshift request")?;
        ensure_success(resp.status(), "pushshift search")?;
        let body: SearchResponse = resp.json().context("pushshift response body")?;
        Ok(body.data)
    }
}

pub struct IdHarvester<S: IdSource> {
    source: S,
    retry: RetryPolicy,
    window_pause: Duration,
    allowed_domains: Option<Vec<String>>,
}

impl<S: IdSource> IdHarvester<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            window_pause: Duration::from_secs(1),
            allowed_domains: Some(default_allowed_domains()),
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self { self.retry = policy; self }
    pub fn window_pause(mut self, pause: Duration) -> Self { self.window_pause = pause; self }
    /// `None` keeps every hit regardless of its domain.
    pub fn allowed_domains(mut self, domains: Option<Vec<String>>) -> Self {
        self.allowed_domains = domains.map(|mut v| {
            for d in v.iter_mut() { *d = d.trim().to_lowercase(); }
            v.sort();
            v.dedup();
            v
        });
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Ids of posts made to `subreddit` on `day` (UTC), querying at most
    /// `max_window_hours` per top-level request.
    pub fn harvest(&self, subreddit: &str, day: Date, max_window_hours: f64) -> Result<BTreeSet<String>> {
        if !(max_window_hours > 0.0 && max_window_hours <= 24.0) {
            bail!("time window must be in (0, 24] hours, got {}", max_window_hours);
        }
        let step = ((max_window_hours * 3600.0).round() as i64).max(1);

        // One pacer per day: concurrent days are paced independently.
        let pacer = HostLimiter::new(self.window_pause);
        let mut ids = BTreeSet::new();
        for w in plan_day_windows(day, step) {
            pacer.acquire(PUSHSHIFT_SEARCH_URL);
            for hit in self.collect_window(subreddit, w)? {
                if self.domain_allowed(hit.domain.as_deref()) {
                    ids.insert(hit.id);
                }
            }
        }
        Ok(ids)
    }

    /// Harvest every day of `month`, running up to `day_concurrency` days at once.
    pub fn harvest_month(
        &self,
        subreddit: &str,
        month: YearMonth,
        max_window_hours: f64,
        day_concurrency: usize,
    ) -> Result<Vec<String>> {
        let days = month.days();
        let per_day = map_limited(&days, day_concurrency, |d| self.harvest(subreddit, *d, max_window_hours))?;

        let all: BTreeSet<String> = per_day.into_iter().flatten().collect();
        Ok(all.into_iter().collect())
    }

    fn domain_allowed(&self, domain: Option<&str>) -> bool {
        match (&self.allowed_domains, domain) {
            (Some(list), Some(d)) => list.binary_search(&d.to_lowercase()).is_ok(),
            _ => true,
        }
    }

    fn collect_window(&self, subreddit: &str, w: TimeWindow) -> Result<Vec<IdHit>> {
        let hits = self.retry.run("pushshift search", || self.source.search(subreddit, w, PAGE_CAP))?;

        if hits.len() >= PAGE_CAP {
            match w.halves() {
                Some((left, right)) => {
                    let mut out = self.collect_window(subreddit, left)?;
                    out.extend(self.collect_window(subreddit, right)?);
                    return Ok(out);
                }
                None => tracing::warn!(
                    "[{}] full page in a {}s window, keeping {} ids as-is",
                    fmt_epoch(w.start),
                    w.seconds(),
                    hits.len()
                ),
            }
        }

        tracing::info!(
            "[{} - {}] Downloaded {} Reddit post IDs.",
            fmt_epoch(w.start),
            fmt_epoch(w.end - 1),
            hits.len()
        );
        Ok(hits)
    }
}
