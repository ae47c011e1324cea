use crate::download::DEFAULT_WORKERS;
use crate::imgur::ImgurCredentials;
use crate::reddit::RedditCredentials;
use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_AGENT: &str = "redcaps-curation/1.0";

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct CurateOptions {
    pub images_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub time_window_hours: f64,      // top-level Pushshift window, (0, 24]
    pub day_concurrency: usize,      // days harvested at once
    pub workers: usize,              // image download workers
    pub update_annotations: bool,    // drop records whose image failed to download
    pub progress: bool,              // show progress bars
    pub user_agent: String,          // sent to Pushshift and image hosts

    // filter tuning
    pub nsfw_threshold: f64,
    pub face_threshold: f64,
}

impl Default for CurateOptions {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("./datasets/redcaps/images"),
            annotations_dir: PathBuf::from("./datasets/redcaps/annotations"),
            time_window_hours: 24.0,
            day_concurrency: 1,
            workers: DEFAULT_WORKERS,
            update_annotations: false,
            progress: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            nsfw_threshold: crate::filter::DEFAULT_NSFW_THRESHOLD,
            face_threshold: crate::filter::DEFAULT_FACE_THRESHOLD,
        }
    }
}

impl CurateOptions {
    pub fn with_images_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.images_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_annotations_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.annotations_dir = dir.as_ref().to_path_buf();
        self
    }
    /// Clamped into `(0, 24]`; non-positive values fall back to a full day.
    pub fn with_time_window_hours(mut self, hours: f64) -> Self {
        self.time_window_hours = if hours > 0.0 { hours.min(24.0) } else { 24.0 };
        self
    }
    pub fn with_day_concurrency(mut self, n: usize) -> Self {
        self.day_concurrency = n.max(1);
        self
    }
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }
    pub fn with_update_annotations(mut self, yes: bool) -> Self {
        self.update_annotations = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
    pub fn with_nsfw_threshold(mut self, t: f64) -> Self {
        self.nsfw_threshold = t;
        self
    }
    pub fn with_face_threshold(mut self, t: f64) -> Self {
        self.face_threshold = t;
        self
    }
}

/// API credentials file:
/// `{"reddit": {client_id, client_secret, user_agent}, "imgur": {client_id, client_secret}}`.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub reddit: RedditCredentials,
    pub imgur: ImgurCredentials,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let f = open_with_backoff(path, 16, 50).with_context(|| format!("open credentials {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse credentials {}", path.display()))
    }
}
