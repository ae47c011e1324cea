//! Image download stage: fetch the image of every record that is not on disk
//! yet, on a bounded worker pool paced per host.

use crate::concurrency::map_limited;
use crate::limiter::HostLimiter;
use crate::paths::image_path;
use crate::progress::ProgressScope;
use crate::store::AnnotationStore;
use crate::util::write_bytes_replace;
use ahash::AHashSet;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;

/// Fetch `url` and store the image at `dest`. Any failure is reported as `false`.
pub trait ImageFetcher: Sync {
    fn fetch_and_store(&self, url: &str, dest: &Path) -> bool;
}

pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .context("build image http client")?;
        Ok(Self { client })
    }

    fn try_fetch(&self, url: &str, dest: &Path) -> Result<bool> {
        let resp = self.client.get(url).send().with_context(|| format!("GET {}", url))?;
        // Imgur answers 200 with a "removed.png" image for deleted uploads.
        if resp.status() != reqwest::StatusCode::OK || resp.url().as_str().contains("removed.png") {
            return Ok(false);
        }
        let bytes = resp.bytes().with_context(|| format!("read body of {}", url))?;
        if bytes.is_empty() {
            return Ok(false);
        }
        write_bytes_replace(dest, &bytes)?;
        Ok(true)
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch_and_store(&self, url: &str, dest: &Path) -> bool {
        match self.try_fetch(url, dest) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::debug!("download failed for {}: {:#}", url, e);
                false
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub attempted: usize,
    pub downloaded: usize,
    pub failed_ids: Vec<String>,
}

struct Job {
    image_id: String,
    url: String,
    dest: PathBuf,
}

/// Download every missing image of `store` into `images_dir`.
pub fn download_images<F: ImageFetcher>(
    store: &AnnotationStore,
    images_dir: &Path,
    fetcher: &F,
    limiter: &HostLimiter,
    workers: usize,
    progress: bool,
) -> Result<DownloadReport> {
    let jobs: Vec<Job> = store
        .annotations
        .iter()
        .map(|a| Job {
            image_id: a.image_id.clone(),
            url: a.url.clone(),
            dest: image_path(images_dir, &a.subreddit, &a.image_id),
        })
        .filter(|j| !j.dest.exists())
        .collect();

    let pb = ProgressScope::count(progress, "Downloading Images", jobs.len() as u64);
    let statuses = map_limited(&jobs, workers.max(1), |job| {
        limiter.acquire(&job.url);
        let ok = fetcher.fetch_and_store(&job.url, &job.dest);
        pb.inc(1);
        Ok(ok)
    })?;
    pb.finish("done");

    let failed_ids: Vec<String> = jobs
        .iter()
        .zip(&statuses)
        .filter(|(_, ok)| !**ok)
        .map(|(j, _)| j.image_id.clone())
        .collect();
    let report = DownloadReport {
        attempted: jobs.len(),
        downloaded: jobs.len() - failed_ids.len(),
        failed_ids,
    };
    Ok(report)
}

/// `download_images` for a file. With `update_annotations`, records whose
/// download failed are dropped and the file is rewritten.
pub fn download_images_file<F: ImageFetcher>(
    path: &Path,
    images_dir: &Path,
    fetcher: &F,
    limiter: &HostLimiter,
    workers: usize,
    update_annotations: bool,
    progress: bool,
) -> Result<DownloadReport> {
    let mut store = AnnotationStore::load(path)?;
    let report = download_images(&store, images_dir, fetcher, limiter, workers, progress)?;
    tracing::info!(
        "Downloaded {}/{} images from {}!",
        report.downloaded,
        report.attempted,
        path.display()
    );

    if update_annotations && !report.failed_ids.is_empty() {
        let failed: AHashSet<&str> = report.failed_ids.iter().map(|s| s.as_str()).collect();
        store.annotations.retain(|a| !failed.contains(a.image_id.as_str()));
        tracing::info!("Saving updated annotations...");
        store.save(path)?;
        tracing::info!("Saved updated annotations at {}!", path.display());
    }
    Ok(report)
}
