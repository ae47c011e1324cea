#![allow(dead_code)]

use redcaps::{
    day_start_utc, AlbumReply, AlbumSource, AnnotationRecord, AnnotationStore, FaceDetection, FaceDetector, IdHit,
    IdSource, ImageFetcher, NsfwDetector, NsfwScores, PostInfo, PostSource, RateQuota, TimeWindow,
};
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use time::Date;

pub const SUB: &str = "pics";

/// Epoch second `secs` into `day` (UTC).
pub fn at(day: Date, secs: i64) -> i64 {
    day_start_utc(day) + secs
}

/// A record with every field derived from its id.
pub fn record(id: &str, created_utc: i64) -> AnnotationRecord {
    AnnotationRecord {
        image_id: id.to_string(),
        subreddit: SUB.to_string(),
        url: format!("https://i.redd.it/{}.jpg", id),
        caption: format!("photo {}", id),
        raw_caption: format!("Photo {}", id),
        score: 10,
        author: "someone".to_string(),
        created_utc,
        permalink: format!("/r/{}/comments/{}/", SUB, id),
    }
}

pub fn record_with_caption(id: &str, created_utc: i64, caption: &str) -> AnnotationRecord {
    AnnotationRecord { caption: caption.to_string(), ..record(id, created_utc) }
}

/// Write a store to `dir/name` and return its path.
pub fn write_store(dir: &Path, name: &str, store: &AnnotationStore) -> PathBuf {
    let p = dir.join(name);
    store.save(&p).unwrap();
    p
}

/// Create a placeholder image for `id` under `images_dir/<SUB>/`.
pub fn touch_image(images_dir: &Path, id: &str) -> PathBuf {
    let p = redcaps::image_path(images_dir, SUB, id);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(&p, b"\xff\xd8\xff\xe0jpeg").unwrap();
    p
}

pub fn ids_of(store: &AnnotationStore) -> Vec<String> {
    store.annotations.iter().map(|a| a.image_id.clone()).collect()
}

pub fn assert_store_invariants(store: &AnnotationStore) {
    let mut seen = HashSet::new();
    for a in &store.annotations {
        assert!(seen.insert(a.image_id.clone()), "duplicate id {}", a.image_id);
    }
    for pair in store.annotations.windows(2) {
        assert!(pair[0].created_utc <= pair[1].created_utc, "records out of order");
    }
}

// -------- upstream fakes --------

/// Search endpoint over a fixed set of `(created_utc, id, domain)` posts.
/// Every queried window is recorded; the first `failures` calls error out.
pub struct FakeIdSource {
    posts: Vec<(i64, String, Option<String>)>,
    pub windows: Mutex<Vec<TimeWindow>>,
    failures: AtomicUsize,
}

impl FakeIdSource {
    pub fn new(mut posts: Vec<(i64, String, Option<String>)>) -> Self {
        posts.sort();
        Self { posts, windows: Mutex::new(Vec::new()), failures: AtomicUsize::new(0) }
    }

    /// `n` image posts spread evenly over `[start, start + span)`, ids `p0..pN`.
    pub fn spread(start: i64, span: i64, n: usize) -> Self {
        let posts = (0..n)
            .map(|i| (start + (i as i64 * span) / n as i64, format!("p{}", i), Some("i.redd.it".to_string())))
            .collect();
        Self::new(posts)
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.windows.lock().unwrap().len()
    }

    /// Windows that were not split further.
    pub fn leaf_windows(&self) -> Vec<TimeWindow> {
        let all = self.windows.lock().unwrap().clone();
        let mut leaves: Vec<TimeWindow> = all
            .iter()
            .filter(|w| !all.iter().any(|o| o != *w && o.start >= w.start && o.end <= w.end))
            .copied()
            .collect();
        leaves.sort();
        leaves
    }
}

impl IdSource for FakeIdSource {
    fn search(&self, _subreddit: &str, window: TimeWindow, size: usize) -> Result<Vec<IdHit>> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(anyhow!("HTTP 429"));
        }
        self.windows.lock().unwrap().push(window);
        Ok(self
            .posts
            .iter()
            .filter(|(t, _, _)| *t >= window.start && *t < window.end)
            .take(size)
            .map(|(_, id, domain)| IdHit { id: id.clone(), domain: domain.clone() })
            .collect())
    }
}

pub fn post(id: &str, title: &str, url: &str, score: i64) -> PostInfo {
    PostInfo {
        id: id.to_string(),
        title: title.to_string(),
        url: url.to_string(),
        score,
        author: "someone".to_string(),
        subreddit: "Pics".to_string(),
        created_utc: 1_612_137_600.0,
        permalink: format!("/r/pics/comments/{}/", id),
        ..Default::default()
    }
}

/// Reddit info lookup over a fixed map. Unknown ids are silently absent,
/// like the real endpoint. Batch sizes are recorded.
#[derive(Default)]
pub struct FakePosts {
    pub posts: HashMap<String, PostInfo>,
    pub batches: Mutex<Vec<usize>>,
}

impl FakePosts {
    pub fn new(posts: Vec<PostInfo>) -> Self {
        Self { posts: posts.into_iter().map(|p| (p.id.clone(), p)).collect(), batches: Mutex::new(Vec::new()) }
    }
}

impl PostSource for FakePosts {
    fn get_info(&self, ids: &[String]) -> Result<Vec<PostInfo>> {
        self.batches.lock().unwrap().push(ids.len());
        Ok(ids.iter().filter_map(|id| self.posts.get(id).cloned()).collect())
    }
}

pub fn healthy_quota() -> RateQuota {
    RateQuota { user_remaining: 1000, user_reset: 0, client_remaining: 10_000 }
}

/// Album lookup: known albums resolve, anything else fails.
#[derive(Default)]
pub struct FakeAlbums {
    pub albums: HashMap<String, AlbumReply>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAlbums {
    pub fn with(mut self, album_id: &str, link: &str, quota: RateQuota) -> Self {
        self.albums.insert(album_id.to_string(), AlbumReply { first_link: link.to_string(), quota });
        self
    }
}

impl AlbumSource for FakeAlbums {
    fn get_album(&self, album_id: &str) -> Result<AlbumReply> {
        self.calls.lock().unwrap().push(album_id.to_string());
        self.albums.get(album_id).cloned().ok_or_else(|| anyhow!("album {} not found", album_id))
    }
}

// -------- detector / fetcher fakes --------

fn stem(p: &Path) -> String {
    redcaps::image_id_from_path(p).unwrap()
}

/// NSFW scores by image id; unknown ids score as neutral.
#[derive(Default)]
pub struct FakeNsfw {
    pub scores: HashMap<String, NsfwScores>,
    pub seen: Mutex<Vec<String>>,
    pub drop_last: bool,
}

impl FakeNsfw {
    pub fn flag(mut self, id: &str, porn: f64, hentai: f64) -> Self {
        self.scores.insert(id.to_string(), NsfwScores { porn, hentai, ..Default::default() });
        self
    }
}

impl NsfwDetector for FakeNsfw {
    fn model(&self) -> &str {
        "fake-nsfw"
    }

    fn detect(&self, image_paths: &[PathBuf]) -> Result<Vec<NsfwScores>> {
        let mut out = Vec::new();
        for p in image_paths {
            let id = stem(p);
            self.seen.lock().unwrap().push(id.clone());
            out.push(self.scores.get(&id).copied().unwrap_or(NsfwScores { neutral: 1.0, ..Default::default() }));
        }
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }
}

/// Face detections by image id; unknown ids have no faces.
#[derive(Default)]
pub struct FakeFaces {
    pub detections: HashMap<String, FaceDetection>,
    pub seen: Mutex<Vec<String>>,
}

impl FakeFaces {
    pub fn faces(mut self, id: &str, scores: &[f64]) -> Self {
        let boxes = scores.iter().map(|_| [10.0, 10.0, 50.0, 50.0]).collect();
        self.detections.insert(id.to_string(), FaceDetection { boxes, scores: scores.to_vec() });
        self
    }
}

impl FaceDetector for FakeFaces {
    fn detect(&self, image_paths: &[PathBuf], _conf_threshold: f64) -> Result<Vec<FaceDetection>> {
        Ok(image_paths
            .iter()
            .map(|p| {
                let id = stem(p);
                self.seen.lock().unwrap().push(id.clone());
                self.detections.get(&id).cloned().unwrap_or_default()
            })
            .collect())
    }
}

/// Writes a few bytes for every URL except those containing "broken".
#[derive(Default)]
pub struct FakeFetcher {
    pub requested: Mutex<Vec<String>>,
}

impl ImageFetcher for FakeFetcher {
    fn fetch_and_store(&self, url: &str, dest: &Path) -> bool {
        self.requested.lock().unwrap().push(url.to_string());
        if url.contains("broken") {
            return false;
        }
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, url.as_bytes()).unwrap();
        true
    }
}
