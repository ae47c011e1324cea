//! Curation filters. Each one flags records, removes them (and their images)
//! through `AnnotationStore::apply_filter`, and stamps its marker in `info`.
//!
//! Images missing on disk are simply not shown to a detector; their records
//! are neither flagged nor treated as errors.

use crate::error::CurateError;
use crate::paths::image_path;
use crate::store::{AnnotationStore, FilterStage};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Github repositories of the filtering sources, recorded as marker provenance.
pub const WORDS_REPO: &str = "LDNOOBW/List-of-Dirty-Naughty-Obscene-and-Otherwise-Bad-Words";
pub const NSFW_REPO: &str = "gantman/nsfw_model";
pub const FACES_REPO: &str = "redcaps-dataset/pytorch-retinaface";

pub const DEFAULT_NSFW_THRESHOLD: f64 = 0.9;
pub const DEFAULT_FACE_THRESHOLD: f64 = 0.9;

/// Softmax output of the NSFW classifier for one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct NsfwScores {
    #[serde(default)]
    pub drawing: f64,
    #[serde(default)]
    pub hentai: f64,
    #[serde(default)]
    pub neutral: f64,
    #[serde(default)]
    pub porn: f64,
    #[serde(default)]
    pub sexy: f64,
}

impl NsfwScores {
    pub fn is_nsfw(&self, threshold: f64) -> bool {
        self.porn + self.hentai > threshold
    }
}

/// Face boxes (`[x1, y1, x2, y2]`) found in one image, with their confidences.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FaceDetection {
    #[serde(default)]
    pub boxes: Vec<[f64; 4]>,
    #[serde(default)]
    pub scores: Vec<f64>,
}

impl FaceDetection {
    /// Boxes at or above `threshold`. Boxes without a paired score all count.
    pub fn faces_at(&self, threshold: f64) -> usize {
        if self.scores.len() == self.boxes.len() {
            self.scores.iter().filter(|s| **s >= threshold).count()
        } else {
            self.boxes.len()
        }
    }
}

/// Results come back positionally: one entry per input path.
pub trait NsfwDetector {
    fn model(&self) -> &str { NSFW_REPO }
    fn detect(&self, image_paths: &[PathBuf]) -> Result<Vec<NsfwScores>>;
}

pub trait FaceDetector {
    fn model(&self) -> &str { FACES_REPO }
    fn detect(&self, image_paths: &[PathBuf], conf_threshold: f64) -> Result<Vec<FaceDetection>>;
}

/// Words that disqualify a caption, loaded once and passed to `filter_words`.
#[derive(Clone, Debug)]
pub struct Blocklist {
    words: Vec<String>,
    source: String,
}

impl Blocklist {
    pub fn default_url() -> String {
        format!("https://raw.githubusercontent.com/{}/master/en", WORDS_REPO)
    }

    pub fn from_words<I, S>(words: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words.into_iter().map(Into::into).filter(|w: &String| !w.is_empty()).collect();
        Self { words, source: source.into() }
    }

    /// One word per line.
    pub fn parse(text: &str, source: impl Into<String>) -> Self {
        Self::from_words(text.lines().map(|l| l.trim_end_matches('\r')), source)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read blocklist {}", path.display()))?;
        Ok(Self::parse(&text, WORDS_REPO))
    }

    pub fn fetch(url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build blocklist http client")?;
        let resp = client.get(url).send().with_context(|| format!("GET {}", url))?;
        crate::retry::ensure_success(resp.status(), "blocklist download")?;
        let text = resp.text().context("blocklist body")?;
        Ok(Self::parse(&text, WORDS_REPO))
    }

    pub fn source(&self) -> &str { &self.source }
    pub fn len(&self) -> usize { self.words.len() }
    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    /// First blocklisted word appearing as a whole token of `caption`.
    /// Both sides are space-padded so "ass" never matches "class".
    pub fn first_match(&self, caption: &str) -> Option<&str> {
        let padded = format!(" {} ", caption);
        self.words
            .iter()
            .find(|w| padded.contains(&format!(" {} ", w)))
            .map(|w| w.as_str())
    }
}

/// `(image_id, path)` for every record whose image exists under `images_dir`.
pub fn existing_images(store: &AnnotationStore, images_dir: &Path) -> Vec<(String, PathBuf)> {
    store
        .annotations
        .iter()
        .map(|a| (a.image_id.clone(), image_path(images_dir, &a.subreddit, &a.image_id)))
        .filter(|(_, p)| p.is_file())
        .collect()
}

fn ensure_same_len(expected: usize, got: usize) -> Result<(), CurateError> {
    if expected == got { Ok(()) } else { Err(CurateError::DetectorMismatch { expected, got }) }
}

pub fn filter_words(
    store: &mut AnnotationStore,
    label: &str,
    blocklist: &Blocklist,
    images_dir: Option<&Path>,
) -> Result<usize> {
    store.check_transition(FilterStage::Words, label)?;

    let mut flagged = Vec::new();
    for ann in &store.annotations {
        if let Some(bad) = blocklist.first_match(&ann.caption) {
            tracing::debug!("'{}' in {}: {}.", bad, ann.image_id, ann.caption);
            flagged.push(ann.image_id.clone());
        }
    }
    tracing::info!("Annotations with any blocklist words: {}", flagged.len());

    let source = blocklist.source().to_string();
    store.apply_filter(FilterStage::Words, label, &flagged, images_dir, &source, None)
}

pub fn filter_nsfw<D: NsfwDetector + ?Sized>(
    store: &mut AnnotationStore,
    label: &str,
    detector: &D,
    images_dir: &Path,
    threshold: f64,
) -> Result<usize> {
    store.check_transition(FilterStage::Nsfw, label)?;

    let (ids, paths): (Vec<String>, Vec<PathBuf>) = existing_images(store, images_dir).into_iter().unzip();
    let predictions = if paths.is_empty() { Vec::new() } else { detector.detect(&paths)? };
    ensure_same_len(paths.len(), predictions.len())?;

    let flagged: Vec<String> = ids
        .into_iter()
        .zip(predictions)
        .filter(|(_, p)| p.is_nsfw(threshold))
        .map(|(id, _)| id)
        .collect();
    tracing::info!("Annotations (images) flagged as NSFW: {}", flagged.len());

    let model = detector.model().to_string();
    store.apply_filter(FilterStage::Nsfw, label, &flagged, Some(images_dir), &model, Some(threshold))
}

pub fn filter_faces<D: FaceDetector + ?Sized>(
    store: &mut AnnotationStore,
    label: &str,
    detector: &D,
    images_dir: &Path,
    threshold: f64,
) -> Result<usize> {
    store.check_transition(FilterStage::Faces, label)?;

    let (ids, paths): (Vec<String>, Vec<PathBuf>) = existing_images(store, images_dir).into_iter().unzip();
    let predictions = if paths.is_empty() { Vec::new() } else { detector.detect(&paths, threshold)? };
    ensure_same_len(paths.len(), predictions.len())?;

    let flagged: Vec<String> = ids
        .into_iter()
        .zip(predictions)
        .filter(|(_, p)| p.faces_at(threshold) > 0)
        .map(|(id, _)| id)
        .collect();
    tracing::info!("Annotations (images) with faces: {}", flagged.len());

    let model = detector.model().to_string();
    store.apply_filter(FilterStage::Faces, label, &flagged, Some(images_dir), &model, Some(threshold))
}

/// Load `path`, apply `run` to it, and rewrite the file only if `run` succeeds.
fn filter_file_with<F>(path: &Path, run: F) -> Result<usize>
where
    F: FnOnce(&mut AnnotationStore, &str) -> Result<usize>,
{
    let mut store = AnnotationStore::load(path)?;
    let label = path.display().to_string();
    let removed = run(&mut store, &label)?;
    tracing::info!("Saving updated annotations...");
    store.save(path)?;
    tracing::info!("Saved updated annotations at {}!", label);
    Ok(removed)
}

pub fn filter_words_file(path: &Path, images_dir: &Path, blocklist: &Blocklist) -> Result<usize> {
    filter_file_with(path, |s, label| filter_words(s, label, blocklist, Some(images_dir)))
}

pub fn filter_nsfw_file<D: NsfwDetector + ?Sized>(path: &Path, images_dir: &Path, detector: &D, threshold: f64) -> Result<usize> {
    filter_file_with(path, |s, label| filter_nsfw(s, label, detector, images_dir, threshold))
}

pub fn filter_faces_file<D: FaceDetector + ?Sized>(path: &Path, images_dir: &Path, detector: &D, threshold: f64) -> Result<usize> {
    filter_file_with(path, |s, label| filter_faces(s, label, detector, images_dir, threshold))
}
