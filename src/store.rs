//! Annotation files: an `info` header plus a list of curated posts.
//!
//! Invariants kept by every mutating operation here:
//! - `image_id` is unique across the list;
//! - the list is sorted ascending by `created_utc` (stable for ties);
//! - filter markers are only ever added, in `Words -> Nsfw -> Faces` order.

use crate::date::{day_end_utc, day_start_utc, format_day, parse_day};
use crate::error::CurateError;
use crate::paths::image_path;
use crate::util::{open_with_backoff, remove_with_backoff, write_json_replace};
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::Path;
use time::Date;

pub const DATASET_URL: &str = "https://redcaps.xyz";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One curated post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub image_id: String,
    pub subreddit: String,
    pub url: String,
    pub caption: String,
    pub raw_caption: String,
    pub score: i64,
    pub author: String,
    pub created_utc: i64,
    pub permalink: String,
}

/// Provenance of a filter stage that already ran on a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterMarker {
    pub num_removed: usize,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub start_date: String,
    pub end_date: String,
    pub url: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_filter: Option<FilterMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfw_filter: Option<FilterMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_filter: Option<FilterMarker>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterStage {
    Words,
    Nsfw,
    Faces,
}

impl FilterStage {
    pub const ALL: [FilterStage; 3] = [FilterStage::Words, FilterStage::Nsfw, FilterStage::Faces];

    /// Key of this stage's marker inside `info`.
    pub fn key(self) -> &'static str {
        match self {
            FilterStage::Words => "word_filter",
            FilterStage::Nsfw => "nsfw_filter",
            FilterStage::Faces => "face_filter",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterStage::Words => "word",
            FilterStage::Nsfw => "NSFW",
            FilterStage::Faces => "face",
        }
    }

    pub fn command(self) -> &'static str {
        match self {
            FilterStage::Words => "redcaps filter-words",
            FilterStage::Nsfw => "redcaps filter-nsfw",
            FilterStage::Faces => "redcaps filter-faces",
        }
    }
}

/// Curation progress derived from the markers present in `info`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterState {
    Raw,
    WordFiltered,
    NsfwFiltered,
    FaceFiltered,
}

impl StoreInfo {
    pub fn new(start: Date, end: Date) -> Self {
        Self {
            start_date: format_day(start),
            end_date: format_day(end),
            url: DATASET_URL.to_string(),
            version: VERSION.to_string(),
            word_filter: None,
            nsfw_filter: None,
            face_filter: None,
        }
    }

    pub fn start(&self) -> Result<Date> { parse_day(&self.start_date) }
    pub fn end(&self) -> Result<Date> { parse_day(&self.end_date) }

    /// Inclusive epoch-second bounds: `start_date 00:00:00` to `end_date 23:59:59` UTC.
    pub fn time_bounds(&self) -> Result<(i64, i64)> {
        Ok((day_start_utc(self.start()?), day_end_utc(self.end()?)))
    }

    pub fn marker(&self, stage: FilterStage) -> Option<&FilterMarker> {
        match stage {
            FilterStage::Words => self.word_filter.as_ref(),
            FilterStage::Nsfw => self.nsfw_filter.as_ref(),
            FilterStage::Faces => self.face_filter.as_ref(),
        }
    }

    fn marker_slot(&mut self, stage: FilterStage) -> &mut Option<FilterMarker> {
        match stage {
            FilterStage::Words => &mut self.word_filter,
            FilterStage::Nsfw => &mut self.nsfw_filter,
            FilterStage::Faces => &mut self.face_filter,
        }
    }

    pub fn applied_stages(&self) -> Vec<FilterStage> {
        FilterStage::ALL.into_iter().filter(|s| self.marker(*s).is_some()).collect()
    }

    pub fn clear_markers(&mut self) {
        for s in FilterStage::ALL {
            *self.marker_slot(s) = None;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStore {
    pub info: StoreInfo,
    pub annotations: Vec<AnnotationRecord>,
}

impl AnnotationStore {
    pub fn new(start: Date, end: Date, annotations: Vec<AnnotationRecord>) -> Self {
        Self { info: StoreInfo::new(start, end), annotations }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse annotations {}", path.display()))
    }

    /// Rewrite the whole file.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_replace(path, self)
    }

    pub fn len(&self) -> usize { self.annotations.len() }
    pub fn is_empty(&self) -> bool { self.annotations.is_empty() }

    pub fn state(&self) -> FilterState {
        match (&self.info.word_filter, &self.info.nsfw_filter, &self.info.face_filter) {
            (_, _, Some(_)) => FilterState::FaceFiltered,
            (_, Some(_), None) => FilterState::NsfwFiltered,
            (Some(_), None, None) => FilterState::WordFiltered,
            (None, None, None) => FilterState::Raw,
        }
    }

    /// Reject running `stage` again, before its predecessor, or after a later stage.
    /// `label` names the store in the error (usually its path).
    pub fn check_transition(&self, stage: FilterStage, label: &str) -> Result<(), CurateError> {
        if self.info.marker(stage).is_some() {
            return Err(CurateError::AlreadyFiltered { path: label.to_string(), stage: stage.label() });
        }
        for other in FilterStage::ALL {
            let present = self.info.marker(other).is_some();
            if other < stage && !present {
                return Err(CurateError::OutOfOrder {
                    path: label.to_string(),
                    stage: stage.label(),
                    reason: format!("{} filter has not run yet (run '{}')", other.label(), other.command()),
                });
            }
            if other > stage && present {
                return Err(CurateError::OutOfOrder {
                    path: label.to_string(),
                    stage: stage.label(),
                    reason: format!("{} filter already ran", other.label()),
                });
            }
        }
        Ok(())
    }

    /// Restore the list invariants: unique ids (the last occurrence wins) and
    /// ascending `created_utc`.
    pub fn normalize(&mut self) {
        let records = std::mem::take(&mut self.annotations);
        self.annotations = dedup_sorted(records);
    }

    /// Drop the given ids and delete their images (when `images_dir` is given and
    /// the file exists). Every id must be present; on an unknown id nothing changes.
    /// Returns the number of records removed.
    pub fn remove(&mut self, ids: &[String], images_dir: Option<&Path>) -> Result<usize> {
        let present: AHashSet<&str> = self.annotations.iter().map(|a| a.image_id.as_str()).collect();
        if let Some(missing) = ids.iter().find(|id| !present.contains(id.as_str())) {
            return Err(CurateError::UnknownId(missing.clone()).into());
        }

        let doomed: AHashSet<&str> = ids.iter().map(|s| s.as_str()).collect();

        // Images go first; a failed delete leaves the record list as it was.
        if let Some(dir) = images_dir {
            for ann in self.annotations.iter().filter(|a| doomed.contains(a.image_id.as_str())) {
                let p = image_path(dir, &ann.subreddit, &ann.image_id);
                if remove_with_backoff(&p, 10, 25)? {
                    tracing::debug!("deleted {}", p.display());
                }
            }
        }

        self.annotations.retain(|a| !doomed.contains(a.image_id.as_str()));
        self.normalize();
        Ok(doomed.len())
    }

    /// The single entry point for a filter stage's mutation: validate the
    /// transition, remove the flagged records, then stamp the marker.
    pub fn apply_filter(
        &mut self,
        stage: FilterStage,
        label: &str,
        flagged: &[String],
        images_dir: Option<&Path>,
        model: &str,
        confidence_threshold: Option<f64>,
    ) -> Result<usize> {
        self.check_transition(stage, label)?;
        let num_removed = self.remove(flagged, images_dir)?;
        *self.info.marker_slot(stage) = Some(FilterMarker {
            num_removed,
            model: model.to_string(),
            confidence_threshold,
        });
        Ok(num_removed)
    }
}

/// Unique by `image_id` (last occurrence wins), stable-sorted by `created_utc`.
pub fn dedup_sorted(records: Vec<AnnotationRecord>) -> Vec<AnnotationRecord> {
    let mut last_index: AHashMap<&str, usize> = AHashMap::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        last_index.insert(r.image_id.as_str(), i);
    }
    let keep: Vec<bool> = records
        .iter()
        .enumerate()
        .map(|(i, r)| last_index.get(r.image_id.as_str()) == Some(&i))
        .collect();
    drop(last_index);

    let mut out: Vec<AnnotationRecord> = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| if k { Some(r) } else { None })
        .collect();
    out.sort_by_key(|r| r.created_utc);
    out
}
