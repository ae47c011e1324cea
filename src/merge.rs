//! Combine several annotation files into one.
//!
//! Records are concatenated in input order, de-duplicated by `image_id` (last
//! one wins) and sorted by `created_utc`. The merged header spans all inputs
//! and carries no filter markers: a merged file starts over as unfiltered.

use crate::error::CurateError;
use crate::paths::expand_annotation_inputs;
use crate::store::{dedup_sorted, AnnotationStore, StoreInfo, VERSION};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Merge in-memory stores. Needs at least two.
pub fn merge(stores: &[AnnotationStore]) -> Result<AnnotationStore> {
    if stores.len() < 2 {
        return Err(CurateError::NothingToMerge(stores.len()).into());
    }

    let mut start = stores[0].info.start()?;
    let mut end = stores[0].info.end()?;
    let mut records = Vec::with_capacity(stores.iter().map(|s| s.len()).sum());
    for s in stores {
        start = start.min(s.info.start()?);
        end = end.max(s.info.end()?);
        records.extend(s.annotations.iter().cloned());
    }

    Ok(AnnotationStore { info: StoreInfo::new(start, end), annotations: dedup_sorted(records) })
}

#[derive(Clone, Debug, Default)]
pub struct MergeReport {
    pub inputs: Vec<PathBuf>,
    pub num_records: usize,
    pub deleted: Vec<PathBuf>,
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Merge annotation files (directories expand to their `*.json` files) into `save_to`.
///
/// Returns `Ok(None)` with a warning when fewer than two files are found.
/// With `delete_old`, inputs from another version or carrying filter markers
/// abort the merge before anything is written; otherwise they only warn.
pub fn merge_files(inputs: &[PathBuf], save_to: &Path, delete_old: bool) -> Result<Option<MergeReport>> {
    let paths = expand_annotation_inputs(inputs);
    if paths.len() < 2 {
        tracing::warn!("Nothing to merge: provided less than two file paths!");
        return Ok(None);
    }

    let mut stores = Vec::with_capacity(paths.len());
    for p in &paths {
        let store = AnnotationStore::load(p)?;

        if store.info.version != VERSION {
            tracing::warn!(
                "Version mismatch for merge: {} has {} and package has {}!",
                p.display(),
                store.info.version,
                VERSION
            );
            if delete_old {
                return Err(CurateError::DeleteRefused(format!(
                    "{} was produced by version {}; run without delete",
                    p.display(),
                    store.info.version
                ))
                .into());
            }
        }

        if !store.info.applied_stages().is_empty() {
            tracing::warn!("{} filter info will not be included in merged file!", p.display());
            if delete_old {
                return Err(CurateError::DeleteRefused(format!(
                    "{} is already filtered; run without delete",
                    p.display()
                ))
                .into());
            }
        }
        stores.push(store);
    }

    let merged = merge(&stores)?;
    tracing::info!("Saving merged annotations at {}...", save_to.display());
    merged.save(save_to)?;

    let mut report = MergeReport { inputs: paths.clone(), num_records: merged.len(), deleted: Vec::new() };

    if delete_old {
        tracing::warn!("Deleting old file paths after merging...");
        for old in &paths {
            // The merged file may overwrite one of its own inputs.
            if same_file(old, save_to) {
                continue;
            }
            fs::remove_file(old).with_context(|| format!("delete {}", old.display()))?;
            tracing::warn!("Deleted {}!", old.display());
            report.deleted.push(old.clone());
        }
    }
    Ok(Some(report))
}
