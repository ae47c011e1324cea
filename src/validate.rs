//! Read-only release checks for an annotation file.
//!
//! Only a missing top-level key is an error; every other finding is reported
//! as a warning and collected in the returned report.

use crate::date::{day_end_utc, day_start_utc, parse_day};
use crate::error::CurateError;
use crate::store::FilterStage;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::BufReader;
use std::path::Path;

pub const REQUIRED_KEYS: [&str; 2] = ["info", "annotations"];
pub const REQUIRED_INFO_KEYS: [&str; 4] = ["start_date", "end_date", "url", "version"];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub num_annotations: usize,
    pub missing_info_keys: Vec<String>,
    pub pending_filters: Vec<FilterStage>,
    /// Ids whose `created_utc` falls outside `[start_date, end_date]`.
    pub out_of_range_ids: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_info_keys.is_empty() && self.pending_filters.is_empty() && self.out_of_range_ids.is_empty()
    }
}

fn day_bound(info: &Value, key: &str) -> Option<time::Date> {
    let raw = info.get(key)?.as_str()?;
    match parse_day(raw) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!("Info key '{}' is not a date: {:#}", key, e);
            None
        }
    }
}

pub fn validate_value(doc: &Value, label: &str) -> Result<ValidationReport, CurateError> {
    for key in REQUIRED_KEYS {
        if doc.get(key).is_none() {
            tracing::error!("'{}' not found! Invalid file, aborting!", key);
            return Err(CurateError::MissingKey { path: label.to_string(), key: key.to_string() });
        }
    }

    let info = &doc["info"];
    let mut report = ValidationReport::default();

    for key in REQUIRED_INFO_KEYS {
        if info.get(key).is_none() {
            tracing::warn!("Info key '{}' not found, invalid file!", key);
            report.missing_info_keys.push(key.to_string());
        }
    }

    for stage in FilterStage::ALL {
        if info.get(stage.key()).is_none() {
            tracing::warn!("{}-filtering pending, run '{}'", stage.label(), stage.command());
            report.pending_filters.push(stage);
        }
    }

    let annotations = doc["annotations"].as_array().map(|a| a.as_slice()).unwrap_or(&[]);
    report.num_annotations = annotations.len();

    if let (Some(start), Some(end)) = (day_bound(info, "start_date"), day_bound(info, "end_date")) {
        let (lo, hi) = (day_start_utc(start), day_end_utc(end));
        for ann in annotations {
            let ts = ann.get("created_utc").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
            let id = ann.get("image_id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            match ts {
                Some(t) if t >= lo && t <= hi => {}
                _ => {
                    tracing::warn!("Found ID {} outside time limits!", id);
                    report.out_of_range_ids.push(id.to_string());
                }
            }
        }
    }

    Ok(report)
}

pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    tracing::info!("Validating {}...", path.display());
    let f = crate::util::open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let doc: Value = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {}", path.display()))?;
    let report = validate_value(&doc, &path.display().to_string())?;
    tracing::info!("Done. If nothing was printed above then file is valid!");
    Ok(report)
}
