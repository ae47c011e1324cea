use crate::date::YearMonth;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `<images_dir>/<subreddit>/<image_id>.jpg`
pub fn image_path(images_dir: &Path, subreddit: &str, image_id: &str) -> PathBuf {
    images_dir.join(subreddit).join(format!("{}.jpg", image_id))
}

/// Recover the image id from a path built by `image_path`.
pub fn image_id_from_path(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_string())
}

/// `<dir>/<subreddit>_<YYYY-MM>.json`, or `save_to` itself when it already names a `.json` file.
pub fn annotation_output_path(save_to: &Path, subreddit: &str, month: YearMonth) -> PathBuf {
    if save_to.extension().map(|e| e == "json").unwrap_or(false) {
        save_to.to_path_buf()
    } else {
        save_to.join(format!("{}_{}.json", subreddit, month))
    }
}

/// Expand each input into annotation files: files are taken as-is, directories
/// contribute their `*.json` children (non-recursive). Missing paths are skipped
/// with a warning. The result is sorted lexicographically and de-duplicated.
pub fn expand_annotation_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for ent in WalkDir::new(input).min_depth(1).max_depth(1).into_iter().flatten() {
                let p = ent.path();
                if ent.file_type().is_file() && p.extension().map(|e| e == "json").unwrap_or(false) {
                    out.push(p.to_path_buf());
                }
            }
        } else if input.is_file() {
            out.push(input.clone());
        } else {
            tracing::warn!("{} does not exist, skipping", input.display());
        }
    }
    out.sort();
    out.dedup();
    out
}
