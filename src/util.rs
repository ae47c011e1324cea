use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

// -------- robust file ops with backoff (AV scanners, network shares) --------

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), USB/NAS volumes, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 access denied, 32 sharing violation, 33 lock violation, 225 AV blocked,
    // 1006 volume altered, 1117 device error, 1224 user-mapped section, 21 not ready.
    // Windows codes only; on Unix 21 is EISDIR and 5 is EIO.
    cfg!(windows) && matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 225 | 1006 | 1117 | 1224))
}

/// Run `op` up to `tries` times, backing off linearly on retriable errors only.
fn with_io_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_io_backoff(tries, delay_ms, || File::open(path))
}

pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_io_backoff(tries, delay_ms, || File::create(path))
}

/// Remove a file; a file that is already gone counts as success.
/// Returns whether something was actually deleted.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<bool> {
    let res = with_io_backoff(tries, delay_ms, || match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    });
    res.with_context(|| format!("remove {}", path.display()))
}

/// Replace `dest` with `tmp`. Falls back to copy+remove when rename is refused.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let (tries, delay_ms) = (20usize, 50u64);
    if with_io_backoff(tries, delay_ms, || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_io_backoff(tries, delay_ms, || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp, tries, delay_ms)?;
    Ok(())
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".inprogress");
    dest.with_file_name(name)
}

fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write through a sibling temp file, then promote it to `dest`.
/// A failed write never leaves a half-written `dest` behind, nor the temp file.
fn write_replace_with(dest: &Path, fill: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    ensure_parent(dest)?;
    let tmp = staging_path(dest);
    let written = create_with_backoff(&tmp, 16, 50)
        .with_context(|| format!("create {}", tmp.display()))
        .and_then(|f| {
            let mut w = BufWriter::with_capacity(256 * 1024, f);
            fill(&mut w)?;
            w.flush().with_context(|| format!("flush {}", tmp.display()))
        });
    if let Err(e) = written {
        if let Err(cleanup) = remove_with_backoff(&tmp, 4, 25) {
            tracing::warn!("leaving {}: {:#}", tmp.display(), cleanup);
        }
        return Err(e);
    }
    replace_file_atomic_backoff(&tmp, dest)
}

/// Serialize `value` as compact JSON into `dest`.
pub fn write_json_replace<T: Serialize>(dest: &Path, value: &T) -> Result<()> {
    write_replace_with(dest, |w| {
        serde_json::to_writer(w, value).with_context(|| format!("serialize {}", dest.display()))
    })
}

pub fn write_bytes_replace(dest: &Path, bytes: &[u8]) -> Result<()> {
    write_replace_with(dest, |w| w.write_all(bytes).with_context(|| format!("write {}", dest.display())))
}
