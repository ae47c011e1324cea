//! Per-host request pacing shared by every worker that targets the same host.
//!
//! Each call to `acquire` reserves the next free slot for its host and sleeps
//! until that slot starts, so N workers hitting one host are spaced by the
//! host's interval in total (not per worker).

use ahash::AHashMap;
use parking_lot::Mutex;
use std::thread::sleep;
use std::time::{Duration, Instant};

pub struct HostLimiter {
    default_interval: Duration,
    // (substring of host, interval); first match wins and shares one slot key.
    rules: Vec<(String, Duration)>,
    next_slot: Mutex<AHashMap<String, Instant>>,
}

impl HostLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self { default_interval, rules: Vec::new(), next_slot: Mutex::new(AHashMap::new()) }
    }

    /// Image download pacing: 2s between Imgur requests, 100ms for Reddit and Flickr.
    pub fn for_images() -> Self {
        Self::new(Duration::from_millis(100)).with_rule("imgur", Duration::from_secs(2))
    }

    /// No pacing at all (tests).
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_rule(mut self, host_substring: impl Into<String>, interval: Duration) -> Self {
        self.rules.push((host_substring.into(), interval));
        self
    }

    fn key_and_interval(&self, host: &str) -> (String, Duration) {
        for (pat, iv) in &self.rules {
            if host.contains(pat.as_str()) {
                return (pat.clone(), *iv);
            }
        }
        (host.to_string(), self.default_interval)
    }

    pub fn interval_for(&self, url: &str) -> Duration {
        self.key_and_interval(host_of(url)).1
    }

    /// Block until the caller may issue a request to `url`'s host.
    pub fn acquire(&self, url: &str) {
        let (key, interval) = self.key_and_interval(host_of(url));
        if interval.is_zero() {
            return;
        }
        let now = Instant::now();
        let start = {
            let mut slots = self.next_slot.lock();
            let slot = slots.get(&key).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(key, slot + interval);
            slot
        };
        let wait = start.saturating_duration_since(now);
        if !wait.is_zero() {
            sleep(wait);
        }
    }
}

/// Host part of a URL with scheme and path stripped. Falls back to the input.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let end = rest.find(|c: char| c == '/' || c == '?' || c == '#').unwrap_or(rest.len());
    &rest[..end]
}
