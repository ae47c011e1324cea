//! Detectors that live in another process.
//!
//! The model runs as an external program: image paths go to its stdin, one per
//! line, and it prints a JSON array with one result per path, in order.

use crate::filter::{FaceDetection, FaceDetector, NsfwDetector, NsfwScores};
use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Clone, Debug)]
pub struct CommandDetector {
    program: PathBuf,
    args: Vec<String>,
    model: String,
}

impl CommandDetector {
    pub fn new(program: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), model: model.into() }
    }

    pub fn arg(mut self, a: impl Into<String>) -> Self {
        self.args.push(a.into());
        self
    }

    fn run<T: DeserializeOwned>(&self, image_paths: &[PathBuf], extra: &[String]) -> Result<Vec<T>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn detector {}", self.program.display()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("detector stdin unavailable"))?;
        let input: String = image_paths.iter().map(|p| format!("{}\n", p.display())).collect();
        // Feed stdin from a separate thread so a chatty detector cannot deadlock on a full pipe.
        let feeder = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output().context("wait for detector")?;
        feeder
            .join()
            .map_err(|_| anyhow!("detector stdin writer panicked"))?
            .context("write image paths to detector")?;

        if !output.status.success() {
            bail!("detector {} exited with {}", self.program.display(), output.status);
        }
        serde_json::from_slice(&output.stdout).context("parse detector output")
    }
}

impl NsfwDetector for CommandDetector {
    fn model(&self) -> &str { &self.model }

    fn detect(&self, image_paths: &[PathBuf]) -> Result<Vec<NsfwScores>> {
        self.run(image_paths, &[])
    }
}

impl FaceDetector for CommandDetector {
    fn model(&self) -> &str { &self.model }

    fn detect(&self, image_paths: &[PathBuf], conf_threshold: f64) -> Result<Vec<FaceDetection>> {
        self.run(image_paths, &["--confidence-threshold".to_string(), conf_threshold.to_string()])
    }
}
