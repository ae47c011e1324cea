use crate::config::{CurateOptions, Credentials};
use crate::date::YearMonth;
use crate::download::{download_images_file, DownloadReport, HttpImageFetcher, ImageFetcher};
use crate::filter::{filter_faces_file, filter_nsfw_file, filter_words_file, Blocklist, FaceDetector, NsfwDetector};
use crate::harvest::{IdHarvester, IdSource, PushshiftClient};
use crate::imgur::{AlbumSource, ImgurClient};
use crate::limiter::HostLimiter;
use crate::merge::{merge_files, MergeReport};
use crate::paths::annotation_output_path;
use crate::reddit::{PostSource, RedditClient};
use crate::resolve::InfoResolver;
use crate::store::AnnotationStore;
use crate::util::init_tracing_once;
use crate::validate::{validate_file, ValidationReport};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Summary of one subreddit-month annotation download.
#[derive(Clone, Debug)]
pub struct AnnotationsReport {
    pub path: PathBuf,
    pub num_ids: usize,
    pub num_records: usize,
}

impl AnnotationsReport {
    /// Harvested posts that did not become records.
    pub fn ignored(&self) -> usize {
        self.num_ids.saturating_sub(self.num_records)
    }
}

#[derive(Clone, Default)]
pub struct RedCaps {
    pub(crate) opts: CurateOptions,
}

impl RedCaps {
    pub fn new() -> Self {
        Self { opts: CurateOptions::default() }
    }

    pub fn options(&self) -> &CurateOptions { &self.opts }

    // -------- Builder methods --------
    pub fn images_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_images_dir(dir); self }
    pub fn annotations_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_annotations_dir(dir); self }
    pub fn time_window_hours(mut self, hours: f64) -> Self { self.opts = self.opts.with_time_window_hours(hours); self }
    pub fn day_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_day_concurrency(n); self }
    pub fn workers(mut self, n: usize) -> Self { self.opts = self.opts.with_workers(n); self }
    pub fn update_annotations(mut self, yes: bool) -> Self { self.opts = self.opts.with_update_annotations(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self { self.opts = self.opts.with_user_agent(ua); self }
    pub fn nsfw_threshold(mut self, t: f64) -> Self { self.opts = self.opts.with_nsfw_threshold(t); self }
    pub fn face_threshold(mut self, t: f64) -> Self { self.opts = self.opts.with_face_threshold(t); self }

    // -------- Annotations --------

    /// Harvest every post id of `subreddit` in `month`, resolve them into
    /// records and write `<annotations_dir>/<subreddit>_<YYYY-MM>.json`.
    pub fn download_annotations<S, P, A>(
        &self,
        subreddit: &str,
        month: YearMonth,
        harvester: &IdHarvester<S>,
        resolver: &InfoResolver<P, A>,
    ) -> Result<AnnotationsReport>
    where
        S: IdSource,
        P: PostSource,
        A: AlbumSource,
    {
        init_tracing_once();
        let subreddit = normalize_subreddit(subreddit);
        let ids = harvester.harvest_month(&subreddit, month, self.opts.time_window_hours, self.opts.day_concurrency)?;
        tracing::info!("Total {} Reddit post IDs in r/{} for {}.", ids.len(), subreddit, month);

        let records = resolver.resolve(&ids)?;
        let mut store = AnnotationStore::new(month.first_day(), month.last_day(), records);
        store.normalize();

        let report = AnnotationsReport {
            path: annotation_output_path(&self.opts.annotations_dir, &subreddit, month),
            num_ids: ids.len(),
            num_records: store.len(),
        };
        tracing::info!(
            "Ignored {} posts: removed, NSFW, low score or unusable gallery.",
            report.ignored()
        );
        store.save(&report.path)?;
        tracing::info!("Saved {} annotations at {}!", report.num_records, report.path.display());
        Ok(report)
    }

    /// `download_annotations` against the live Pushshift, Reddit and Imgur APIs.
    pub fn download_annotations_online(
        &self,
        credentials: &Credentials,
        subreddit: &str,
        month: YearMonth,
    ) -> Result<AnnotationsReport> {
        let harvester = IdHarvester::new(PushshiftClient::new(&self.opts.user_agent)?);
        let resolver = InfoResolver::new(RedditClient::new(credentials.reddit.clone())?, ImgurClient::new(&credentials.imgur)?)
            .progress(self.opts.progress);
        self.download_annotations(subreddit, month, &harvester, &resolver)
    }

    // -------- Images --------

    pub fn download_images<F: ImageFetcher>(&self, annotations: &Path, fetcher: &F, limiter: &HostLimiter) -> Result<DownloadReport> {
        init_tracing_once();
        download_images_file(
            annotations,
            &self.opts.images_dir,
            fetcher,
            limiter,
            self.opts.workers,
            self.opts.update_annotations,
            self.opts.progress,
        )
    }

    /// Download over HTTP, paced per host.
    pub fn download_images_online(&self, annotations: &Path) -> Result<DownloadReport> {
        let fetcher = HttpImageFetcher::new(&self.opts.user_agent)?;
        self.download_images(annotations, &fetcher, &HostLimiter::for_images())
    }

    // -------- Filters --------

    pub fn filter_words(&self, annotations: &Path, blocklist: &Blocklist) -> Result<usize> {
        init_tracing_once();
        filter_words_file(annotations, &self.opts.images_dir, blocklist)
    }

    pub fn filter_nsfw<D: NsfwDetector + ?Sized>(&self, annotations: &Path, detector: &D) -> Result<usize> {
        init_tracing_once();
        filter_nsfw_file(annotations, &self.opts.images_dir, detector, self.opts.nsfw_threshold)
    }

    pub fn filter_faces<D: FaceDetector + ?Sized>(&self, annotations: &Path, detector: &D) -> Result<usize> {
        init_tracing_once();
        filter_faces_file(annotations, &self.opts.images_dir, detector, self.opts.face_threshold)
    }

    // -------- Merge & validation --------

    pub fn merge(&self, inputs: &[PathBuf], save_to: &Path, delete_old: bool) -> Result<Option<MergeReport>> {
        init_tracing_once();
        merge_files(inputs, save_to, delete_old)
    }

    pub fn validate(&self, annotations: &Path) -> Result<ValidationReport> {
        init_tracing_once();
        validate_file(annotations)
    }
}

/// Lowercase, trimmed, without a leading `r/`.
pub fn normalize_subreddit(sub: &str) -> String {
    let s = sub.trim().to_lowercase();
    match s.strip_prefix("r/") {
        Some(rest) => rest.to_string(),
        None => s,
    }
}
