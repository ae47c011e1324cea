mod config;
mod date;
mod paths;
mod error;

mod progress;
mod concurrency;
mod util;
mod retry;
mod limiter;
mod pipeline;

mod harvest;
mod reddit;
mod imgur;
mod caption;
mod resolve;

mod store;
mod filter;
mod detect;
mod download;
mod merge;
mod validate;

pub use crate::config::{CurateOptions, Credentials, DEFAULT_USER_AGENT};
pub use crate::date::{day_end_utc, day_start_utc, format_day, parse_day, YearMonth};
pub use crate::error::CurateError;
pub use crate::pipeline::{normalize_subreddit, AnnotationsReport, RedCaps};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, make_count_progress, ProgressScope};

// Upstream plumbing shared by the harvester, resolver and image stage.
pub use crate::retry::RetryPolicy;
pub use crate::limiter::{host_of, HostLimiter};
pub use crate::concurrency::map_limited;

// Harvest + resolve.
pub use crate::harvest::{default_allowed_domains, plan_day_windows, IdHarvester, IdHit, IdSource, PushshiftClient, TimeWindow, PAGE_CAP, MIN_SPLIT_SECONDS};
pub use crate::reddit::{GalleryData, GalleryItem, PostInfo, PostSource, RedditClient, RedditCredentials, INFO_BATCH};
pub use crate::imgur::{parse_quota, AlbumReply, AlbumSource, ImgurClient, ImgurCredentials, RateQuota, REMOVED_PLACEHOLDER};
pub use crate::caption::{fix_mojibake, sanitize, uncurl_quotes};
pub use crate::resolve::{classify_imgur_url, enforce_quota, is_eligible, reddit_gallery_url, ImgurTarget, InfoResolver, MIN_SCORE};

// Store, filters and the stages that consume annotation files.
pub use crate::store::{dedup_sorted, AnnotationRecord, AnnotationStore, FilterMarker, FilterStage, FilterState, StoreInfo, DATASET_URL, VERSION};
pub use crate::filter::{
    existing_images, filter_faces, filter_faces_file, filter_nsfw, filter_nsfw_file, filter_words, filter_words_file, Blocklist,
    FaceDetection, FaceDetector, NsfwDetector, NsfwScores, DEFAULT_FACE_THRESHOLD, DEFAULT_NSFW_THRESHOLD, FACES_REPO, NSFW_REPO, WORDS_REPO,
};
pub use crate::detect::CommandDetector;
pub use crate::download::{download_images, download_images_file, DownloadReport, HttpImageFetcher, ImageFetcher, DEFAULT_WORKERS};
pub use crate::merge::{merge, merge_files, MergeReport};
pub use crate::validate::{validate_file, validate_value, ValidationReport};

//export path conventions and robust file ops so binaries can import from crate root.
pub use crate::paths::{annotation_output_path, expand_annotation_inputs, image_id_from_path, image_path};
pub use crate::util::{
    init_tracing_once, open_with_backoff, create_with_backoff, remove_with_backoff, replace_file_atomic_backoff, write_bytes_replace,
    write_json_replace,
};
