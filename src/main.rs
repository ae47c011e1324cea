use anyhow::Result;
use clap::{Parser, Subcommand};
use redcaps::{
    init_tracing_once, Blocklist, CommandDetector, Credentials, RedCaps, YearMonth, DEFAULT_FACE_THRESHOLD,
    DEFAULT_NSFW_THRESHOLD, DEFAULT_WORKERS,
};
use std::path::PathBuf;
use std::process::ExitCode;

const IMAGES_DIR: &str = "./datasets/redcaps/images";
const ANNOTATIONS_DIR: &str = "./datasets/redcaps/annotations";

#[derive(Parser)]
#[command(name = "redcaps")]
#[command(about = "Collect, filter and merge RedCaps image-text annotations")]
#[command(version)]
struct Cli {
    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download image posts of one subreddit submitted in one month
    DownloadAnns {
        /// Subreddit name, with or without the `r/` prefix
        #[arg(short, long)]
        subreddit: String,

        /// Month to download, YYYY-MM (day 1 00:00:00 UTC to the last day 23:59:59 UTC)
        #[arg(short = 'm', long = "yyyy-mm")]
        month: YearMonth,

        /// JSON file with Reddit and Imgur API credentials
        #[arg(short, long)]
        credentials: PathBuf,

        /// JSON path or directory for the annotations
        #[arg(short = 'o', long, default_value = ANNOTATIONS_DIR)]
        save_to: PathBuf,

        /// Query window in hours, at most 24
        #[arg(short, long, default_value_t = 24.0)]
        time_window: f64,

        /// Days harvested at once
        #[arg(long, default_value_t = 1)]
        day_concurrency: usize,
    },

    /// Download the images of an annotation file
    DownloadImgs {
        #[arg(short, long)]
        annotations: PathBuf,

        /// Images land in one sub-directory per subreddit
        #[arg(short = 'o', long, default_value = IMAGES_DIR)]
        save_to: PathBuf,

        /// Drop annotations whose image failed to download (file is rewritten)
        #[arg(short, long)]
        update_annotations: bool,

        #[arg(short = 'j', long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },

    /// Merge annotation files (or directories of them) into one file
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short = 'o', long)]
        save_to: PathBuf,

        /// Delete the source files after merging
        #[arg(short, long)]
        delete_old: bool,
    },

    /// Remove annotations whose caption contains a blocklisted word
    FilterWords {
        /// Annotation file, modified in place
        #[arg(short, long)]
        annotations: PathBuf,

        #[arg(short, long, default_value = IMAGES_DIR)]
        images: PathBuf,

        /// Local word list; downloaded when omitted
        #[arg(short, long)]
        blocklist: Option<PathBuf>,
    },

    /// Remove images flagged as NSFW, and their annotations
    FilterNsfw {
        #[arg(short, long)]
        annotations: PathBuf,

        #[arg(short, long, default_value = IMAGES_DIR)]
        images: PathBuf,

        /// Detector program: image paths on stdin, JSON scores on stdout
        #[arg(short, long)]
        detector: PathBuf,

        /// Model provenance written to the file header
        #[arg(short, long, default_value = redcaps::NSFW_REPO)]
        model: String,

        /// porn + hentai probability above which an image is flagged
        #[arg(short = 't', long, default_value_t = DEFAULT_NSFW_THRESHOLD)]
        confidence_threshold: f64,
    },

    /// Remove images with detected faces, and their annotations
    FilterFaces {
        #[arg(short, long)]
        annotations: PathBuf,

        #[arg(short, long, default_value = IMAGES_DIR)]
        images: PathBuf,

        /// Detector program: image paths on stdin, JSON boxes on stdout
        #[arg(short, long)]
        detector: PathBuf,

        #[arg(short, long, default_value = redcaps::FACES_REPO)]
        model: String,

        #[arg(short = 't', long, default_value_t = DEFAULT_FACE_THRESHOLD)]
        confidence_threshold: f64,
    },

    /// Check an annotation file before release; never modifies it
    Validate {
        #[arg(short, long)]
        annotations: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing_once();
    if let Err(e) = run() {
        tracing::error!("{:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let base = RedCaps::new().progress(!cli.quiet);

    match cli.command {
        Commands::DownloadAnns { subreddit, month, credentials, save_to, time_window, day_concurrency } => {
            let creds = Credentials::load(&credentials)?;
            let report = base
                .annotations_dir(&save_to)
                .time_window_hours(time_window)
                .day_concurrency(day_concurrency)
                .user_agent(creds.reddit.user_agent.clone())
                .download_annotations_online(&creds, &subreddit, month)?;
            println!("{} annotations saved at {}", report.num_records, report.path.display());
        }
        Commands::DownloadImgs { annotations, save_to, update_annotations, workers } => {
            let report = base
                .images_dir(&save_to)
                .update_annotations(update_annotations)
                .workers(workers)
                .download_images_online(&annotations)?;
            println!("Downloaded {}/{} images", report.downloaded, report.attempted);
        }
        Commands::Merge { inputs, save_to, delete_old } => {
            if let Some(report) = base.merge(&inputs, &save_to, delete_old)? {
                println!("Merged {} files into {} ({} annotations)", report.inputs.len(), save_to.display(), report.num_records);
            }
        }
        Commands::FilterWords { annotations, images, blocklist } => {
            let words = match blocklist {
                Some(p) => Blocklist::load(&p)?,
                None => Blocklist::fetch(&Blocklist::default_url())?,
            };
            let removed = base.images_dir(&images).filter_words(&annotations, &words)?;
            println!("Removed {} annotations", removed);
        }
        Commands::FilterNsfw { annotations, images, detector, model, confidence_threshold } => {
            let detector = CommandDetector::new(detector, model);
            let removed = base
                .images_dir(&images)
                .nsfw_threshold(confidence_threshold)
                .filter_nsfw(&annotations, &detector)?;
            println!("Removed {} annotations", removed);
        }
        Commands::FilterFaces { annotations, images, detector, model, confidence_threshold } => {
            let detector = CommandDetector::new(detector, model);
            let removed = base
                .images_dir(&images)
                .face_threshold(confidence_threshold)
                .filter_faces(&annotations, &detector)?;
            println!("Removed {} annotations", removed);
        }
        Commands::Validate { annotations } => {
            let report = base.validate(&annotations)?;
            if !report.is_clean() {
                println!(
                    "{} annotations: {} missing info keys, {} pending filters, {} out of range",
                    report.num_annotations,
                    report.missing_info_keys.len(),
                    report.pending_filters.len(),
                    report.out_of_range_ids.len()
                );
            }
        }
    }
    Ok(())
}
