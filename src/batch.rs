use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use squeeze_engine::{
    config::{DEFAULT_MAX_WIDTH, DEFAULT_QUALITY_JPG, DEFAULT_QUALITY_WEBP},
    deliver,
    job::savings_ratio,
    source::is_supported,
    DirectorySink, EnvironmentError, ImageSource, Job, JobController, JobStats, Outcome,
    TranscodeConfig,
};

const WRITE_CHECK_FILE: &str = ".image-squeeze-write-check";
const MB: f64 = 1024.0 * 1024.0;

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory to read images from
    #[arg(long, default_value = "./input")]
    pub input: PathBuf,
    /// Directory to write optimized images to (created if missing)
    #[arg(long, default_value = "./output")]
    pub output: PathBuf,
    #[arg(long, default_value_t = i64::from(DEFAULT_MAX_WIDTH), allow_negative_numbers = true)]
    pub max_width: i64,
    #[arg(long, default_value_t = i64::from(DEFAULT_QUALITY_JPG), allow_negative_numbers = true)]
    pub quality_jpg: i64,
    #[arg(long, default_value_t = i64::from(DEFAULT_QUALITY_WEBP), allow_negative_numbers = true)]
    pub quality_webp: i64,
    /// Concurrent transcodes (default: available cores)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

pub async fn run(args: BatchArgs) -> anyhow::Result<()> {
    let config = TranscodeConfig::new(args.max_width, args.quality_jpg, args.quality_webp)
        .context("invalid configuration")?;

    println!("Optimizing images...");
    println!("Input:  {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Config: {}\n", config);

    check_input(&args.input)?;
    prepare_output(&args.output).await?;

    let files = list_images(&args.input)?;
    if files.is_empty() {
        println!("Warning: no images found in {}", args.input.display());
        return Ok(());
    }
    println!("Found {} images.\n", files.len());

    let sources = files
        .iter()
        .map(|(name, path, size)| ImageSource::from_path(name, path, *size))
        .collect::<Result<Vec<_>, _>>()?;
    let total = sources.len();

    let controller = match args.concurrency {
        Some(n) => JobController::new(n),
        None => JobController::with_available_parallelism(),
    };
    let mut job = Job::new(sources, config);
    let run = controller.launch(&mut job)?;
    let stats = deliver(&mut job, run, DirectorySink::new(&args.output), |outcome| {
        println!("{}", outcome_line(outcome));
    })
    .await?;

    println!("{}", report(&stats, total));
    Ok(())
}

fn check_input(input: &Path) -> Result<(), EnvironmentError> {
    if input.is_dir() {
        Ok(())
    } else {
        Err(EnvironmentError::MissingInput(input.to_path_buf()))
    }
}

/// Create the output directory and prove it is writable before any work.
async fn prepare_output(output: &Path) -> Result<(), EnvironmentError> {
    let unwritable = |source| EnvironmentError::UnwritableOutput {
        path: output.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(output).await.map_err(unwritable)?;
    let check = output.join(WRITE_CHECK_FILE);
    tokio::fs::write(&check, b"").await.map_err(unwritable)?;
    tokio::fs::remove_file(&check).await.map_err(unwritable)?;
    Ok(())
}

/// Regular files with an accepted extension, sorted by name. Not recursive.
fn list_images(input: &Path) -> Result<Vec<(String, PathBuf, u64)>, EnvironmentError> {
    let unreadable = |source| EnvironmentError::UnreadableInput {
        path: input.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(input).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_supported(&name) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("skipping {}: {}", name, e);
                continue;
            }
        };
        files.push((name, entry.path(), metadata.len()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn outcome_line(outcome: &Outcome) -> String {
    match &outcome.result {
        Ok(result) => {
            let saved = savings_ratio(outcome.original_size, result.optimized_len())
                .map(|r| format!("{:.1}%", r * 100.0))
                .unwrap_or_else(|| "n/a".to_string());
            format!("{}: done (saved {})", outcome.filename, saved)
        }
        Err(e) => format!("{}: error: {}", outcome.filename, e),
    }
}

fn to_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / MB)
}

fn report(stats: &JobStats, total: usize) -> String {
    let mut lines = vec![
        String::new(),
        "-".repeat(50),
        "Done!".to_string(),
        format!("Images processed: {}/{}", stats.succeeded, total),
        format!("Total size before: {} MB", to_mb(stats.original_bytes)),
        format!("Total size after:  {} MB", to_mb(stats.optimized_bytes)),
    ];
    if let Some(ratio) = stats.savings_ratio() {
        lines.push(format!("Total saved: {:.1}%", ratio * 100.0));
    }
    lines.push("-".repeat(50));
    lines.join("\n")
}
