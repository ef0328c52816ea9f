use std::path::PathBuf;

use thiserror::Error;

/// Input rejected before any transcoding starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("maxWidth must be greater than 0, got {0}")]
    MaxWidth(i64),
    #[error("qualityJpg must be within 1..=100, got {0}")]
    QualityJpg(i64),
    #[error("qualityWebp must be within 1..=100, got {0}")]
    QualityWebp(i64),
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("{name} exceeds the upload limit of {limit} bytes")]
    TooLarge { name: String, limit: u64 },
    #[error("no images were supplied")]
    NoImages,
}

/// Missing or unusable directories. Fatal to the whole run or request.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("input directory {0} does not exist")]
    MissingInput(PathBuf),
    #[error("cannot read input directory {path}: {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("output directory {path} is not writable: {source}")]
    UnwritableOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single source failed. Recorded against the job, never fatal to it.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{format} encode failed: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },
    #[error("transcode aborted: {0}")]
    Aborted(String),
}

impl TranscodeError {
    pub(crate) fn encode(format: &'static str, reason: impl ToString) -> Self {
        TranscodeError::Encode {
            format,
            reason: reason.to_string(),
        }
    }
}

/// The output container could not be produced.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive has no entries")]
    Empty,
    #[error("archive already finished")]
    Finished,
}

#[derive(Debug, Error)]
#[error("failed to remove {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Terminal failure of a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("job {0} was already launched")]
    AlreadyLaunched(String),
    #[error("job cancelled")]
    Cancelled,
}
