pub mod archive;
pub mod config;
pub mod encoder;
pub mod error;
pub mod job;
pub mod pipe;
pub mod scaler;
pub mod scratch;
pub mod sink;
pub mod source;
pub mod transcoder;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{ArchiveAssembler, ArchiveEntry, DirectorySink, EntrySink};
pub use config::TranscodeConfig;
pub use error::{
    ArchiveError, CleanupError, EnvironmentError, JobError, TranscodeError, ValidationError,
};
pub use job::{Job, JobController, JobId, JobReport, JobRun, JobStats, JobStatus, Outcome};
pub use pipe::{Pipe, deliver};
pub use scratch::{ScratchDir, StageError, StagedFile};
pub use sink::{AbortHandle, ArchiveBody, ChannelWriter, archive_channel};
pub use source::{ImageKind, ImageSource};
pub use transcoder::{TranscodeResult, transcode};
