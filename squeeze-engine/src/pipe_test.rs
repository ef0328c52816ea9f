use std::{
    io::{self, Cursor, Write},
    sync::{Arc, Mutex},
};

use super::*;
use crate::{
    archive::{ArchiveAssembler, DirectorySink},
    config::TranscodeConfig,
    job::{JobController, JobStatus},
    sink::archive_channel,
    source::ImageSource,
    testing::{corrupt_source, jpeg_source, png_bytes, rgba_pattern},
};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn mixed_job() -> Job {
    Job::new(
        vec![
            jpeg_source("one.jpg", 200, 100),
            jpeg_source("two.jpeg", 50, 50),
            corrupt_source("broken.jpg"),
            ImageSource::from_bytes("three.png", png_bytes(&rgba_pattern(80, 40))).unwrap(),
            jpeg_source("four.jpg", 30, 60),
        ],
        TranscodeConfig::new(100, 75, 75).unwrap(),
    )
}

fn entry_names(archive: Vec<u8>) -> Vec<String> {
    let archive = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_partial_batch_into_archive() {
    let mut job = mixed_job();
    let run = JobController::new(2).launch(&mut job).unwrap();
    let out = SharedBuf::default();

    let mut seen = Vec::new();
    let stats = Pipe::new(ArchiveAssembler::new(out.clone()))
        .deliver(&mut job, run, |outcome| seen.push(outcome.filename.clone()))
        .await
        .unwrap();

    assert_eq!(seen.len(), 5);
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(
        entry_names(out.bytes()),
        vec![
            "four.jpg",
            "four.webp",
            "one.jpg",
            "one.webp",
            "three.png",
            "three.webp",
            "two.jpeg",
            "two.webp",
        ]
    );
}

#[tokio::test]
async fn test_shared_stem_yields_two_entries_each() {
    let mut job = Job::new(
        vec![
            jpeg_source("photo.jpg", 40, 30),
            ImageSource::from_bytes("photo.png", png_bytes(&rgba_pattern(40, 30))).unwrap(),
        ],
        TranscodeConfig::default(),
    );
    let run = JobController::new(2).launch(&mut job).unwrap();
    let out = SharedBuf::default();

    let stats = Pipe::new(ArchiveAssembler::new(out.clone()))
        .deliver(&mut job, run, |_| {})
        .await
        .unwrap();

    assert_eq!(stats.succeeded, 2);
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(
        entry_names(out.bytes()),
        vec!["photo-1.png", "photo-1.webp", "photo.jpg", "photo.webp"]
    );
}

#[tokio::test]
async fn test_archive_streams_through_channel() {
    let mut job = mixed_job();
    let run = JobController::new(3).launch(&mut job).unwrap();
    let (writer, body) = archive_channel(2);

    let deliver = tokio::spawn(async move {
        let stats = Pipe::new(ArchiveAssembler::new(writer))
            .deliver(&mut job, run, |_| {})
            .await;
        (job, stats)
    });

    let chunks: Vec<_> = futures::StreamExt::collect(body).await;
    let (job, stats) = deliver.await.unwrap();
    stats.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);

    let archive: Vec<u8> = chunks
        .into_iter()
        .flat_map(|c| c.unwrap().to_vec())
        .collect();
    assert_eq!(entry_names(archive).len(), 8);
}

#[tokio::test]
async fn test_directory_sink_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = mixed_job();
    let run = JobController::new(2).launch(&mut job).unwrap();

    Pipe::new(DirectorySink::new(dir.path()))
        .deliver(&mut job, run, |_| {})
        .await
        .unwrap();

    assert!(dir.path().join("one.jpg").is_file());
    assert!(dir.path().join("three.webp").is_file());
    assert!(!dir.path().join("broken.jpg").exists());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_sink_failure_fails_job() {
    let mut job = mixed_job();
    let run = JobController::new(2).launch(&mut job).unwrap();

    let err = Pipe::new(ArchiveAssembler::new(FailingWriter))
        .deliver(&mut job, run, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Archive(_)));
    assert_eq!(job.status(), JobStatus::Failed);
}

#[tokio::test]
async fn test_consumer_gone_fails_job() {
    let mut job = mixed_job();
    let run = JobController::new(2).launch(&mut job).unwrap();
    let (writer, body) = archive_channel(1);
    drop(body);

    let err = Pipe::new(ArchiveAssembler::new(writer))
        .deliver(&mut job, run, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Archive(_)));
    assert_eq!(job.status(), JobStatus::Failed);
}

#[tokio::test]
async fn test_all_sources_failed_is_empty() {
    let mut job = Job::new(
        vec![corrupt_source("a.jpg"), corrupt_source("b.jpg")],
        TranscodeConfig::default(),
    );
    let run = JobController::new(2).launch(&mut job).unwrap();
    let out = SharedBuf::default();

    let err = Pipe::new(ArchiveAssembler::new(out.clone()))
        .deliver(&mut job, run, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Archive(ArchiveError::Empty)));
    assert_eq!(job.stats().failed, 2);
    assert!(out.bytes().is_empty());
}

#[tokio::test]
async fn test_cancelled_pipe_fails_job() {
    let mut job = mixed_job();
    let run = JobController::new(1).launch(&mut job).unwrap();
    let pipe = Pipe::new(ArchiveAssembler::new(SharedBuf::default()));
    pipe.cancel();
    assert!(pipe.is_cancelled());

    let err = pipe.deliver(&mut job, run, |_| {}).await.unwrap_err();
    assert!(matches!(err, JobError::Cancelled));
    assert_eq!(job.status(), JobStatus::Failed);
}

#[tokio::test]
async fn test_shutdown_token_cancels_delivery() {
    let shutdown = CancellationToken::new();
    let mut job = mixed_job();
    let run = JobController::new(1).launch(&mut job).unwrap();
    let pipe = Pipe::new(ArchiveAssembler::new(SharedBuf::default()))
        .with_cancel(shutdown.child_token());
    assert!(!pipe.is_cancelled());

    shutdown.cancel();
    assert!(pipe.is_cancelled());
    let err = pipe.deliver(&mut job, run, |_| {}).await.unwrap_err();
    assert!(matches!(err, JobError::Cancelled));
    assert_eq!(job.status(), JobStatus::Failed);
}
