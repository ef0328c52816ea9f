use tokio_util::sync::CancellationToken;

use crate::{
    archive::{ArchiveEntry, EntrySink},
    error::{ArchiveError, JobError},
    job::{Job, JobRun, JobStats, Outcome},
};

/// Pipe: moves the outcomes of a running job into a sink, one at a time and
/// in completion order, then finishes the sink.
pub struct Pipe<S: EntrySink> {
    sink: Option<S>,
    cancel: CancellationToken,
}

impl<S: EntrySink> Pipe<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Some(sink),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop delivery and fail the job at the next outcome boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Also stop when `cancel` fires, e.g. a child of the server shutdown token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `run` to the end. Failed sources are recorded and skipped;
    /// a sink failure stops outstanding work and fails the job.
    pub async fn deliver<F>(
        mut self,
        job: &mut Job,
        mut run: JobRun,
        mut observer: F,
    ) -> Result<JobStats, JobError>
    where
        F: FnMut(&Outcome),
    {
        log::info!("Pipe: job {} delivering", job.id());

        let result = loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Err(JobError::Cancelled),
                outcome = run.next_outcome() => outcome,
            };
            let Some(outcome) = outcome else {
                break self.finish().await.map_err(JobError::from);
            };

            job.record(&outcome);
            observer(&outcome);
            match outcome.result {
                Ok(result) => {
                    let entries = result.into_entries(&outcome.filename);
                    if let Err(e) = self.append(entries).await {
                        break Err(e.into());
                    }
                }
                Err(e) => {
                    log::warn!("Pipe: job {} skipped {}: {}", job.id(), outcome.filename, e);
                }
            }
        };

        match result {
            Ok(()) => {
                run.shutdown().await;
                job.complete();
                log::info!(
                    "Pipe: job {} completed, {} succeeded, {} failed",
                    job.id(),
                    job.stats().succeeded,
                    job.stats().failed
                );
                Ok(*job.stats())
            }
            Err(e) => {
                run.shutdown().await;
                job.fail();
                log::error!("Pipe: job {} failed: {}", job.id(), e);
                Err(e)
            }
        }
    }

    async fn append(&mut self, entries: [ArchiveEntry; 2]) -> Result<(), ArchiveError> {
        self.with_sink(move |sink| entries.iter().try_for_each(|entry| sink.append(entry)))
            .await
    }

    async fn finish(&mut self) -> Result<(), ArchiveError> {
        self.with_sink(|sink| sink.finish()).await
    }

    /// Runs `f` against the sink on a blocking thread.
    async fn with_sink<F>(&mut self, f: F) -> Result<(), ArchiveError>
    where
        F: FnOnce(&mut S) -> Result<(), ArchiveError> + Send + 'static,
    {
        let mut sink = self.sink.take().ok_or(ArchiveError::Finished)?;
        let (sink, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut sink);
            (sink, result)
        })
        .await
        .map_err(|e| ArchiveError::Io(std::io::Error::other(e.to_string())))?;
        self.sink = Some(sink);
        result
    }
}

/// Deliver `run` into `sink` with a fresh [`Pipe`].
pub async fn deliver<S, F>(
    job: &mut Job,
    run: JobRun,
    sink: S,
    observer: F,
) -> Result<JobStats, JobError>
where
    S: EntrySink,
    F: FnMut(&Outcome),
{
    Pipe::new(sink).deliver(job, run, observer).await
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
