use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    path::Path,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    config::TranscodeConfig,
    error::{JobError, TranscodeError},
    source::ImageSource,
    transcoder::{TranscodeResult, transcode, webp_name},
};

/// Collision-resistant job identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Input bytes of the successfully processed sources.
    pub original_bytes: u64,
    /// Optimized-original bytes (WebP not included).
    pub optimized_bytes: u64,
    pub webp_bytes: u64,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobStats {
    /// `(original - optimized) / original`, or `None` when nothing was processed.
    pub fn savings_ratio(&self) -> Option<f64> {
        savings_ratio(self.original_bytes, self.optimized_bytes)
    }

    pub fn settled(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub fn savings_ratio(original: u64, optimized: u64) -> Option<f64> {
    if original == 0 {
        return None;
    }
    Some((original as f64 - optimized as f64) / original as f64)
}

#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub filename: String,
    pub reason: String,
}

/// One batch: sources, one validated config, status and counters.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    sources: Arc<[ImageSource]>,
    config: TranscodeConfig,
    status: JobStatus,
    stats: JobStats,
    failures: Vec<SourceFailure>,
}

impl Job {
    /// Later sources whose filename or `.webp` name is already taken are
    /// renamed `stem-N.ext`.
    pub fn new(sources: Vec<ImageSource>, config: TranscodeConfig) -> Self {
        Self {
            id: JobId::new(),
            sources: dedupe_names(sources).into(),
            config,
            status: JobStatus::Pending,
            stats: JobStats::default(),
            failures: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn sources(&self) -> &[ImageSource] {
        &self.sources
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    /// Completed with at least one source failure.
    pub fn is_partial(&self) -> bool {
        self.status == JobStatus::Completed && self.stats.failed > 0
    }

    /// Fold one settled source into the counters.
    pub fn record(&mut self, outcome: &Outcome) {
        match &outcome.result {
            Ok(result) => {
                self.stats.original_bytes += outcome.original_size;
                self.stats.optimized_bytes += result.optimized_len();
                self.stats.webp_bytes += result.webp_len();
                self.stats.succeeded += 1;
            }
            Err(e) => {
                self.stats.failed += 1;
                self.failures.push(SourceFailure {
                    filename: outcome.filename.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Pending {
            return Err(JobError::AlreadyLaunched(self.id.to_string()));
        }
        self.status = JobStatus::Running;
        Ok(())
    }

    pub(crate) fn complete(&mut self) {
        self.status = JobStatus::Completed;
    }

    pub(crate) fn fail(&mut self) {
        self.status = JobStatus::Failed;
    }
}

/// A name is taken when either archive entry it produces (the name itself or
/// its `.webp` sibling) is already claimed by an earlier source.
fn dedupe_names(sources: Vec<ImageSource>) -> Vec<ImageSource> {
    fn is_free(taken: &HashSet<String>, name: &str) -> bool {
        !taken.contains(name) && !taken.contains(&webp_name(name))
    }

    let mut taken = HashSet::new();
    sources
        .into_iter()
        .map(|source| {
            let name = if is_free(&taken, source.filename()) {
                source.filename().to_string()
            } else {
                let path = Path::new(source.filename());
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let ext = path
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                (1..)
                    .map(|n| format!("{}-{}.{}", stem, n, ext))
                    .find(|candidate| is_free(&taken, candidate))
                    .unwrap_or_default()
            };
            taken.insert(webp_name(&name));
            taken.insert(name.clone());
            if name == source.filename() {
                source
            } else {
                source.renamed(name)
            }
        })
        .collect()
}

/// One settled source.
#[derive(Debug)]
pub struct Outcome {
    /// Position of the source in the job.
    pub index: usize,
    pub filename: String,
    pub original_size: u64,
    pub result: Result<TranscodeResult, TranscodeError>,
}

/// Result of [`JobController::run_to_completion`].
#[derive(Debug, Default)]
pub struct JobReport {
    pub results: Vec<(String, TranscodeResult)>,
    pub failures: Vec<SourceFailure>,
    pub stats: JobStats,
}

/// Runs the sources of a job through the transcoder with bounded concurrency.
#[derive(Debug, Clone)]
pub struct JobController {
    concurrency: usize,
}

impl JobController {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(n)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start transcoding and return the stream of outcomes in completion
    /// order. The job moves to running.
    pub fn launch(&self, job: &mut Job) -> Result<JobRun, JobError> {
        job.start()?;
        log::info!(
            "job {}: launching {} sources ({}), concurrency {}",
            job.id(),
            job.sources().len(),
            job.config(),
            self.concurrency
        );

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.concurrency);
        let producer = tokio::spawn(produce(
            job.id().clone(),
            Arc::clone(&job.sources),
            *job.config(),
            Arc::new(Semaphore::new(self.concurrency)),
            tx,
            cancel.clone(),
        ));

        Ok(JobRun {
            rx,
            producer: Some(producer),
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        })
    }

    /// Run every source and collect results and failures. Per-source failures
    /// never abort the batch.
    pub async fn run_to_completion(&self, job: &mut Job) -> Result<JobReport, JobError> {
        let mut run = self.launch(job)?;
        let mut report = JobReport::default();
        while let Some(outcome) = run.next_outcome().await {
            job.record(&outcome);
            match outcome.result {
                Ok(result) => report.results.push((outcome.filename, result)),
                Err(e) => {
                    log::warn!("job {}: {} failed: {}", job.id(), outcome.filename, e);
                }
            }
        }
        run.shutdown().await;
        job.complete();

        report.failures = job.failures().to_vec();
        report.stats = *job.stats();
        Ok(report)
    }
}

/// Launches one blocking transcode per source. A permit is held from before
/// the read until the outcome is queued, so a slow consumer stops new decodes.
async fn produce(
    job_id: JobId,
    sources: Arc<[ImageSource]>,
    config: TranscodeConfig,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) {
    let mut tasks = JoinSet::new();
    for (index, source) in sources.iter().cloned().enumerate() {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let filename = source.filename().to_string();
            let original_size = source.size();
            let result = tokio::task::spawn_blocking(move || transcode(&source, &config))
                .await
                .unwrap_or_else(|e| Err(TranscodeError::Aborted(e.to_string())));

            let outcome = Outcome {
                index,
                filename,
                original_size,
                result,
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                sent = tx.send(outcome) => {
                    if sent.is_err() {
                        cancel.cancel();
                    }
                }
            }
            drop(permit);
        });
    }
    drop(tx);

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            log::error!("job {}: transcode task failed: {}", job_id, e);
        }
    }
    log::debug!("job {}: all transcodes settled", job_id);
}

/// Outcomes of a launched job. Dropping it cancels the remaining work;
/// [`JobRun::shutdown`] also waits for in-flight transcodes to settle.
pub struct JobRun {
    rx: mpsc::Receiver<Outcome>,
    producer: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl JobRun {
    pub async fn next_outcome(&mut self) -> Option<Outcome> {
        self.rx.recv().await
    }

    /// Stop launching new transcodes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel anything not yet started and wait until every launched
    /// transcode has settled.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.await {
                log::error!("job producer failed: {}", e);
            }
        }
    }
}

impl Stream for JobRun {
    type Item = Outcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
#[path = "job_test.rs"]
mod job_test;
