use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures::StreamExt;
use squeeze_engine::{
    archive_channel,
    config::{DEFAULT_MAX_WIDTH, DEFAULT_QUALITY_JPG, DEFAULT_QUALITY_WEBP},
    source::{is_supported, sanitize_filename},
    ArchiveAssembler, ImageSource, Job, JobId, Pipe, ScratchDir, StageError, TranscodeConfig,
    ValidationError,
};

use crate::{
    api::AppState,
    handler::{ApiError, ApiResult},
};

pub const ARCHIVE_NAME: &str = "images-optimized.zip";
pub const JOB_ID_HEADER: &str = "x-job-id";

/// Body chunks queued between the zip writer and the connection.
const BODY_CHANNEL_CAPACITY: usize = 8;

pub fn optimize_router() -> Router<AppState> {
    Router::new().route("/optimize", post(optimize))
}

/// Non-file form fields. Absent or unparseable values fall back to defaults.
#[derive(Default)]
struct FormConfig {
    max_width: Option<i64>,
    quality_jpg: Option<i64>,
    quality_webp: Option<i64>,
}

impl FormConfig {
    fn set(&mut self, name: &str, value: &str) {
        let parsed = value.trim().parse::<i64>().ok();
        match name {
            "maxWidth" => self.max_width = parsed,
            "qualityJpg" => self.quality_jpg = parsed,
            "qualityWebp" => self.quality_webp = parsed,
            _ => log::debug!("ignoring form field {}", name),
        }
    }

    fn validate(&self) -> Result<TranscodeConfig, ValidationError> {
        TranscodeConfig::new(
            self.max_width.unwrap_or(i64::from(DEFAULT_MAX_WIDTH)),
            self.quality_jpg.unwrap_or(i64::from(DEFAULT_QUALITY_JPG)),
            self.quality_webp.unwrap_or(i64::from(DEFAULT_QUALITY_WEBP)),
        )
    }
}

async fn optimize(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let job_id = JobId::new();
    let mut scratch = ScratchDir::create(state.config.scratch_root(), &job_id).await?;
    let limit = state.config.max_upload_bytes();

    let mut form = FormConfig::default();
    let mut sources = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            let name = field.name().unwrap_or_default().to_string();
            let value = field.text().await?;
            form.set(&name, &value);
            continue;
        };

        let filename = sanitize_filename(&file_name)
            .filter(|name| is_supported(name))
            .ok_or(ValidationError::UnsupportedType(file_name))?;
        let staged = scratch
            .stage(&filename, field, limit)
            .await
            .map_err(stage_error)?;
        sources.push(ImageSource::from_path(&filename, staged.path, staged.size)?);
    }

    if sources.is_empty() {
        return Err(ValidationError::NoImages.into());
    }
    let config = form.validate()?;

    let mut job = Job::new(sources, config).with_id(job_id.clone());
    let run = state.controller.launch(&mut job)?;
    let (writer, mut body) = archive_channel(BODY_CHANNEL_CAPACITY);
    let signal = writer.abort_handle();

    let pipe = Pipe::new(ArchiveAssembler::new(writer)).with_cancel(state.shutdown.child_token());

    // Scratch is released before the body ends.
    let task_id = job_id.clone();
    state.tasks.spawn(async move {
        let result = pipe
            .deliver(&mut job, run, |outcome| {
                log::debug!("job {}: {} settled", task_id, outcome.filename);
            })
            .await;
        scratch.release().await;
        match result {
            Ok(stats) => {
                log::info!(
                    "job {} completed: {}/{} images optimized",
                    job.id(),
                    stats.succeeded,
                    stats.settled()
                );
                drop(signal);
            }
            Err(e) => signal.abort(e).await,
        }
    });

    let first = match body.next_chunk().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => return Err(anyhow::Error::new(e).context("archive failed").into()),
        None => return Err(anyhow::anyhow!("archive ended before any data").into()),
    };

    let stream = futures::stream::once(async move { Ok(first) }).chain(body);
    let disposition = format!("attachment; filename=\"{}\"", ARCHIVE_NAME);
    let mut response = (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
        response.headers_mut().insert(JOB_ID_HEADER, value);
    }
    Ok(response)
}

fn stage_error(err: StageError<MultipartError>) -> ApiError {
    match err {
        StageError::Source(e) => e.into(),
        StageError::Invalid(e) => e.into(),
        StageError::Io(e) => anyhow::Error::new(e).context("staging upload").into(),
    }
}

#[cfg(test)]
#[path = "optimize_test.rs"]
mod optimize_test;
