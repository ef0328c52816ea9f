use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use squeeze_engine::ValidationError;

pub mod optimize;

pub type ApiResult<T> = Result<T, ApiError>;

pub struct ApiError(anyhow::Error);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<ValidationError>().is_some()
            || self.0.downcast_ref::<MultipartError>().is_some()
        {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status == StatusCode::BAD_REQUEST {
            log::warn!("ApiError: {:#}", self.0);
            self.0.to_string()
        } else {
            log::error!("ApiError: {:?}", self.0);
            "image processing failed".to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
