use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_protocol::{ApiResponse, STATUS_FAILED, STATUS_NOT_FOUND};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("url not find")]
    MissingUrl,

    #[error("request an unknown uri: {0}")]
    UnknownUri(String),

    #[error("unsupported method")]
    UnsupportedMethod,

    #[error("{0}")]
    InvalidQuery(#[from] QueryRejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::MissingUrl => (StatusCode::NOT_FOUND, STATUS_NOT_FOUND),
            AppError::UnknownUri(_) => (StatusCode::BAD_REQUEST, STATUS_FAILED),
            AppError::UnsupportedMethod => (StatusCode::NOT_IMPLEMENTED, STATUS_FAILED),
            AppError::InvalidQuery(rejection) => {
                tracing::debug!("Rejected query: {}", rejection.body_text());
                (StatusCode::BAD_REQUEST, STATUS_FAILED)
            }
        };

        let body = Json(ApiResponse::<String>::with_status(code, self.to_string()));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
