use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use panorama::domain::{validation::ValidationError, DataAccessError};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// リクエスト本文を取り出せなかった
    Rejected(StatusCode, String),
    NotFound(&'static str),
    Unauthorized(&'static str),
    TooManyRequests,
    /// ストア障害。メッセージはクライアントに返す文言
    Internal(&'static str),
}

impl ApiError {
    /// ストア障害を変換する。詳細はログにのみ出す
    pub fn storage(context: &'static str, not_found: &'static str, e: DataAccessError) -> Self {
        if e.is_not_found() {
            return ApiError::NotFound(not_found);
        }
        error!("{}: {}", context, e);
        ApiError::Internal(context)
    }

    /// 未検出を返さない操作用
    pub fn internal(context: &'static str) -> impl FnOnce(DataAccessError) -> Self {
        move |e| {
            error!("{}: {}", context, e);
            ApiError::Internal(context)
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Rejected(status, message) => (status, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_owned()),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_owned()),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.".to_owned(),
            ),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.to_owned()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
