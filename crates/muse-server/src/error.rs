use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use muse_engine::error_chain_text;

const ERROR_BODY_MAX_CHARS: usize = 2000;

/// Request failure. Validation problems answer with a JSON `{"error"}` body;
/// everything else is a 500 with the error chain as plain text.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Backend(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(message) => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Backend(err) => {
                let text = error_chain_text(&err, ERROR_BODY_MAX_CHARS);
                tracing::error!(error = %text, "request failed");
                (status, text).into_response()
            }
            ApiError::Task(err) => {
                let text = format!("blocking task failed: {err}");
                tracing::error!(error = %text, "request failed");
                (status, text).into_response()
            }
        }
    }
}
