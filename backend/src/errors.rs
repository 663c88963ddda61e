use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use vacc_zk::groth16::ZkError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Zk(#[from] ZkError),

    #[error("publish rejected on {subject}: {reason}")]
    Publish { subject: String, reason: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl NodeError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        NodeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            NodeError::Publish { .. } => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}
