use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;

pub type DiagnosisResult<T> = Result<T, DiagnosisError>;

/// Errors raised while loading the model or serving a diagnosis
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    /// The configured model artifact does not exist
    #[error("Model file not found at {}", .path.display())]
    ModelNotFound { path: PathBuf },

    /// The artifact exists but could not be turned into an inference session
    #[error(
        "Unable to load model from {}. Please export the model as ONNX \
         (e.g. torch.onnx.export) so it can be loaded without its training code: {message}",
        .path.display()
    )]
    ModelLoad { path: PathBuf, message: String },

    /// The class names file exists but could not be read
    #[error("Unable to read class names from {}: {source}", .path.display())]
    ClassNames {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image file")]
    InvalidImage,

    #[error("Image too large (>{limit_mb:?}MB)")]
    PayloadTooLarge { limit_mb: f64 },

    #[error("Missing required form field: {0}")]
    MissingField(&'static str),

    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Inference error: {0}")]
    Inference(String),
}

impl DiagnosisError {
    pub fn status(&self) -> StatusCode {
        match self {
            DiagnosisError::InvalidImage | DiagnosisError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            DiagnosisError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DiagnosisError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DiagnosisError::ModelNotFound { .. }
            | DiagnosisError::ModelLoad { .. }
            | DiagnosisError::ClassNames { .. }
            | DiagnosisError::ModelNotLoaded
            | DiagnosisError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DiagnosisError::ModelNotFound { .. } | DiagnosisError::ModelLoad { .. } => {
                "MODEL_UNAVAILABLE"
            }
            DiagnosisError::ClassNames { .. } => "CLASS_NAMES_UNAVAILABLE",
            DiagnosisError::InvalidImage => "INVALID_IMAGE",
            DiagnosisError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            DiagnosisError::MissingField(_) => "UNPROCESSABLE_ENTITY",
            DiagnosisError::BadRequest(_) => "BAD_REQUEST",
            DiagnosisError::ModelNotLoaded => "MODEL_NOT_LOADED",
            DiagnosisError::Inference(_) => "INFERENCE_ERROR",
        }
    }
}

impl From<ort::Error> for DiagnosisError {
    fn from(err: ort::Error) -> Self {
        DiagnosisError::Inference(format!("ORT error: {}", err))
    }
}

impl From<ndarray::ShapeError> for DiagnosisError {
    fn from(err: ndarray::ShapeError) -> Self {
        DiagnosisError::Inference(format!("Shape error: {}", err))
    }
}

impl IntoResponse for DiagnosisError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            detail: String,
        }

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Internal error: {}", self);
        } else {
            tracing::warn!(code = self.code(), "Rejected request: {}", self);
        }

        // Server side details stay in the logs.
        let detail = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorBody {
                code: self.code(),
                detail,
            }),
        )
            .into_response()
    }
}
