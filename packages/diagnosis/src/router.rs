//! Axum routes for the diagnosis service
//!
//! `GET <prefix>/health` and `POST <prefix>/predict`.

use crate::classes::ClassNames;
use crate::config::ServiceConfig;
use crate::error::{DiagnosisError, DiagnosisResult};
use crate::model::{Classifier, OnnxClassifier};
use crate::predict::Predictor;
use crate::types::{HealthResponse, PredictionResponse};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

/// Head room on top of the image ceiling for multipart boundaries, part
/// headers and the `crop_type` field.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared service state
#[derive(Clone)]
pub struct DiagnosisState {
    pub config: ServiceConfig,
    predictor: Option<Predictor>,
    classes: Arc<ClassNames>,
}

impl DiagnosisState {
    /// Load the model and its class names as configured.
    ///
    /// Any failure here is fatal: the service cannot answer predictions
    /// without a model.
    pub fn load(config: ServiceConfig) -> DiagnosisResult<Self> {
        tracing::info!("Loading model from {}", config.model_path.display());
        let classifier = OnnxClassifier::load(&config.model_path)?;
        let classes = ClassNames::load(config.class_names_path.as_deref())?;
        tracing::info!(
            "Model ready on {} with {} classes",
            classifier.device(),
            classes.len()
        );
        Ok(Self::with_classifier(config, Arc::new(classifier), classes))
    }

    /// State around an already constructed classifier.
    pub fn with_classifier(
        config: ServiceConfig,
        classifier: Arc<dyn Classifier>,
        classes: ClassNames,
    ) -> Self {
        let classes = Arc::new(classes);
        Self {
            config,
            predictor: Some(Predictor::new(classifier, classes.clone())),
            classes,
        }
    }

    /// State without a model. Health reports `model_loaded: false` and every
    /// prediction fails with [`DiagnosisError::ModelNotLoaded`].
    pub fn unloaded(config: ServiceConfig) -> Self {
        Self {
            config,
            predictor: None,
            classes: Arc::new(ClassNames::default()),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn device(&self) -> &str {
        self.predictor.as_ref().map_or("cpu", |p| p.device())
    }

    pub fn classes(&self) -> &Arc<ClassNames> {
        &self.classes
    }
}

/// Construct the diagnosis router, mounted under the configured prefix.
pub fn diagnosis_router(state: DiagnosisState) -> Router {
    let prefix = state.config.normalized_prefix();
    let body_limit = state.config.max_upload_bytes() + MULTIPART_OVERHEAD;

    let routes = Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state));

    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    }
}

async fn health(State(state): State<Arc<DiagnosisState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.model_loaded(),
        device: state.device().to_string(),
        classes: state.classes.snapshot(),
    })
}

#[derive(Default)]
struct PredictForm {
    file: Option<Vec<u8>>,
    crop_type: Option<String>,
}

/// Diagnose an uploaded leaf image
///
/// POST /predict (multipart: `file`, optional `crop_type`)
async fn predict(
    State(state): State<Arc<DiagnosisState>>,
    multipart: Multipart,
) -> DiagnosisResult<Json<PredictionResponse>> {
    let limit_mb = state.config.max_image_size_mb;
    let form = read_form(multipart, limit_mb).await?;
    let content = form.file.ok_or(DiagnosisError::MissingField("file"))?;

    if content.len() > state.config.max_upload_bytes() {
        return Err(DiagnosisError::PayloadTooLarge { limit_mb });
    }

    let predictor = state
        .predictor
        .clone()
        .ok_or(DiagnosisError::ModelNotLoaded)?;

    let response = tokio::task::spawn_blocking(move || predictor.predict(&content))
        .await
        .map_err(|e| DiagnosisError::Inference(format!("Inference task join error: {}", e)))??;

    Ok(Json(response.with_crop_type(form.crop_type.as_deref())))
}

async fn read_form(mut multipart: Multipart, limit_mb: f64) -> DiagnosisResult<PredictForm> {
    let to_error = |err: MultipartError| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            DiagnosisError::PayloadTooLarge { limit_mb }
        } else {
            DiagnosisError::BadRequest(err.body_text())
        }
    };

    let mut form = PredictForm::default();
    while let Some(field) = multipart.next_field().await.map_err(to_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                form.file = Some(field.bytes().await.map_err(to_error)?.to_vec());
            }
            Some("crop_type") => {
                form.crop_type = Some(field.text().await.map_err(to_error)?);
            }
            _ => {}
        }
    }
    Ok(form)
}
