//! HTTP level tests for the diagnosis router
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`. A stub
//! classifier stands in for the ONNX model so no artifact is needed.
//!
//! Run: cargo test --package crop-doctor --test router_tests

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use crop_doctor::error::DiagnosisResult;
use crop_doctor::{
    ClassNames, Classifier, DiagnosisState, HealthResponse, PredictionResponse, ServiceConfig,
    diagnosis_router,
};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, Array4, ArrayD, arr2};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

const BOUNDARY: &str = "crop-doctor-test-boundary";

/// Returns the same scores for every image and counts how often it ran.
struct StubClassifier {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl StubClassifier {
    fn new(scores: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            scores,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Classifier for StubClassifier {
    fn device(&self) -> &str {
        "cpu"
    }

    fn forward(&self, input: Array4<f32>) -> DiagnosisResult<Vec<ArrayD<f32>>> {
        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.scores.len();
        let scores = Array2::from_shape_vec((1, n), self.scores.clone()).unwrap();
        Ok(vec![scores.into_dyn(), arr2(&[[0.0f32]]).into_dyn()])
    }
}

fn config() -> ServiceConfig {
    ServiceConfig {
        max_image_size_mb: 1.0,
        ..Default::default()
    }
}

fn app_with(classifier: Arc<StubClassifier>, config: ServiceConfig) -> Router {
    let state = DiagnosisState::with_classifier(config, classifier, ClassNames::default());
    diagnosis_router(state)
}

fn leaf_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, 140, (y * 3 % 256) as u8])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Build a multipart/form-data body from `(name, filename, bytes)` parts.
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_model_device_and_classes() {
        let app = app_with(StubClassifier::new(vec![1.0, 0.0]), config());
        let request = Request::get("/api/disease/health")
            .body(Body::empty())
            .unwrap();

        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(json).unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.model_loaded);
        assert_eq!(health.device, "cpu");
        assert_eq!(
            health.classes,
            vec!["leaf_rust", "powdery_mildew", "early_blight", "late_blight", "healthy"]
        );
    }

    #[tokio::test]
    async fn unloaded_state_reports_not_loaded() {
        let app = diagnosis_router(DiagnosisState::unloaded(config()));
        let request = Request::get("/api/disease/health")
            .body(Body::empty())
            .unwrap();

        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model_loaded"], false);
    }

    #[tokio::test]
    async fn custom_prefix_is_honoured() {
        let config = ServiceConfig {
            api_prefix: "plants/".to_string(),
            ..config()
        };
        let app = app_with(StubClassifier::new(vec![1.0]), config);

        let ok = Request::get("/plants/health").body(Body::empty()).unwrap();
        assert_eq!(send(app.clone(), ok).await.0, StatusCode::OK);

        let old = Request::get("/api/disease/health")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(app, old).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_prefix_mounts_at_root() {
        let config = ServiceConfig {
            api_prefix: "/".to_string(),
            ..config()
        };
        let app = app_with(StubClassifier::new(vec![1.0]), config);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(send(app, request).await.0, StatusCode::OK);
    }
}

mod predict {
    use super::*;

    #[tokio::test]
    async fn returns_full_diagnosis() {
        let stub = StubClassifier::new(vec![5.0, 0.0, 0.0, 0.0, 0.0]);
        let app = app_with(stub.clone(), config());
        let png = leaf_png(300, 200);
        let body = multipart_body(&[("file", Some("leaf.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::OK, "{json}");

        let response: PredictionResponse = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(response.disease, "leaf_rust");
        assert!((0.0..=100.0).contains(&response.confidence));
        assert_eq!(json["severity"], "high");
        assert!(response.description.starts_with("Fungal disease"));
        assert_eq!(response.treatment.len(), 4);
        assert_eq!(response.prevention.len(), 4);
        assert!(json["inference_ms"].is_f64() || json["inference_ms"].is_u64());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn crop_type_is_appended_to_description() {
        let app = app_with(StubClassifier::new(vec![5.0, 0.0]), config());
        let png = leaf_png(64, 64);
        let body = multipart_body(&[
            ("file", Some("leaf.png"), png.as_slice()),
            ("crop_type", None, b"Wheat".as_slice()),
        ]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::OK);
        let description = json["description"].as_str().unwrap();
        assert!(description.starts_with("Fungal disease"));
        assert!(description.ends_with(" | Crop: Wheat"));
    }

    #[tokio::test]
    async fn empty_crop_type_leaves_description() {
        let app = app_with(StubClassifier::new(vec![0.0, 5.0]), config());
        let png = leaf_png(64, 64);
        let body = multipart_body(&[
            ("file", Some("leaf.png"), png.as_slice()),
            ("crop_type", None, b"".as_slice()),
        ]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!json["description"].as_str().unwrap().contains("Crop:"));
    }

    #[tokio::test]
    async fn identical_uploads_give_identical_diagnoses() {
        let app = app_with(StubClassifier::new(vec![0.2, 1.4, 0.9, -0.3, 0.0]), config());
        let png = leaf_png(120, 90);

        let (_, first) = send(
            app.clone(),
            predict_request(
                "/api/disease/predict",
                multipart_body(&[("file", Some("a.png"), png.as_slice())]),
            ),
        )
        .await;
        let (_, second) = send(
            app,
            predict_request(
                "/api/disease/predict",
                multipart_body(&[("file", Some("a.png"), png.as_slice())]),
            ),
        )
        .await;

        assert_eq!(first["disease"], second["disease"]);
        assert_eq!(first["confidence"], second["confidence"]);
        assert_eq!(first["severity"], second["severity"]);
    }

    #[tokio::test]
    async fn unknown_index_grows_class_list() {
        let mut scores = vec![0.0f32; 8];
        scores[7] = 9.0;
        let classifier = StubClassifier::new(scores);
        let state =
            DiagnosisState::with_classifier(config(), classifier, ClassNames::default());
        let classes = state.classes().clone();
        let app = diagnosis_router(state);
        let png = leaf_png(32, 32);

        let (status, json) = send(
            app.clone(),
            predict_request(
                "/api/disease/predict",
                multipart_body(&[("file", Some("leaf.png"), png.as_slice())]),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["disease"], "class_7");
        assert_eq!(classes.len(), 8);

        let (_, health) = send(
            app,
            Request::get("/api/disease/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(health["classes"].as_array().unwrap().len(), 8);
        assert_eq!(health["classes"][5], "class_5");
    }

    #[tokio::test]
    async fn non_image_bytes_are_rejected_with_400() {
        let stub = StubClassifier::new(vec![1.0]);
        let app = app_with(stub.clone(), config());
        let garbage = b"\x00\x01random garbage\xff";
        let body = multipart_body(&[("file", Some("leaf.png"), garbage.as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Invalid image file");
        assert_eq!(json["code"], "INVALID_IMAGE");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn truncated_image_is_rejected_with_400() {
        let app = app_with(StubClassifier::new(vec![1.0]), config());
        let png = leaf_png(200, 200);
        let body = multipart_body(&[("file", Some("leaf.png"), &png[..png.len() / 3])]);

        let (status, _) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_decoding() {
        let stub = StubClassifier::new(vec![1.0]);
        let config = ServiceConfig {
            // 1 KiB
            max_image_size_mb: 1.0 / 1024.0,
            ..config()
        };
        let app = app_with(stub.clone(), config);
        let png = leaf_png(300, 300);
        assert!(png.len() > 1024);
        let body = multipart_body(&[("file", Some("leaf.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(json["detail"], "Image too large (>0.0009765625MB)");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_at_the_ceiling_is_accepted() {
        let png = leaf_png(16, 16);
        let config = ServiceConfig {
            max_image_size_mb: png.len() as f64 / (1024.0 * 1024.0),
            ..config()
        };
        let app = app_with(StubClassifier::new(vec![1.0, 0.0]), config);
        let body = multipart_body(&[("file", Some("leaf.png"), png.as_slice())]);

        let (status, _) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn garbage_far_beyond_the_ceiling_is_413_not_400() {
        let config = ServiceConfig {
            max_image_size_mb: 1.0 / 1024.0,
            ..config()
        };
        let app = app_with(StubClassifier::new(vec![1.0]), config);
        let junk = vec![0xAB; 256 * 1024];
        let body = multipart_body(&[("file", Some("leaf.png"), junk.as_slice())]);

        let (status, _) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn missing_file_is_unprocessable() {
        let app = app_with(StubClassifier::new(vec![1.0]), config());
        let body = multipart_body(&[("crop_type", None, b"Rice".as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["detail"], "Missing required form field: file");
    }

    #[tokio::test]
    async fn non_finite_scores_are_a_server_error() {
        let app = app_with(StubClassifier::new(vec![f32::NAN, 1.0, 0.0]), config());
        let png = leaf_png(32, 32);
        let body = multipart_body(&[("file", Some("leaf.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INFERENCE_ERROR");
        assert!(json.get("confidence").is_none());
    }

    #[tokio::test]
    async fn predict_without_model_is_a_server_error() {
        let app = diagnosis_router(DiagnosisState::unloaded(config()));
        let png = leaf_png(32, 32);
        let body = multipart_body(&[("file", Some("leaf.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request("/api/disease/predict", body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "MODEL_NOT_LOADED");
    }
}
