//! Crop Doctor
//!
//! Plant disease detection behind a small HTTP surface. An uploaded leaf image
//! is decoded, turned into a fixed `[1, 3, 224, 224]` tensor, classified by a
//! pretrained ONNX model and answered with a diagnosis:
//!
//! - the disease label and its softmax confidence
//! - a coarse severity tier derived from that confidence
//! - description, treatment and prevention advice from a static table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crop_doctor::{diagnosis_router, DiagnosisState, ServiceConfig};
//!
//! let config = ServiceConfig::from_env()?;
//! let state = DiagnosisState::load(config)?;
//! let app = diagnosis_router(state);
//! ```

pub mod advisory;
pub mod classes;
pub mod config;
pub mod error;
pub mod model;
pub mod predict;
pub mod preprocess;
pub mod router;
pub mod types;

pub use classes::ClassNames;
pub use config::{ConfigError, ServiceConfig};
pub use error::DiagnosisError;
pub use model::{Classifier, OnnxClassifier};
pub use predict::Predictor;
pub use router::{DiagnosisState, diagnosis_router};
pub use types::{HealthResponse, PredictionResponse, Severity};
