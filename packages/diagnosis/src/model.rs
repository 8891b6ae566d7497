//! # Classifier Backends
//! The prediction pipeline only needs raw class scores for one input tensor.
//! [`OnnxClassifier`] provides them from an ONNX Runtime session.

use crate::error::{DiagnosisError, DiagnosisResult};
use ndarray::{Array4, ArrayD};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Instant;

/// Something that turns a `[1, 3, 224, 224]` tensor into raw class scores.
pub trait Classifier: Send + Sync {
    /// Compute device the model runs on, e.g. `cpu` or `cuda`.
    fn device(&self) -> &str;

    /// Run one forward pass. Every output of the graph is returned in
    /// declaration order.
    fn forward(&self, input: Array4<f32>) -> DiagnosisResult<Vec<ArrayD<f32>>>;
}

/// ONNX Runtime backed classifier
pub struct OnnxClassifier {
    session: Mutex<Session>,
    device: String,
}

impl OnnxClassifier {
    /// Load the model artifact at `path`.
    ///
    /// Fails with [`DiagnosisError::ModelNotFound`] when the file is missing and
    /// with [`DiagnosisError::ModelLoad`] when it is not a loadable ONNX graph.
    pub fn load(path: &Path) -> DiagnosisResult<Self> {
        if !path.exists() {
            return Err(DiagnosisError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let start = Instant::now();
        let device = select_device();
        let session = build_session(path, device).map_err(|e| DiagnosisError::ModelLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        tracing::info!(
            "Model loaded from {} on {} in {:.2}ms. Inputs: {:?}, Outputs: {:?}",
            path.display(),
            device,
            start.elapsed().as_secs_f64() * 1000.0,
            input_names,
            output_names
        );

        Ok(Self {
            session: Mutex::new(session),
            device: device.to_string(),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn device(&self) -> &str {
        &self.device
    }

    fn forward(&self, input: Array4<f32>) -> DiagnosisResult<Vec<ArrayD<f32>>> {
        let value = Tensor::from_array(input)?;
        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![value])?;

        let mut results = Vec::new();
        for (_, tensor) in outputs.iter() {
            let array = tensor.try_extract_array::<f32>()?;
            results.push(array.to_owned());
        }
        Ok(results)
    }
}

fn build_session(path: &Path, device: &str) -> ort::Result<Session> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    let builder = register_device(builder, device)?;
    builder.commit_from_file(path)
}

/// Prefer CUDA when it is compiled in and usable, otherwise run on CPU.
#[cfg(feature = "cuda")]
fn select_device() -> &'static str {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => {
            tracing::info!("CUDA execution provider available");
            "cuda"
        }
        _ => {
            tracing::warn!("CUDA feature enabled but runtime not available, using CPU");
            "cpu"
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn select_device() -> &'static str {
    tracing::info!("No GPU acceleration compiled in, using CPU");
    "cpu"
}

#[cfg(feature = "cuda")]
fn register_device(
    builder: ort::session::builder::SessionBuilder,
    device: &str,
) -> ort::Result<ort::session::builder::SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;

    if device == "cuda" {
        builder.with_execution_providers([CUDAExecutionProvider::default().build()])
    } else {
        Ok(builder)
    }
}

#[cfg(not(feature = "cuda"))]
fn register_device(
    builder: ort::session::builder::SessionBuilder,
    _device: &str,
) -> ort::Result<ort::session::builder::SessionBuilder> {
    Ok(builder)
}
