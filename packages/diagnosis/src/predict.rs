use crate::advisory::Advisory;
use crate::classes::ClassNames;
use crate::error::{DiagnosisError, DiagnosisResult};
use crate::model::Classifier;
use crate::preprocess;
use crate::types::{PredictionResponse, Severity, round2};
use ndarray::{Array2, ArrayD, ArrayView1, Axis, Ix2};
use std::sync::Arc;
use std::time::Instant;

/// Runs the full image → diagnosis pipeline against a loaded classifier.
#[derive(Clone)]
pub struct Predictor {
    classifier: Arc<dyn Classifier>,
    classes: Arc<ClassNames>,
}

impl Predictor {
    pub fn new(classifier: Arc<dyn Classifier>, classes: Arc<ClassNames>) -> Self {
        Self {
            classifier,
            classes,
        }
    }

    pub fn device(&self) -> &str {
        self.classifier.device()
    }

    pub fn classes(&self) -> &Arc<ClassNames> {
        &self.classes
    }

    /// Diagnose one uploaded image.
    ///
    /// Blocking: decoding and the forward pass run on the calling thread.
    pub fn predict(&self, image_bytes: &[u8]) -> DiagnosisResult<PredictionResponse> {
        let input = preprocess::image_to_tensor(image_bytes)?;

        let start = Instant::now();
        let outputs = self.classifier.forward(input)?;
        let scores = first_output_as_batch(outputs)?;
        let (index, probability) = top1(scores.row(0))?;
        let inference_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

        let label = self.classes.resolve(index);
        let confidence = round2(probability as f64 * 100.0);
        let severity = Severity::from_probability(probability as f64);
        let advisory = Advisory::for_label(&label);

        tracing::debug!(
            label = %label,
            confidence,
            %severity,
            inference_ms,
            "Prediction complete"
        );
        metrics::counter!("predictions_total", "severity" => severity.as_str()).increment(1);
        metrics::histogram!("inference_duration_ms").record(inference_ms);

        Ok(PredictionResponse {
            disease: label,
            confidence,
            severity,
            description: advisory.description.into_owned(),
            treatment: advisory.treatment,
            prevention: advisory.prevention,
            inference_ms,
        })
    }
}

/// Keep only the first graph output and make sure it is `[batch, classes]`.
///
/// Further outputs are ignored.
fn first_output_as_batch(outputs: Vec<ArrayD<f32>>) -> DiagnosisResult<Array2<f32>> {
    let first = outputs
        .into_iter()
        .next()
        .ok_or_else(|| DiagnosisError::Inference("Model produced no outputs".to_string()))?;

    let first = if first.ndim() == 1 {
        first.insert_axis(Axis(0))
    } else {
        first
    };

    let shape = first.shape().to_vec();
    let scores = first.into_dimensionality::<Ix2>().map_err(|_| {
        DiagnosisError::Inference(format!(
            "Expected class scores shaped [batch, classes], got {:?}",
            shape
        ))
    })?;

    if scores.nrows() == 0 || scores.ncols() == 0 {
        return Err(DiagnosisError::Inference(format!(
            "Model produced an empty score tensor {:?}",
            shape
        )));
    }
    Ok(scores)
}

/// Numerically stable softmax over one row of raw scores.
pub fn softmax(logits: ArrayView1<f32>) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Index and probability of the most likely class. Ties keep the lowest index.
fn top1(logits: ArrayView1<f32>) -> DiagnosisResult<(usize, f32)> {
    let probs = softmax(logits);
    if !probs.iter().all(|p| p.is_finite()) {
        return Err(DiagnosisError::Inference(
            "Model produced non-finite scores".to_string(),
        ));
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        if best.is_none_or(|(_, best_prob)| p > best_prob) {
            best = Some((i, p));
        }
    }
    best.ok_or_else(|| DiagnosisError::Inference("Model produced no class scores".to_string()))
}
