use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse, confidence derived tier shown next to a diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub const HIGH_THRESHOLD: f64 = 0.80;
    pub const MEDIUM_THRESHOLD: f64 = 0.55;

    /// Tier for the raw softmax probability in `[0, 1]`. Lower bounds are
    /// inclusive.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= Self::HIGH_THRESHOLD {
            Severity::High
        } else if probability >= Self::MEDIUM_THRESHOLD {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnosis returned by `POST <prefix>/predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub disease: String,
    /// Softmax probability as a percentage, rounded to two decimals
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub treatment: Vec<String>,
    pub prevention: Vec<String>,
    /// Forward pass plus softmax, in milliseconds
    pub inference_ms: f64,
}

impl PredictionResponse {
    /// Append the crop type the client reported. Empty values are ignored.
    pub fn with_crop_type(mut self, crop_type: Option<&str>) -> Self {
        if let Some(crop) = crop_type.filter(|c| !c.is_empty()) {
            self.description.push_str(" | Crop: ");
            self.description.push_str(crop);
        }
        self
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub device: String,
    pub classes: Vec<String>,
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(description: &str) -> PredictionResponse {
        PredictionResponse {
            disease: "leaf_rust".into(),
            confidence: 91.5,
            severity: Severity::High,
            description: description.into(),
            treatment: vec![],
            prevention: vec![],
            inference_ms: 1.0,
        }
    }

    #[test]
    fn severity_boundaries_are_inclusive() {
        assert_eq!(Severity::from_probability(0.80), Severity::High);
        assert_eq!(Severity::from_probability(0.7999), Severity::Medium);
        assert_eq!(Severity::from_probability(0.55), Severity::Medium);
        assert_eq!(Severity::from_probability(0.5499), Severity::Low);
        assert_eq!(Severity::from_probability(1.0), Severity::High);
        assert_eq!(Severity::from_probability(0.0), Severity::Low);
    }

    #[test]
    fn single_precision_threshold_counts_as_high() {
        assert_eq!(Severity::from_probability(0.8f32 as f64), Severity::High);
        assert_eq!(Severity::from_probability(0.55f32 as f64), Severity::Medium);
        assert_eq!(Severity::from_probability(0.79996), Severity::Medium);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Medium).unwrap(), "\"medium\"");
        assert_eq!(Severity::Low.to_string(), "low");
    }

    #[test]
    fn crop_type_is_appended() {
        let r = response("Fungal disease...").with_crop_type(Some("Wheat"));
        assert!(r.description.ends_with(" | Crop: Wheat"));
        assert_eq!(r.description, "Fungal disease... | Crop: Wheat");
    }

    #[test]
    fn missing_or_empty_crop_type_leaves_description() {
        assert_eq!(response("Fungal disease...").with_crop_type(None).description, "Fungal disease...");
        assert_eq!(
            response("Fungal disease...").with_crop_type(Some("")).description,
            "Fungal disease..."
        );
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round2(79.994), 79.99);
        assert_eq!(round2(12.345678), 12.35);
        assert_eq!(round2(100.0), 100.0);
    }
}
