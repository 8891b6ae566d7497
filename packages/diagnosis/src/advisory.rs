//! Static advisory text keyed by disease label.

use std::borrow::Cow;

/// Description and agronomic advice for one disease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseaseMeta {
    pub description: &'static str,
    pub treatment: &'static [&'static str],
    pub prevention: &'static [&'static str],
}

static LEAF_RUST: DiseaseMeta = DiseaseMeta {
    description: "Fungal disease causing orange-brown pustules on leaves. Common in wheat crops during humid conditions.",
    treatment: &[
        "Apply fungicide containing Propiconazole or Tebuconazole at 0.1%",
        "Repeat spray after 10-15 days if symptoms persist",
        "Remove severely infected leaves to reduce spread",
        "Ensure proper spacing for air circulation",
    ],
    prevention: &[
        "Use disease-resistant varieties",
        "Avoid overhead irrigation",
        "Maintain proper plant spacing",
        "Apply preventive fungicide before disease onset",
    ],
};

static POWDERY_MILDEW: DiseaseMeta = DiseaseMeta {
    description: "White powdery growth on leaves and stems. Thrives in warm, dry conditions with high humidity.",
    treatment: &[
        "Apply sulfur-based fungicide as per label",
        "Use neem oil solution (2-3%) in early stages",
        "Prune infected parts to improve airflow",
        "Avoid excessive nitrogen fertilization",
    ],
    prevention: &[
        "Plant resistant varieties",
        "Avoid dense planting",
        "Water at the base, not on leaves",
        "Maintain proper nutrition and airflow",
    ],
};

const GENERIC_TREATMENT: &[&str] = &[
    "Isolate affected plants to limit spread",
    "Consult local agronomist for targeted chemical/biological control",
    "Follow label instructions for any spray applications",
];

const GENERIC_PREVENTION: &[&str] = &[
    "Rotate crops to break disease cycles",
    "Use certified disease-free seeds",
    "Maintain proper spacing and sanitation",
    "Monitor field regularly for early signs",
];

/// Lowercase the label and replace spaces with underscores.
pub fn normalize_label(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}

/// Table entry for an already normalized key
pub fn lookup(key: &str) -> Option<&'static DiseaseMeta> {
    match key {
        "leaf_rust" => Some(&LEAF_RUST),
        "powdery_mildew" => Some(&POWDERY_MILDEW),
        _ => None,
    }
}

/// Advisory attached to a prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub description: Cow<'static, str>,
    pub treatment: Vec<String>,
    pub prevention: Vec<String>,
}

impl Advisory {
    /// Advice for `label`, falling back to generic guidance for labels the
    /// table does not know.
    pub fn for_label(label: &str) -> Self {
        match lookup(&normalize_label(label)) {
            Some(meta) => Self {
                description: Cow::Borrowed(meta.description),
                treatment: to_owned_steps(meta.treatment),
                prevention: to_owned_steps(meta.prevention),
            },
            None => Self {
                description: Cow::Owned(format!(
                    "Detected sign of {}. Review visually to confirm.",
                    label
                )),
                treatment: to_owned_steps(GENERIC_TREATMENT),
                prevention: to_owned_steps(GENERIC_PREVENTION),
            },
        }
    }
}

fn to_owned_steps(steps: &[&str]) -> Vec<String> {
    steps.iter().map(|s| s.to_string()).collect()
}
