use crate::error::{DiagnosisError, DiagnosisResult};
use parking_lot::RwLock;
use std::path::Path;

/// Labels used when no class names file is configured. Index order matches the
/// head of the bundled disease detector.
pub const DEFAULT_CLASS_NAMES: [&str; 5] = [
    "leaf_rust",
    "powdery_mildew",
    "early_blight",
    "late_blight",
    "healthy",
];

/// Index ordered label list shared by every request.
///
/// The list only ever grows: when the model reports an index past the end,
/// placeholder names `class_<n>` are appended up to and including that index.
#[derive(Debug)]
pub struct ClassNames {
    names: RwLock<Vec<String>>,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: RwLock::new(names),
        }
    }

    /// Load labels from an optional file, one per line.
    ///
    /// Lines are trimmed and blank lines skipped. A missing path, a file that
    /// does not exist or a file without any label falls back to
    /// [`DEFAULT_CLASS_NAMES`].
    pub fn load(path: Option<&Path>) -> DiagnosisResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::warn!(
                "Class names file {} does not exist, using default labels",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| DiagnosisError::ClassNames {
            path: path.to_path_buf(),
            source,
        })?;
        let names = parse_class_names(&raw);
        if names.is_empty() {
            tracing::warn!(
                "Class names file {} is empty, using default labels",
                path.display()
            );
            return Ok(Self::default());
        }

        tracing::info!("Loaded {} class names from {}", names.len(), path.display());
        Ok(Self::new(names))
    }

    /// Label for `index`, growing the list with placeholders when needed.
    pub fn resolve(&self, index: usize) -> String {
        if let Some(name) = self.names.read().get(index) {
            return name.clone();
        }

        let mut names = self.names.write();
        // Another request may have grown the list while we waited.
        if index >= names.len() {
            let start = names.len();
            tracing::warn!(
                "Model emitted class index {} but only {} labels are known, adding placeholders",
                index,
                start
            );
            names.extend((start..=index).map(|i| format!("class_{}", i)));
        }
        names[index].clone()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.names.read().clone()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

fn parse_class_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}
