//! cognisight-core — Face photo preprocessing and dementia screening classifier.
//!
//! Turns an arbitrary photo into the fixed `(1, 224, 224, 3)` tensor the
//! classifier expects, and maps the classifier's sigmoid score to a verdict.

pub mod classifier;
pub mod preprocess;
pub mod types;

pub use classifier::{ClassifierError, OnnxClassifier, Scorer};
pub use preprocess::{ImageKind, PreprocessError};
pub use types::{is_valid_email, InputMode, LedgerRow, Prediction, Submission, Verdict};

/// Default filename of the exported classifier.
pub const DEFAULT_MODEL_FILE: &str = "CNN2Dmodel1.onnx";
