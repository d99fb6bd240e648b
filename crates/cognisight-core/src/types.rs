use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scores strictly above this value are classified as non-demented.
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Binary screening label derived from the classifier score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Demented")]
    Demented,
    #[serde(rename = "Non-Demented")]
    NonDemented,
}

impl Verdict {
    /// Apply the fixed decision rule: `score > 0.5` is non-demented,
    /// everything else (including exactly 0.5) is demented.
    pub fn from_score(score: f32) -> Self {
        if score > DECISION_THRESHOLD {
            Verdict::NonDemented
        } else {
            Verdict::Demented
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Demented => "Demented",
            Verdict::NonDemented => "Non-Demented",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for one photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Sigmoid output of the model, in [0, 1].
    pub score: f32,
    pub verdict: Verdict,
}

impl Prediction {
    pub fn from_score(score: f32) -> Self {
        Self {
            score,
            verdict: Verdict::from_score(score),
        }
    }
}

/// How the photo reached the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Still captured from the browser webcam.
    #[serde(alias = "webcam")]
    Camera,
    /// File picked from disk (jpg/jpeg/png only).
    Upload,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMode::Camera => "camera",
            InputMode::Upload => "upload",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" | "webcam" => Ok(InputMode::Camera),
            "upload" => Ok(InputMode::Upload),
            other => Err(format!("unknown input mode '{other}' (expected camera or upload)")),
        }
    }
}

/// Email check used by both input modes.
///
/// An address is invalid when it is blank, OR has no `@`, OR has no `.`.
/// Deliberately naive: no RFC 5322 parsing.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let blank = email.is_empty();
    let missing_at = !email.contains('@');
    let missing_dot = !email.contains('.');
    !(blank || missing_at || missing_dot)
}

/// One completed screening, as persisted to the ledger.
///
/// The photo itself is stored separately; only its link is kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub email: String,
    pub image_link: String,
    pub verdict: Verdict,
}

/// Column headers of the ledger worksheet, in write order.
pub const LEDGER_HEADERS: [&str; 3] = ["Email_2", "Image_Name", "Result"];

/// Reads never look past this many columns.
pub const LEDGER_MAX_COLUMNS: usize = 7;

/// A ledger row as stored. `result` is free text: rows written by other
/// tools are not guaranteed to hold a valid verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub email: String,
    pub image_link: String,
    pub result: String,
}

impl LedgerRow {
    pub fn new(
        email: impl Into<String>,
        image_link: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            image_link: image_link.into(),
            result: result.into(),
        }
    }

    /// True when every cell is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.email.trim().is_empty()
            && self.image_link.trim().is_empty()
            && self.result.trim().is_empty()
    }

    /// Cells in `LEDGER_HEADERS` order.
    pub fn cells(&self) -> [&str; 3] {
        [&self.email, &self.image_link, &self.result]
    }

    /// Parse the stored result back into a verdict, if it is one.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.result.trim() {
            "Demented" => Some(Verdict::Demented),
            "Non-Demented" => Some(Verdict::NonDemented),
            _ => None,
        }
    }
}

impl From<&Submission> for LedgerRow {
    fn from(s: &Submission) -> Self {
        LedgerRow::new(s.email.clone(), s.image_link.clone(), s.verdict.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_above_threshold() {
        assert_eq!(Verdict::from_score(0.7), Verdict::NonDemented);
        assert_eq!(Verdict::from_score(0.5001), Verdict::NonDemented);
        assert_eq!(Verdict::from_score(1.0), Verdict::NonDemented);
    }

    #[test]
    fn test_verdict_at_or_below_threshold() {
        assert_eq!(Verdict::from_score(0.5), Verdict::Demented);
        assert_eq!(Verdict::from_score(0.2), Verdict::Demented);
        assert_eq!(Verdict::from_score(0.0), Verdict::Demented);
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::NonDemented.to_string(), "Non-Demented");
        assert_eq!(Verdict::Demented.to_string(), "Demented");
        let json = serde_json::to_string(&Verdict::NonDemented).unwrap();
        assert_eq!(json, "\"Non-Demented\"");
    }

    #[test]
    fn test_email_accepted() {
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("x@y.com"));
        assert!(is_valid_email("  first.last@example.org  "));
    }

    #[test]
    fn test_email_rejected() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("   "));
        assert!(!is_valid_email("abc"));
        assert!(!is_valid_email("abc@def"));
        assert!(!is_valid_email("abc.def"));
    }

    #[test]
    fn test_input_mode_parse() {
        assert_eq!("camera".parse::<InputMode>().unwrap(), InputMode::Camera);
        assert_eq!("Webcam".parse::<InputMode>().unwrap(), InputMode::Camera);
        assert_eq!("upload".parse::<InputMode>().unwrap(), InputMode::Upload);
        assert!("fax".parse::<InputMode>().is_err());
    }

    #[test]
    fn test_ledger_row_from_submission() {
        let s = Submission {
            email: "x@y.com".into(),
            image_link: "https://drive/1".into(),
            verdict: Verdict::NonDemented,
        };
        let row = LedgerRow::from(&s);
        assert_eq!(row.cells(), ["x@y.com", "https://drive/1", "Non-Demented"]);
        assert_eq!(row.verdict(), Some(Verdict::NonDemented));
    }

    #[test]
    fn test_ledger_row_blank() {
        assert!(LedgerRow::new("", " ", "\t").is_blank());
        assert!(!LedgerRow::new("", "", "Demented").is_blank());
        assert_eq!(LedgerRow::new("a", "b", "maybe").verdict(), None);
    }
}
