//! Screening form flow: email guard, classification, photo upload, ledger row.
//!
//! Both input modes (camera still, file upload) share one state machine and
//! one email predicate; they differ only in which photo formats they accept.

use crate::engine::{EngineError, EngineHandle};
use cognisight_core::preprocess::sniff_kind;
use cognisight_core::{is_valid_email, ImageKind, InputMode, LedgerRow, Prediction, Submission};
use cognisight_store::{ImageStore, Ledger, UploadError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const UPLOAD_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Where a form branch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    NoInput,
    InvalidEmail,
    AwaitingImage,
    ImageReady,
    PredictionRequested,
    Persisted,
    PersistFailed,
}

impl FormState {
    /// State of a branch before the user presses Predict.
    pub fn evaluate(email: &str, has_image: bool) -> Self {
        if email.trim().is_empty() && !has_image {
            FormState::NoInput
        } else if !is_valid_email(email) {
            FormState::InvalidEmail
        } else if !has_image {
            FormState::AwaitingImage
        } else {
            FormState::ImageReady
        }
    }

    /// Predict is offered only with a valid email and a photo.
    pub fn can_predict(&self) -> bool {
        matches!(self, FormState::ImageReady)
    }

    pub fn message(&self) -> &'static str {
        match self {
            FormState::NoInput => "Enter your email address and provide a facial photo.",
            FormState::InvalidEmail => "Please enter a valid email address.",
            FormState::AwaitingImage => "Capture or upload a facial photo to continue.",
            FormState::ImageReady => "Ready. Press Predict to run the assessment.",
            FormState::PredictionRequested => "Analysing your photo...",
            FormState::Persisted => {
                "Facial image captured successfully! Congratulations on completing the whole \
                 journey. Your full cognitive assessment result for your dementia status will \
                 be sent to the email address you provided soon."
            }
            FormState::PersistFailed => "Image and prediction were not saved to the results sheet.",
        }
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{}", FormState::InvalidEmail.message())]
    InvalidEmail,
    #[error("no photo was provided")]
    MissingImage,
    #[error("unsupported photo format: {0} (expected jpg, jpeg or png)")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("photo upload failed: {0}")]
    Upload(#[from] UploadError),
}

/// Result shown to the user after Predict.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub link: String,
    pub state: FormState,
    pub message: String,
}

pub struct Controller {
    engine: EngineHandle,
    images: Arc<dyn ImageStore>,
    ledger: Arc<dyn Ledger>,
}

impl Controller {
    pub fn new(engine: EngineHandle, images: Arc<dyn ImageStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            engine,
            images,
            ledger,
        }
    }

    pub fn images(&self) -> &dyn ImageStore {
        self.images.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Run one submission end to end.
    ///
    /// Guard failures, undecodable photos, model errors and upload errors
    /// abort with `Err` and persist nothing. A ledger failure after a
    /// successful upload is reported as `PersistFailed`; the uploaded photo
    /// stays where it is.
    pub async fn submit(
        &self,
        mode: InputMode,
        email: &str,
        image: Option<Vec<u8>>,
        filename: Option<&str>,
    ) -> Result<Outcome, SubmitError> {
        if !is_valid_email(email) {
            return Err(SubmitError::InvalidEmail);
        }
        let image = image
            .filter(|bytes| !bytes.is_empty())
            .ok_or(SubmitError::MissingImage)?;
        let kind = check_format(mode, &image, filename)?;
        let email = email.trim();

        tracing::debug!(mode = %mode, size = image.len(), state = ?FormState::PredictionRequested, "submission accepted");

        let prediction = self.engine.classify(image.clone()).await?;

        // Camera stills are only known to be decodable at this point.
        let kind = kind.or_else(|| sniff_kind(&image)).unwrap_or(ImageKind::Jpeg);
        let name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
        let link = self.images.put(&name, kind.content_type(), &image).await?;
        tracing::info!(
            mode = %mode,
            verdict = %prediction.verdict,
            store = self.images.backend_tag(),
            name = %name,
            "photo uploaded"
        );

        let submission = Submission {
            email: email.to_string(),
            image_link: link.clone(),
            verdict: prediction.verdict,
        };

        let state = match self.ledger.append(&LedgerRow::from(&submission)).await {
            Ok(()) => {
                tracing::info!(ledger = self.ledger.backend_tag(), "submission recorded");
                FormState::Persisted
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    ledger = self.ledger.backend_tag(),
                    link = %link,
                    "ledger append failed; uploaded photo is orphaned"
                );
                FormState::PersistFailed
            }
        };

        let message = match state {
            FormState::PersistFailed => format!(
                "Your result is {}. {}",
                prediction.verdict,
                state.message()
            ),
            _ => state.message().to_string(),
        };

        Ok(Outcome {
            prediction,
            link,
            state,
            message,
        })
    }
}

/// Enforce per-mode format rules. Returns the sniffed kind when known.
fn check_format(
    mode: InputMode,
    image: &[u8],
    filename: Option<&str>,
) -> Result<Option<ImageKind>, SubmitError> {
    let kind = sniff_kind(image);
    match mode {
        InputMode::Camera => Ok(kind),
        InputMode::Upload => {
            if let Some(ext) = filename.and_then(|f| f.rsplit_once('.')).map(|(_, ext)| ext) {
                if !UPLOAD_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                    return Err(SubmitError::UnsupportedFormat(ext.to_string()));
                }
            }
            match kind {
                Some(k) if k.is_upload_allowed() => Ok(Some(k)),
                Some(k) => Err(SubmitError::UnsupportedFormat(k.extension().to_string())),
                None => Err(SubmitError::UnsupportedFormat("unrecognized content".to_string())),
            }
        }
    }
}
