use cognisight_core::preprocess::preprocess_bytes;
use cognisight_core::{ClassifierError, Prediction, PreprocessError, Scorer};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Classify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Prediction, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode, preprocess and score one encoded photo.
    pub async fn classify(&self, image: Vec<u8>) -> Result<Prediction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Classify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The scorer is loaded by the caller (fail-fast at startup) and moved onto
/// the thread, which owns it for the life of the process. Requests are
/// served one at a time; the thread exits once every handle is dropped.
pub fn spawn_engine(mut scorer: Box<dyn Scorer>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("cognisight-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Classify { image, reply } => {
                        let result = run_classify(scorer.as_mut(), &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_classify(scorer: &mut dyn Scorer, image: &[u8]) -> Result<Prediction, EngineError> {
    let started = std::time::Instant::now();
    let input = preprocess_bytes(image)?;
    let score = scorer.score(&input)?;
    let prediction = Prediction::from_score(score);

    tracing::info!(
        score = prediction.score,
        verdict = %prediction.verdict,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "photo classified"
    );

    Ok(prediction)
}
