use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cognisight_core::preprocess::preprocess_bytes;
use cognisight_core::{InputMode, OnnxClassifier, Prediction, Scorer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8501";

#[derive(Parser)]
#[command(name = "cognisight", about = "Cognisight dementia screening CLI")]
struct Cli {
    /// Base URL of the cognisightd web server
    #[arg(long, global = true, default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a photo for screening and record the result
    Predict {
        /// Email address the result is sent to
        #[arg(short, long)]
        email: String,
        /// Facial photo (jpg, jpeg or png in upload mode)
        #[arg(short, long)]
        image: PathBuf,
        /// How the photo was obtained
        #[arg(short, long, default_value = "upload")]
        mode: InputMode,
    },
    /// Show daemon status
    Status,
    /// List recorded submissions (needs the daemon's admin token)
    Ledger {
        /// Value of COGNISIGHT_ADMIN_TOKEN on the daemon
        #[arg(long)]
        token: String,
    },
    /// Score a photo locally against an ONNX model, without the daemon
    Score {
        /// Path to the exported classifier
        #[arg(long, default_value = cognisight_core::DEFAULT_MODEL_FILE)]
        model: PathBuf,
        /// Photo to score
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("building http client")?;

    match cli.command {
        Commands::Predict { email, image, mode } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name(&image));
            let form = reqwest::multipart::Form::new()
                .text("mode", mode.to_string())
                .text("email", email)
                .part("image", part);

            tracing::debug!(server = %server, mode = %mode, "submitting photo");
            let body = send(client.post(format!("{server}/api/predict")).multipart(form)).await?;

            println!("Result:  {}", field(&body, "verdict"));
            println!("Score:   {}", field(&body, "score"));
            println!("Photo:   {}", field(&body, "link"));
            println!("{}", field(&body, "message"));
            if body["state"] == "persist_failed" {
                bail!("result was not recorded in the ledger");
            }
        }
        Commands::Status => {
            let body = send(client.get(format!("{server}/health")))
                .await
                .with_context(|| format!("cognisightd at {server} is not reachable"))?;
            println!("cognisightd {} ({})", field(&body, "version"), field(&body, "status"));
            println!("  model:       {}", field(&body, "model"));
            println!("  image store: {}", field(&body, "image_store"));
            println!("  ledger:      {}", field(&body, "ledger"));
        }
        Commands::Ledger { token } => {
            let request = client.get(format!("{server}/api/ledger")).bearer_auth(token);
            let body = match send(request).await {
                Err(e) if e.downcast_ref::<ApiFailure>().is_some_and(|f| f.status == 404) => {
                    bail!("ledger listing is disabled on {server}; start cognisightd with COGNISIGHT_ADMIN_TOKEN set")
                }
                other => other?,
            };
            let rows = body["rows"].as_array().cloned().unwrap_or_default();
            if rows.is_empty() {
                println!("No submissions recorded ({})", field(&body, "backend"));
            }
            for row in &rows {
                println!(
                    "{:<32} {:<14} {}",
                    field(row, "email"),
                    field(row, "result"),
                    field(row, "image_link")
                );
            }
        }
        Commands::Score { model, image } => {
            let prediction = score_offline(&model, &image)?;
            println!("{} (score {:.4})", prediction.verdict, prediction.score);
        }
    }

    Ok(())
}

fn score_offline(model: &Path, image: &Path) -> Result<Prediction> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let input = preprocess_bytes(&bytes)?;
    let mut classifier = OnnxClassifier::load(&model.to_string_lossy())?;
    let score = classifier.score(&input)?;
    Ok(Prediction::from_score(score))
}

/// A non-success response from the daemon.
#[derive(Error, Debug)]
#[error("{message}")]
struct ApiFailure {
    status: u16,
    message: String,
}

/// Send a request and decode the JSON body, turning API errors into messages.
async fn send(request: reqwest::RequestBuilder) -> Result<Value> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        // Unrouted paths answer with an empty body.
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        return Err(ApiFailure {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        }
        .into());
    }
    resp.json().await.context("decoding server response")
}

fn error_message(status: u16, body: &Value) -> String {
    match body["error"]["message"].as_str() {
        Some(msg) => format!("server returned {status}: {msg}"),
        None => format!("server returned {status}"),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string())
}

/// Render a JSON field for display, without quotes around strings.
fn field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
