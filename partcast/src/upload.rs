use std::path::Path;

use pc_queue::{
    Ledger, QueueError, QueueSettings, RunReport, StopReason, UploadError,
    UploadQueue, Uploader,
};
use pc_youtube::{
    Authenticator, UPLOAD_SCOPE, UploadProgress, YouTubeClient, YouTubeError,
    auth::load_credentials,
};
use tracing::instrument;
use types::{UploadMetadata, YouTubeSessionSecret};

use crate::{Config, Error};

/// [`Uploader`] backed by the YouTube resumable upload API.
pub struct YouTubeUploader {
    client: YouTubeClient,
}

impl YouTubeUploader {
    pub const fn new(client: YouTubeClient) -> Self {
        Self { client }
    }
}

impl Uploader for YouTubeUploader {
    async fn upload(
        &mut self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, UploadError> {
        let mut last_percent = None;

        self.client
            .upload_video(path, metadata, |progress: UploadProgress| {
                let percent = progress.percent();
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    tracing::info!("Uploaded {}%", percent);
                }
            })
            .await
            .map_err(classify_error)
    }
}

/// Map a YouTube failure onto the kinds the upload queue distinguishes.
pub fn classify_error(error: YouTubeError) -> UploadError {
    match error {
        e if e.is_quota() => UploadError::Quota(e.to_string()),
        e @ (YouTubeError::Api { .. } | YouTubeError::MissingLocation) => {
            UploadError::Platform(e.to_string())
        }
        e => UploadError::Transport(e.to_string()),
    }
}

fn http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        // a 308 is how the upload API acknowledges a chunk
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

async fn authenticator(config: &Config) -> Result<Authenticator, Error> {
    let credentials = load_credentials(&config.client_secret_file).await?;

    Ok(Authenticator::new(
        credentials,
        config.token_file.clone(),
        vec![UPLOAD_SCOPE.to_string()],
    ))
}

/// Upload pending segments until the queue is drained, the run quota is
/// used up, or an upload fails.
///
/// Prerequisites are checked before anything is uploaded: the parts
/// directory, the ledger lock and the client secret.
///
/// # Errors
/// If a prerequisite is missing or authorization fails. Upload failures
/// are reported through [`RunReport::stop`].
#[instrument(skip(config))]
pub async fn run_upload(
    config: &Config,
    limit: Option<usize>,
) -> Result<RunReport, Error> {
    if !tokio::fs::metadata(&config.parts_dir)
        .await
        .is_ok_and(|m| m.is_dir())
    {
        return Err(QueueError::MissingPartsDir(
            config.parts_dir.display().to_string(),
        )
        .into());
    }

    let mut ledger = Ledger::open_exclusive(&config.ledger_file).await?;
    tracing::info!(
        "{} segments already uploaded according to {}",
        ledger.len(),
        ledger.path().display()
    );

    let access_token = authenticator(config).await?.access_token().await?;

    let client = YouTubeClient::new(http_client(config)?, access_token)
        .with_chunk_size(config.upload_chunk_bytes);

    let settings = QueueSettings {
        parts_dir: config.parts_dir.clone(),
        segment_extension: config.segment_extension.clone(),
        run_quota: limit.unwrap_or(config.run_quota),
        defaults: config.upload.clone(),
    };

    let mut queue = UploadQueue::new(settings, YouTubeUploader::new(client));

    Ok(queue.run(&mut ledger).await?)
}

/// Run the interactive authorization and store the new session.
///
/// # Errors
/// If the client secret is missing or authorization fails.
pub async fn authorize(config: &Config) -> Result<(), Error> {
    authenticator(config).await?.authorize().await?;

    let session: YouTubeSessionSecret =
        pc_secrets::get(&config.token_file).await.map_err(YouTubeError::from)?;

    println!(
        "Authorized. Session stored in {}{}.",
        config.token_file.display(),
        session
            .valid_until
            .and_then(format_timestamp)
            .map(|until| format!(", access token valid until {until}"))
            .unwrap_or_default()
    );

    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn format_timestamp(seconds: f64) -> Option<String> {
    chrono::DateTime::from_timestamp(seconds as i64, 0).map(|time| {
        time.with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
}

pub fn summary(report: &RunReport) -> String {
    let count = report.uploaded_count();

    match &report.stop {
        StopReason::QueueDrained => {
            format!("Uploaded {count} segments. No segments left to upload.")
        }
        StopReason::RunQuotaReached => format!(
            "Uploaded {count} segments. Run quota reached, the remaining segments wait for the next run."
        ),
        StopReason::UploadFailed { file_name, error } => format!(
            "Uploaded {count} segments before {file_name} failed: {error}"
        ),
        StopReason::LedgerFailed { file_name, error } => format!(
            "Uploaded {count} segments, but {file_name} could not be recorded and may be uploaded again: {error}"
        ),
    }
}
