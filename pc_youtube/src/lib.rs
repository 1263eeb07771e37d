pub mod auth;
pub mod upload;

use thiserror::Error;

pub use auth::Authenticator;
pub use upload::{UploadProgress, YouTubeClient};

/// OAuth scope needed to insert videos.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Error reasons YouTube reports when the daily quota or the upload rate
/// limit is exhausted.
const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "uploadLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

#[derive(Error, Debug)]
pub enum YouTubeError {
    #[error("Client secret file not found: {0}")]
    MissingClientSecret(String),
    #[error("Client secret file {path} is malformed: {source}")]
    ClientSecret {
        path: String,
        source: serde_json::Error,
    },
    #[error("Failed to access session: {0}")]
    Session(#[from] pc_secrets::SecretsError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Authorization failed: {0}")]
    Authorization(String),
    #[error("Token request failed: {0}")]
    TokenRequest(String),
    #[error("YouTube quota exhausted ({reason}): {message}")]
    QuotaExceeded { reason: String, message: String },
    #[error("YouTube API error {status}: {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    #[error("Error sending request to YouTube: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Error reading file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error parsing response from YouTube: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Location header not found in upload session response")]
    MissingLocation,
    #[error("Refusing to upload an empty file")]
    EmptyFile,
    #[error("Upload made no progress past byte {offset}")]
    Stalled { offset: u64 },
}

impl YouTubeError {
    /// Whether the platform refused the request because of quota or rate
    /// limiting, as opposed to any other failure.
    pub const fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Classify an error response of the YouTube Data API.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: ErrorDetail,
        }

        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            #[serde(default)]
            message: String,
            #[serde(default)]
            errors: Vec<ErrorItem>,
        }

        #[derive(serde::Deserialize)]
        struct ErrorItem {
            reason: Option<String>,
        }

        let (reason, message) = match serde_json::from_str::<ErrorBody>(body)
        {
            Ok(parsed) => (
                parsed
                    .error
                    .errors
                    .into_iter()
                    .find_map(|item| item.reason),
                parsed.error.message,
            ),
            Err(_) => (None, body.trim().to_string()),
        };

        let is_quota = status == 429
            || reason
                .as_deref()
                .is_some_and(|reason| QUOTA_REASONS.contains(&reason));

        if is_quota {
            Self::QuotaExceeded {
                reason: reason.unwrap_or_else(|| "tooManyRequests".to_string()),
                message,
            }
        } else {
            Self::Api {
                status,
                reason,
                message,
            }
        }
    }
}
