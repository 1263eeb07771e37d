use std::path::Path;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use types::YouTubeSessionSecret;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Failed to access secret file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Secret file {path} is malformed: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

impl SecretsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Trait for managing session secrets, providing methods to create them and
/// set tokens.
///
/// # Usage
/// Implement this trait for any type that needs to be persisted as a session
/// secret. The type must be serializable and deserializable using serde.
pub trait SessionSecret: Serialize + DeserializeOwned {
    fn new(scopes: Vec<String>) -> Self;
    /// Store a fresh access token. A `None` refresh token keeps the one
    /// already held, since refresh responses usually omit it.
    fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        valid_until: Option<f64>,
    );
}

impl SessionSecret for YouTubeSessionSecret {
    fn new(scopes: Vec<String>) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            scopes,
            valid_until: None,
        }
    }

    fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        valid_until: Option<f64>,
    ) {
        self.access_token = Some(access_token);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.valid_until = valid_until;
    }
}

/// Create or replace a secret file.
///
/// The secret is serialized to a sibling temporary file which is then
/// renamed over `path`, so a crash never leaves a truncated token file. On
/// unix the file is readable by its owner only.
///
/// # Errors
///
/// If the secret cannot be serialized or the file cannot be written.
pub async fn create_or_replace<T: SessionSecret + Sync>(
    path: &Path,
    secret: &T,
) -> Result<(), SecretsError> {
    let contents = serde_json::to_vec_pretty(secret)
        .map_err(|e| SecretsError::json(path, e))?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    tokio::fs::write(temp_path, contents)
        .await
        .map_err(|e| SecretsError::io(temp_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(
            temp_path,
            std::fs::Permissions::from_mode(0o600),
        )
        .await
        .map_err(|e| SecretsError::io(temp_path, e))?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        tracing::error!("failed to create or replace secret: {:?}", e);
        SecretsError::io(path, e)
    })?;

    Ok(())
}

/// Read a secret file.
///
/// # Errors
///
/// If the file cannot be read or does not deserialize into `T`.
pub async fn get<T: SessionSecret>(path: &Path) -> Result<T, SecretsError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| SecretsError::io(path, e))?;

    serde_json::from_slice(&contents).map_err(|e| SecretsError::json(path, e))
}

/// Read a secret file, returning `None` when it does not exist yet.
///
/// # Errors
///
/// See [`get`]; a missing file is not an error.
pub async fn get_optional<T: SessionSecret>(
    path: &Path,
) -> Result<Option<T>, SecretsError> {
    match get(path).await {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretsError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Set tokens in a secret file.
///
/// Reads the current secret, updates the tokens and the expiry computed
/// from `valid_for_duration`, and writes it back.
///
/// # Errors
///
/// If the secret cannot be read or written.
pub async fn set_tokens<T: SessionSecret + Sync>(
    path: &Path,
    access_token: &str,
    refresh_token: Option<&str>,
    valid_for_duration: Option<Duration>,
) -> Result<T, SecretsError> {
    let mut secret = get::<T>(path).await?;

    secret.set_tokens(
        access_token.to_string(),
        refresh_token.map(ToString::to_string),
        calculate_valid_until(valid_for_duration),
    );

    create_or_replace(path, &secret).await?;

    Ok(secret)
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs_f64()
}

/// Calculate the valid until timestamp.
///
/// # Returns
///
/// * `Option<f64>` - Unix timestamp `valid_for_duration` from now.
pub fn calculate_valid_until(
    valid_for_duration: Option<Duration>,
) -> Option<f64> {
    valid_for_duration.map(|d| now() + d.as_secs_f64())
}

/// Whether a token valid until `valid_until` should be refreshed now,
/// `leeway` before it actually expires. Unknown expiry counts as expired.
pub fn is_expired(valid_until: Option<f64>, leeway: Duration) -> bool {
    valid_until.is_none_or(|until| now() + leeway.as_secs_f64() >= until)
}
