use crate::YouTubeCredentials;
use redact::Secret;
use serde::Deserialize;

/// Entry of a Google OAuth client secret descriptor.
#[derive(Debug, Deserialize)]
pub struct ClientSecretEntry {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

/// The `client_secret.json` file downloaded from the Google Cloud console.
/// Desktop clients are stored under `installed`, web clients under `web`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSecretFile {
    Installed(ClientSecretEntry),
    Web(ClientSecretEntry),
}

impl From<ClientSecretFile> for YouTubeCredentials {
    fn from(file: ClientSecretFile) -> Self {
        let (ClientSecretFile::Installed(entry)
        | ClientSecretFile::Web(entry)) = file;

        Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
            auth_url: entry.auth_uri,
            token_url: entry.token_uri,
        }
    }
}

/// Parses the contents of a client secret descriptor.
///
/// # Errors
///
/// Returns an error if the JSON has neither an `installed` nor a `web`
/// section, or the section lacks one of the required fields.
pub fn parse_client_secret(
    json: &str,
) -> Result<YouTubeCredentials, serde_json::Error> {
    serde_json::from_str::<ClientSecretFile>(json).map(Into::into)
}
