use redact::Secret;
use serde::{Deserialize, Serialize};

/// Visibility of an uploaded video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Privacy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to one video upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: String,

    pub description: String,

    pub tags: Vec<String>,

    /// YouTube category id, `22` is "People & Blogs".
    pub category_id: String,

    pub privacy: Privacy,
}

/// OAuth client registration read from the client secret descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeCredentials {
    pub client_id: String,

    pub client_secret: Secret<String>,

    pub auth_url: String,

    pub token_url: String,
}

/// Persisted authorization session, written after the first interactive
/// consent and refreshed in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouTubeSessionSecret {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    pub scopes: Vec<String>,

    /// Unix timestamp (seconds) after which the access token is stale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<f64>,
}
