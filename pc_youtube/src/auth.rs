use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use pc_secrets::SessionSecret;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::instrument;
use types::{YouTubeCredentials, YouTubeSessionSecret};

use crate::YouTubeError;

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(60);

/// Read the OAuth client registration from a `client_secret.json` file.
///
/// # Errors
/// If the file does not exist or is not a Google client secret descriptor.
pub async fn load_credentials(
    path: &Path,
) -> Result<YouTubeCredentials, YouTubeError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(YouTubeError::MissingClientSecret(
                path.display().to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    types::utils::parse_client_secret(&contents).map_err(|source| {
        YouTubeError::ClientSecret {
            path: path.display().to_string(),
            source,
        }
    })
}

pub fn get_oauth_client(
    credentials: &YouTubeCredentials,
    redirect_url: &str,
) -> Result<BasicClient, YouTubeError> {
    let invalid = |e: oauth2::url::ParseError| {
        YouTubeError::InvalidUrl(e.to_string())
    };

    let client = BasicClient::new(
        ClientId::new(credentials.client_id.clone()),
        Some(ClientSecret::new(
            credentials.client_secret.expose_secret().clone(),
        )),
        AuthUrl::new(credentials.auth_url.clone()).map_err(invalid)?,
        Some(TokenUrl::new(credentials.token_url.clone()).map_err(invalid)?),
    )
    .set_redirect_uri(
        RedirectUrl::new(redirect_url.to_string()).map_err(invalid)?,
    );

    Ok(client)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback_handler(
    State(sender): State<mpsc::Sender<CallbackParams>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let message = if params.code.is_some() {
        "partcast is authorized. You can close this window."
    } else {
        "Authorization failed, see the terminal for details."
    };

    if sender.send(params).await.is_err() {
        tracing::warn!("authorization callback received twice");
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
}

/// Obtains YouTube access tokens, persisting the session between runs.
#[derive(Debug)]
pub struct Authenticator {
    credentials: YouTubeCredentials,
    token_file: PathBuf,
    scopes: Vec<String>,
}

impl Authenticator {
    pub fn new(
        credentials: YouTubeCredentials,
        token_file: impl Into<PathBuf>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            credentials,
            token_file: token_file.into(),
            scopes,
        }
    }

    /// Return a usable access token.
    ///
    /// A stored token is reused until shortly before it expires, then
    /// refreshed. Without a stored session, or when the refresh is refused,
    /// the interactive authorization runs.
    ///
    /// # Errors
    /// If the session file cannot be read or written, or authorization
    /// fails.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<String, YouTubeError> {
        let Some(session) = pc_secrets::get_optional::<YouTubeSessionSecret>(
            &self.token_file,
        )
        .await?
        else {
            tracing::info!("no stored session, starting authorization");
            return self.authorize().await;
        };

        if let Some(access_token) = session.access_token {
            if !pc_secrets::is_expired(session.valid_until, EXPIRY_LEEWAY) {
                tracing::debug!("reusing stored access token");
                return Ok(access_token);
            }
        }

        let Some(refresh_token) = session.refresh_token else {
            tracing::warn!("stored session has no refresh token");
            return self.authorize().await;
        };

        match self.refresh(&refresh_token).await {
            Ok(access_token) => Ok(access_token),
            Err(YouTubeError::TokenRequest(e)) => {
                tracing::warn!("token refresh refused: {}", e);
                self.authorize().await
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<String, YouTubeError> {
        // the redirect is not used when refreshing
        let client = get_oauth_client(&self.credentials, "http://127.0.0.1/")?;

        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(
                refresh_token.to_string(),
            ))
            .request_async(async_http_client)
            .await
            .map_err(|e| YouTubeError::TokenRequest(e.to_string()))?;

        let session: YouTubeSessionSecret = pc_secrets::set_tokens(
            &self.token_file,
            token_response.access_token().secret(),
            token_response.refresh_token().map(|t| t.secret().as_str()),
            token_response.expires_in(),
        )
        .await?;

        tracing::info!("access token refreshed");

        session.access_token.ok_or_else(|| {
            YouTubeError::TokenRequest("no access token stored".to_string())
        })
    }

    /// Run the installed-app authorization flow.
    ///
    /// A loopback HTTP server receives the redirect from the consent page;
    /// the user opens the printed URL in a browser. The resulting tokens
    /// replace any stored session.
    ///
    /// # Errors
    /// If the callback server cannot start, consent is denied, the CSRF
    /// state does not match, or the code exchange fails.
    #[instrument(skip(self))]
    pub async fn authorize(&self) -> Result<String, YouTubeError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect_url =
            format!("http://127.0.0.1:{}/", listener.local_addr()?.port());

        let client = get_oauth_client(&self.credentials, &redirect_url)?;

        let (pkce_challenge, pkce_verifier) =
            PkceCodeChallenge::new_random_sha256();

        let (authorize_url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().map(|scope| Scope::new(scope.clone())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        let (sender, mut receiver) = mpsc::channel(1);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/", get(callback_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(sender);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_receiver.await.ok();
                })
                .await
        });

        println!(
            "Open this URL in your browser to authorize partcast:\n\n{authorize_url}\n"
        );
        tracing::info!("waiting for authorization on {}", redirect_url);

        let params = receiver.recv().await;

        shutdown_sender.send(()).ok();
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("callback server error: {}", e),
            Err(e) => tracing::warn!("callback server task failed: {}", e),
        }

        let params = params.ok_or_else(|| {
            YouTubeError::Authorization("callback server stopped".to_string())
        })?;

        if let Some(error) = params.error {
            return Err(YouTubeError::Authorization(error));
        }

        if params.state.as_deref() != Some(csrf_state.secret().as_str()) {
            tracing::error!("csrf_state mismatch");
            return Err(YouTubeError::Authorization(
                "state parameter mismatch".to_string(),
            ));
        }

        let code = params.code.ok_or_else(|| {
            YouTubeError::Authorization("no code in callback".to_string())
        })?;

        let token_response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| YouTubeError::TokenRequest(e.to_string()))?;

        let access_token = token_response.access_token().secret().clone();

        let mut session = YouTubeSessionSecret::new(self.scopes.clone());
        session.set_tokens(
            access_token.clone(),
            token_response.refresh_token().map(|t| t.secret().clone()),
            pc_secrets::calculate_valid_until(token_response.expires_in()),
        );
        pc_secrets::create_or_replace(&self.token_file, &session).await?;

        tracing::info!(
            "authorization stored in {}",
            self.token_file.display()
        );

        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use redact::Secret;

    use super::*;

    fn credentials() -> YouTubeCredentials {
        YouTubeCredentials {
            client_id: "client".to_string(),
            client_secret: Secret::new("secret".to_string()),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_client_secret() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            load_credentials(&dir.path().join("client_secret.json")).await;

        assert!(matches!(result, Err(YouTubeError::MissingClientSecret(_))));
    }

    #[tokio::test]
    async fn test_reuses_fresh_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token.json");

        let mut session = YouTubeSessionSecret::new(vec![]);
        session.set_tokens(
            "stored".to_string(),
            Some("refresh".to_string()),
            pc_secrets::calculate_valid_until(Some(Duration::from_secs(3600))),
        );
        pc_secrets::create_or_replace(&token_file, &session)
            .await
            .unwrap();

        let authenticator =
            Authenticator::new(credentials(), &token_file, vec![]);

        assert_eq!(authenticator.access_token().await.unwrap(), "stored");
    }

    #[test]
    fn test_oauth_client_rejects_bad_url() {
        let mut credentials = credentials();
        credentials.token_url = "not a url".to_string();

        assert!(matches!(
            get_oauth_client(&credentials, "http://127.0.0.1:1/"),
            Err(YouTubeError::InvalidUrl(_))
        ));
    }
}
