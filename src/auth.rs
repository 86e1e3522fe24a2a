//! Credential provider for the Gmail API
//!
//! Two ways to obtain an authorized hub:
//! - OAuth2 installed-app flow with the token cached on disk
//! - a pre-acquired bearer token attached as-is to every request

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{LabelerError, Result};

/// Scopes needed to read threads and add labels
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Environment variable holding a pre-acquired bearer token
pub const ACCESS_TOKEN_ENV: &str = "GMAIL_ACCESS_TOKEN";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<HttpsConnector>;

/// Where the hub's credentials come from
#[derive(Debug, Clone)]
pub enum CredentialSource<'a> {
    /// Installed-app OAuth flow using a client secret file
    OAuth {
        credentials_path: &'a Path,
        token_cache_path: &'a Path,
    },
    /// Bearer token used verbatim; never refreshed
    AccessToken(String),
}

impl<'a> CredentialSource<'a> {
    /// Prefer an explicit token, then `GMAIL_ACCESS_TOKEN`, then OAuth
    pub fn resolve(
        explicit_token: Option<&str>,
        credentials_path: &'a Path,
        token_cache_path: &'a Path,
    ) -> Self {
        let token = explicit_token
            .map(str::to_string)
            .or_else(|| env::var(ACCESS_TOKEN_ENV).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        match token {
            Some(token) => CredentialSource::AccessToken(token),
            None => CredentialSource::OAuth {
                credentials_path,
                token_cache_path,
            },
        }
    }
}

/// Build an authorized hub from the given credential source
pub async fn connect(source: CredentialSource<'_>) -> Result<GmailHub> {
    match source {
        CredentialSource::OAuth {
            credentials_path,
            token_cache_path,
        } => initialize_gmail_hub(credentials_path, token_cache_path).await,
        CredentialSource::AccessToken(token) => {
            debug!("Using pre-acquired access token");
            hub_from_access_token(token)
        }
    }
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Opens a browser for consent on first use and persists the token to
/// `token_cache_path` for subsequent runs.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| LabelerError::AuthError(format!("Failed to read credentials: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| LabelerError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Fetch once up front so the cached token carries every scope
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| LabelerError::AuthError(format!("Failed to obtain token: {}", e)))?;

    info!("OAuth token ready (cached at {})", token_cache_path.display());

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(https_connector()?);
    Ok(Gmail::new(client, auth))
}

/// Hub that sends `token` as the bearer credential on every call
pub fn hub_from_access_token(token: String) -> Result<GmailHub> {
    if token.trim().is_empty() {
        return Err(LabelerError::AuthError("Access token is empty".to_string()));
    }
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(https_connector()?);
    Ok(Gmail::new(client, token))
}

type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

fn https_connector() -> Result<HttpsConnector> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| LabelerError::AuthError(format!("Failed to load TLS roots: {}", e)))?
        .https_or_http()
        .enable_http1()
        .build())
}

/// Restrict the token cache to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
