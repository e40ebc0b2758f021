//! Bearer credentials for the link service
//!
//! A `CredentialProvider` hands the sync engine a short-lived bearer token
//! for an account. `OAuthTokenProvider` keeps one token file per account in
//! the config directory and refreshes it with the refresh-token grant.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::client::build_agent;

/// Short-lived bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the Authorization header
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Why no token could be produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The user has to sign in (again) before sync can proceed
    #[error("sign-in required: {0}")]
    UserRecoverable(String),
    /// Credentials for this account can never be obtained as configured
    #[error("credentials unusable: {0}")]
    Permanent(String),
    /// The credential service could not be reached; try again later
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

impl CredentialError {
    pub fn needs_user_action(&self) -> bool {
        matches!(self, CredentialError::UserRecoverable(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::Unavailable(_))
    }
}

/// Source of bearer tokens for an account
pub trait CredentialProvider: Send + Sync {
    fn token(&self, account: &str) -> Result<BearerToken, CredentialError>;

    /// Drop a token the remote rejected so the next request gets a fresh one
    fn invalidate(&self, account: &str, token: &BearerToken) {
        let _ = (account, token);
    }
}

/// Fixed tokens, for tests and pre-provisioned deployments
pub struct StaticTokenProvider {
    default_token: Option<String>,
    tokens: RwLock<HashMap<String, String>>,
    failure: RwLock<Option<CredentialError>>,
    invalidations: AtomicUsize,
}

impl StaticTokenProvider {
    /// Hand out the same token for every account
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            default_token: Some(token.into()),
            tokens: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            invalidations: AtomicUsize::new(0),
        }
    }

    /// Only accounts added with `with_account` get a token
    pub fn empty() -> Self {
        Self {
            default_token: None,
            tokens: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            invalidations: AtomicUsize::new(0),
        }
    }

    pub fn with_account(self, account: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.write().insert(account.into(), token.into());
        self
    }

    /// Fail every request with this error until cleared with `None`
    pub fn set_failure(&self, failure: Option<CredentialError>) {
        *self.failure.write() = failure;
    }

    /// Number of tokens reported as rejected
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn token(&self, account: &str) -> Result<BearerToken, CredentialError> {
        if let Some(failure) = self.failure.read().clone() {
            return Err(failure);
        }
        self.tokens
            .read()
            .get(account)
            .or(self.default_token.as_ref())
            .map(|token| BearerToken::new(token.clone()))
            .ok_or_else(|| {
                CredentialError::UserRecoverable(format!("no token configured for {account}"))
            })
    }

    fn invalidate(&self, account: &str, _token: &BearerToken) {
        debug!("Token for {} reported as rejected", account);
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stored token data
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// OAuth2 tokens stored per account, refreshed on demand
pub struct OAuthTokenProvider {
    client_id: String,
    client_secret: String,
    token_url: String,
    token_dir: PathBuf,
    agent: ureq::Agent,
    /// Serializes load-refresh-save so two passes never refresh at once
    refresh_lock: Mutex<()>,
}

impl OAuthTokenProvider {
    /// Tokens within this many seconds of expiry are refreshed first
    const EXPIRY_MARGIN_SECS: i64 = 300;

    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        token_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
            token_dir: token_dir.into(),
            agent: build_agent(timeout),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Build from settings, keeping tokens in the config directory
    pub fn from_settings(settings: &crate::LinksSettings) -> Result<Self> {
        let client_id = settings
            .client_id
            .clone()
            .context("No OAuth client id configured (set LINKSYNC_CLIENT_ID)")?;
        let token_dir = config::ensure_config_dir()?;
        Ok(Self::new(
            client_id,
            settings.client_secret.clone().unwrap_or_default(),
            settings.token_url.clone(),
            token_dir,
            settings.request_timeout(),
        ))
    }

    /// Path of the token file for an account
    ///
    /// The account is percent-encoded, so distinct accounts never share a
    /// file and separators can't escape the token directory.
    pub fn token_path(&self, account: &str) -> PathBuf {
        let name = urlencoding::encode(account);
        self.token_dir.join(format!("token-{name}.json"))
    }

    /// Store a refresh token for an account
    ///
    /// The access token is left expired, so the first request refreshes it.
    pub fn store_refresh_token(&self, account: &str, refresh_token: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock();
        let stored = StoredToken {
            access_token: String::new(),
            refresh_token: Some(refresh_token.to_string()),
            expires_at: Some(0),
        };
        config::save_json_file(&self.token_path(account), &stored)?;
        info!("Stored credentials for {}", account);
        Ok(())
    }

    fn load_token(&self, account: &str) -> Result<StoredToken, CredentialError> {
        let path = self.token_path(account);
        match config::load_json_file_opt(&path) {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(CredentialError::UserRecoverable(format!(
                "no stored credentials for {account}"
            ))),
            Err(e) => Err(CredentialError::Permanent(format!("{e:#}"))),
        }
    }

    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, CredentialError> {
        let result = self.agent.post(&self.token_url).send_form([
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        match result {
            Ok(mut response) => response.body_mut().read_json().map_err(|e| {
                CredentialError::Unavailable(format!("malformed token response: {e}"))
            }),
            Err(ureq::Error::StatusCode(status @ (400 | 401))) => {
                Err(CredentialError::UserRecoverable(format!(
                    "refresh token rejected (HTTP {status})"
                )))
            }
            Err(ureq::Error::StatusCode(status)) => Err(CredentialError::Unavailable(format!(
                "token endpoint returned HTTP {status}"
            ))),
            Err(e) => Err(CredentialError::Unavailable(e.to_string())),
        }
    }
}

impl CredentialProvider for OAuthTokenProvider {
    fn token(&self, account: &str) -> Result<BearerToken, CredentialError> {
        let _guard = self.refresh_lock.lock();
        let stored = self.load_token(account)?;

        let now = Utc::now().timestamp();
        if !stored.access_token.is_empty()
            && stored
                .expires_at
                .is_some_and(|expires_at| expires_at > now + Self::EXPIRY_MARGIN_SECS)
        {
            return Ok(BearerToken::new(stored.access_token));
        }

        let refresh_token = stored.refresh_token.ok_or_else(|| {
            CredentialError::UserRecoverable(format!(
                "token for {account} expired and no refresh token is stored"
            ))
        })?;

        debug!("Refreshing access token for {}", account);
        let response = self.refresh_access_token(&refresh_token)?;
        let refreshed = StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(Some(refresh_token)),
            expires_at: response.expires_in.map(|secs| now + secs as i64),
        };

        if let Err(e) = config::save_json_file(&self.token_path(account), &refreshed) {
            warn!("Failed to persist refreshed token for {}: {:#}", account, e);
        }
        Ok(BearerToken::new(refreshed.access_token))
    }

    fn invalidate(&self, account: &str, token: &BearerToken) {
        let _guard = self.refresh_lock.lock();
        let Ok(mut stored) = self.load_token(account) else {
            return;
        };
        if stored.access_token != token.as_str() {
            return;
        }
        stored.expires_at = Some(0);
        match config::save_json_file(&self.token_path(account), &stored) {
            Ok(()) => debug!("Invalidated cached token for {}", account),
            Err(e) => warn!("Failed to invalidate token for {}: {:#}", account, e),
        }
    }
}
