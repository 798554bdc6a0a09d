//! App-credential lifecycle: converts the long-lived app identity into
//! short-lived, repository-scoped installation tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::review::RepoId;

/// App assertions live for ten minutes, backdated a minute for clock skew.
const ASSERTION_TTL_SECS: u64 = 600;
const ASSERTION_BACKDATE_SECS: u64 = 60;

/// A cached token is reused until it is within this margin of expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

const EXCHANGE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

/// A repository-scoped installation token. Lives only in process memory
/// and is replaced, not mutated, on expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn is_fresh(&self, margin: Duration) -> bool {
        (self.expires_at - Utc::now()).num_seconds() > margin.as_secs() as i64
    }
}

// The secret must never reach logs or error messages.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

/// Mints signed app assertions and exchanges them for installation
/// tokens, cached per repository owner.
pub struct CredentialBroker {
    client: Client,
    api_base: String,
    app_id: u64,
    signing_key: EncodingKey,
    tokens: RwLock<HashMap<String, AccessToken>>,
    /// Per-owner gates ensuring at most one in-flight exchange per owner.
    exchange_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for CredentialBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBroker")
            .field("api_base", &self.api_base)
            .field("app_id", &self.app_id)
            .field("signing_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CredentialBroker {
    /// Parses the key material eagerly so that a malformed private key is
    /// a startup failure rather than a failure on the first webhook.
    pub fn new(app_id: u64, private_key_pem: &str, api_base: impl Into<String>) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid app private key: {e}")))?;

        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            app_id,
            signing_key,
            tokens: RwLock::new(HashMap::new()),
            exchange_gates: Mutex::new(HashMap::new()),
        })
    }

    /// Return a token scoped to the repository's owner, minting a new one
    /// only when the cached token is missing or near expiry. Concurrent
    /// callers for the same owner share a single exchange.
    pub async fn get_token(&self, repo: &RepoId) -> Result<AccessToken> {
        if let Some(token) = self.cached(&repo.owner).await {
            return Ok(token);
        }

        let gate = {
            let mut gates = self.exchange_gates.lock().await;
            gates
                .entry(repo.owner.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _exchange = gate.lock().await;

        // Another caller may have finished the exchange while we waited.
        if let Some(token) = self.cached(&repo.owner).await {
            return Ok(token);
        }

        let token = self.exchange(repo).await?;
        self.tokens
            .write()
            .await
            .insert(repo.owner.clone(), token.clone());
        info!(owner = %repo.owner, "obtained installation access token");
        Ok(token)
    }

    /// Drop the cached token for an owner, forcing a fresh exchange on
    /// the next `get_token`. Used after the provider rejects a token.
    pub async fn invalidate(&self, owner: &str) {
        self.tokens.write().await.remove(owner);
    }

    async fn cached(&self, owner: &str) -> Option<AccessToken> {
        self.tokens
            .read()
            .await
            .get(owner)
            .filter(|token| token.is_fresh(REFRESH_MARGIN))
            .cloned()
    }

    fn sign_assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Configuration(format!("system clock error: {e}")))?
            .as_secs();

        let claims = AppClaims {
            iss: self.app_id,
            iat: now - ASSERTION_BACKDATE_SECS,
            exp: now + ASSERTION_TTL_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| Error::Configuration(format!("failed to sign app assertion: {e}")))
    }

    async fn exchange(&self, repo: &RepoId) -> Result<AccessToken> {
        let assertion = self.sign_assertion()?;
        let installation_id = self.lookup_installation(repo, &assertion).await?;
        self.issue_token(installation_id, &assertion).await
    }

    async fn lookup_installation(&self, repo: &RepoId, assertion: &str) -> Result<u64> {
        let url = format!(
            "{}/repos/{}/{}/installation",
            self.api_base, repo.owner, repo.name
        );

        let response = self
            .send_with_backoff(|| {
                self.client
                    .get(&url)
                    .header("Authorization", format!("Bearer {assertion}"))
                    .header("Accept", "application/vnd.github.v3+json")
            })
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::Auth(format!(
                "app is not installed for owner '{}'",
                repo.owner
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Auth("provider rejected the app assertion".to_string()))
            }
            status if status.is_success() => {
                let installation: InstallationResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Network(format!("malformed installation response: {e}")))?;
                Ok(installation.id)
            }
            status => Err(Error::Provider {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn issue_token(&self, installation_id: u64, assertion: &str) -> Result<AccessToken> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );

        let response = self
            .send_with_backoff(|| {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {assertion}"))
                    .header("Accept", "application/vnd.github.v3+json")
            })
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Auth("provider rejected the app assertion".to_string()))
            }
            status if status.is_success() => {
                let body: InstallationTokenResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Network(format!("malformed token response: {e}")))?;

                let expires_at = DateTime::parse_from_rfc3339(&body.expires_at)
                    .map_err(|e| Error::Auth(format!("unparseable token expiry: {e}")))?
                    .with_timezone(&Utc);

                Ok(AccessToken {
                    secret: body.token,
                    expires_at,
                })
            }
            status => Err(Error::Provider {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Bounded exponential backoff for transient failures during the
    /// exchange. Non-5xx responses are returned to the caller for
    /// status-specific mapping.
    async fn send_with_backoff<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(response)
                    if response.status().is_server_error() && attempt < EXCHANGE_ATTEMPTS =>
                {
                    warn!(
                        status = %response.status(),
                        attempt,
                        "transient provider failure during token exchange, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(err) if attempt < EXCHANGE_ATTEMPTS => {
                    warn!(error = %err, attempt, "network failure during token exchange, retrying");
                }
                Err(err) => return Err(Error::Network(err.to_string())),
            }
            tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1))).await;
        }
    }
}
