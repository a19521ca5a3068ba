//! Access token lifecycle: reuse an unexpired token from a directory's
//! `.env`, otherwise request a fresh one from the identity provider.

use std::path::Path;

use serde::Serialize;

use crate::config::{
    ImsCredentials, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_IMS_ORG_ID, ENV_PRIVATE_KEY,
    ENV_TECHNICAL_ACCOUNT_ID,
};
use crate::env_file;
use crate::error::{Error, Result};

pub const TOKEN_KEY: &str = "AIO_IMS_CONTEXTS_CLI_ACCESS__TOKEN_TOKEN";
pub const TOKEN_EXPIRY_KEY: &str = "AIO_IMS_CONTEXTS_CLI_ACCESS__TOKEN_EXPIRY";

/// Local reuse window. Not derived from anything the provider returns.
pub const TOKEN_LIFETIME_MS: i64 = 30 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthToken {
    pub token: String,
    /// Absolute expiry, epoch milliseconds.
    pub expiry: i64,
}

impl AuthToken {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.token.is_empty() && now_ms < self.expiry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenOrigin {
    Cached,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: AuthToken,
    pub origin: TokenOrigin,
}

/// Full credential payload for one token request.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub technical_account_id: String,
    pub ims_org_id: String,
    pub private_key: String,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("client_id", &self.client_id)
            .field("technical_account_id", &self.technical_account_id)
            .field("ims_org_id", &self.ims_org_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenRequest {
    /// Fails on the first missing credential.
    pub fn from_credentials(creds: &ImsCredentials) -> Result<Self> {
        let require = |value: &Option<String>, key: &str| {
            value.clone().ok_or_else(|| {
                Error::config_missing_key(key, None)
                    .with_hint(format!("Set {} to request a new access token", key))
            })
        };

        Ok(Self {
            client_id: require(&creds.client_id, ENV_CLIENT_ID)?,
            client_secret: require(&creds.client_secret, ENV_CLIENT_SECRET)?,
            technical_account_id: require(&creds.technical_account_id, ENV_TECHNICAL_ACCOUNT_ID)?,
            ims_org_id: require(&creds.ims_org_id, ENV_IMS_ORG_ID)?,
            private_key: require(&creds.private_key, ENV_PRIVATE_KEY)?,
            scopes: creds.scopes.clone(),
        })
    }
}

/// Stateless exchange of a credential payload for a bearer token.
pub trait IdentityProvider {
    fn request_token(&self, request: &TokenRequest) -> Result<String>;
}

/// What the pipeline needs from token handling.
pub trait TokenSource {
    fn resolve_token(&self, dir: &Path) -> Result<ResolvedToken>;
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Read the cached token for `dir` if it is still usable at `now_ms`.
pub fn cached_token(dir: &Path, now_ms: i64) -> Option<AuthToken> {
    let entries = env_file::load(dir).ok()?;
    let token = entries.get(TOKEN_KEY)?.to_string();
    let expiry = entries.get(TOKEN_EXPIRY_KEY)?.parse::<i64>().ok()?;
    let cached = AuthToken { token, expiry };
    cached.is_valid_at(now_ms).then_some(cached)
}

/// Write both token keys into `dir`'s store.
pub fn persist(token: &AuthToken, dir: &Path) -> Result<()> {
    env_file::set(TOKEN_KEY, &token.token, dir)?;
    env_file::set(TOKEN_EXPIRY_KEY, &token.expiry.to_string(), dir)
}

pub struct TokenProvider<'a> {
    credentials: &'a ImsCredentials,
    provider: &'a dyn IdentityProvider,
    clock: fn() -> i64,
}

impl<'a> TokenProvider<'a> {
    pub fn new(credentials: &'a ImsCredentials, provider: &'a dyn IdentityProvider) -> Self {
        Self {
            credentials,
            provider,
            clock: now_millis,
        }
    }

    /// Replace the wall clock (epoch millis).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn get_auth_token(&self, dir: &Path) -> Result<AuthToken> {
        self.resolve_token(dir).map(|resolved| resolved.token)
    }

    fn generate(&self) -> Result<AuthToken> {
        let request = TokenRequest::from_credentials(self.credentials)?;
        let token = self.provider.request_token(&request)?;
        let issued_at = (self.clock)();
        crate::log_debug!("auth", "Generated auth token successfully");

        Ok(AuthToken {
            token,
            expiry: issued_at + TOKEN_LIFETIME_MS,
        })
    }
}

impl TokenSource for TokenProvider<'_> {
    fn resolve_token(&self, dir: &Path) -> Result<ResolvedToken> {
        let now = (self.clock)();
        if let Some(token) = cached_token(dir, now) {
            crate::log_debug!(
                "auth",
                "Reusing cached token for {} (expires in {}s)",
                dir.display(),
                (token.expiry - now) / 1000
            );
            return Ok(ResolvedToken {
                token,
                origin: TokenOrigin::Cached,
            });
        }

        crate::log_debug!("auth", "No usable token in {}, requesting one", dir.display());
        Ok(ResolvedToken {
            token: self.generate()?,
            origin: TokenOrigin::Generated,
        })
    }
}
