//! Bearer-token lifecycle for the REST API.
//!
//! [`TokenAuthority`] owns the only copy of the session token. Callers invoke
//! [`TokenAuthority::ensure_valid`] before every dependent remote call; it
//! re-authenticates whenever no token is held or the held token is within
//! [`SAFETY_MARGIN_SECS`] of its expiry, so a call is never sent with a token
//! already known to be expired.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{ApiConfig, Credentials};
use crate::contract::{Clock, SystemClock, TokenExchange};
use crate::error::AuthError;

/// Remaining lifetime, in seconds, below which a token is treated as expired.
pub const SAFETY_MARGIN_SECS: i64 = 10 * 60;

pub const TOKEN_PATH: &str = "/v1/oauth/token";
const GRANT_TYPE: &str = "password";
const SCOPE: &str = "eseis";

/// Body of the password-grant request.
#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
    client_id: &'a str,
    grant_type: &'a str,
    scope: &'a str,
}

/// Successful response of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Epoch seconds.
    pub created_at: i64,
    /// Seconds after `created_at`.
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_value: String,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionToken {
    pub fn from_grant(grant: TokenGrant) -> Result<Self, AuthError> {
        if grant.access_token.is_empty() {
            return Err(AuthError::Malformed("empty access_token".into()));
        }
        let issued_at = DateTime::from_timestamp(grant.created_at, 0).ok_or_else(|| {
            AuthError::Malformed(format!("invalid created_at {}", grant.created_at))
        })?;
        let expires_at = grant
            .created_at
            .checked_add(grant.expires_in)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| AuthError::Malformed(format!("invalid expires_in {}", grant.expires_in)))?;
        Ok(SessionToken {
            value: grant.access_token,
            issued_at,
            expires_at,
            refresh_value: grant.refresh_token,
        })
    }

    /// A token is usable only while `now < expires_at - SAFETY_MARGIN_SECS`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(SAFETY_MARGIN_SECS)
    }
}

pub struct TokenAuthority<E, C = SystemClock> {
    exchange: E,
    clock: C,
    token: Option<SessionToken>,
}

impl<E: TokenExchange> TokenAuthority<E, SystemClock> {
    pub fn new(exchange: E) -> Self {
        Self::with_clock(exchange, SystemClock)
    }
}

impl<E: TokenExchange, C: Clock> TokenAuthority<E, C> {
    pub fn with_clock(exchange: E, clock: C) -> Self {
        Self {
            exchange,
            clock,
            token: None,
        }
    }

    /// Re-authenticates unless the held token is still usable.
    ///
    /// On success the previous token is replaced wholesale. On failure the
    /// previous token is dropped as well, so no later call can reuse it.
    pub async fn ensure_valid(&mut self) -> Result<(), AuthError> {
        let now = self.clock.now();
        if let Some(token) = &self.token {
            if token.is_usable_at(now) {
                return Ok(());
            }
            debug!(expires_at = %token.expires_at, "[AUTH] Token within safety margin, refreshing");
        }

        self.token = None;
        let grant = self.exchange.exchange().await.map_err(|e| {
            error!(error = %e, "[AUTH] Credential exchange failed");
            e
        })?;
        let token = SessionToken::from_grant(grant)?;
        if token.expires_at <= now {
            error!(expires_at = %token.expires_at, "[AUTH] Token endpoint returned an expired token");
            return Err(AuthError::Malformed(format!(
                "token already expired at {}",
                token.expires_at
            )));
        }
        info!(expires_at = %token.expires_at, "[AUTH] Authenticated");
        self.token = Some(token);
        Ok(())
    }

    /// Value to attach as bearer credential, if authenticated.
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.value.as_str())
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }
}

/// Password-grant exchange against the REST token endpoint.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    credentials: Credentials,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client, api: &ApiConfig, credentials: Credentials) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", api.base_url.trim_end_matches('/'), TOKEN_PATH),
            client_id: api.client_id.clone(),
            credentials,
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self) -> Result<TokenGrant, AuthError> {
        let body = AuthRequest {
            username: &self.credentials.username,
            password: &self.credentials.password,
            client_id: &self.client_id,
            grant_type: GRANT_TYPE,
            scope: SCOPE,
        };
        info!(endpoint = %self.endpoint, username = %self.credentials.username, "[AUTH] Requesting token");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| AuthError::Request {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| AuthError::Request {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}
