// Bearer-token authentication.
//
// The API issues JWT-shaped bearer tokens. The client never verifies the
// signature; it only reads the `exp` claim to decide whether a refused
// stream means "token expired". Token persistence goes through the
// `TokenStore` trait so callers pick the backing store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{ApiEnvelope, AuthTokens};
use crate::transport::{TransportConfig, endpoint};

// ── Claims ───────────────────────────────────────────────────────────

/// The subset of token claims the client reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued-at as seconds since the Unix epoch.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Subject (user id).
    #[serde(default, alias = "id", alias = "userId")]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Decode the payload segment of a JWT without verifying it.
    pub fn decode(token: &str) -> Result<Self, Error> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::InvalidToken("expected three dot-separated segments".into()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::InvalidToken(format!("payload is not base64url: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidToken(format!("payload is not JSON claims: {e}")))
    }

    /// Expiry as a timestamp, if the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

// ── Credential ───────────────────────────────────────────────────────

/// What a token's claims say about its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The `exp` claim.
    At(DateTime<Utc>),
    /// Claims decoded, but carry no `exp`.
    Never,
    /// Claims could not be decoded.
    Undecodable,
}

/// A bearer token plus the expiry read from its claims.
///
/// The decode format stays behind [`Credential::from_jwt`]; everything
/// else only asks [`is_expired`](Credential::is_expired).
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    expiry: Expiry,
}

impl Credential {
    /// Build a credential from a JWT-shaped bearer token.
    pub fn from_jwt(token: SecretString) -> Self {
        let expiry = match Claims::decode(token.expose_secret()) {
            Ok(claims) => claims.expires_at().map_or(Expiry::Never, Expiry::At),
            Err(e) => {
                debug!(error = %e, "bearer token claims undecodable");
                Expiry::Undecodable
            }
        };
        Self { token, expiry }
    }

    pub fn new(token: SecretString, expiry: Expiry) -> Self {
        Self { token, expiry }
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// The `exp` claim, when the token has one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.expiry {
            Expiry::At(at) => Some(at),
            Expiry::Never | Expiry::Undecodable => None,
        }
    }

    /// `true` when the expiry is in the past or the claims are
    /// undecodable. A token without `exp` never expires client-side.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Expiry::At(at) => at <= now,
            Expiry::Never => false,
            Expiry::Undecodable => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

// ── Token storage ────────────────────────────────────────────────────

/// Keys under which tokens are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    /// The bearer token sent with every request.
    Access,
    /// The long-lived token exchanged for a new bearer token.
    Refresh,
}

impl TokenKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "auth_token",
            Self::Refresh => "refresh_token",
        }
    }
}

/// Persistent storage for session tokens.
pub trait TokenStore: Send + Sync {
    fn load(&self, key: TokenKey) -> Option<SecretString>;
    fn save(&self, key: TokenKey, value: &SecretString) -> Result<(), Error>;
    fn remove(&self, key: TokenKey) -> Result<(), Error>;

    /// Remove every stored token.
    fn clear(&self) -> Result<(), Error> {
        self.remove(TokenKey::Access)?;
        self.remove(TokenKey::Refresh)
    }
}

/// In-process token store. Tokens vanish when the process exits.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<TokenKey, SecretString>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a bearer token.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        store
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TokenKey::Access, SecretString::from(token.into()));
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: TokenKey) -> Option<SecretString> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn save(&self, key: TokenKey, value: &SecretString) -> Result<(), Error> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        Ok(())
    }

    fn remove(&self, key: TokenKey) -> Result<(), Error> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}

// ── AuthClient ───────────────────────────────────────────────────────

/// HTTP client for the `/auth/*` endpoints.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AuthClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
        })
    }

    /// Create an auth client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Exchange email + password for tokens.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<AuthTokens, Error> {
        let url = endpoint(&self.base_url, "auth/login")?;
        debug!("logging in at {}", url);

        let body = json!({
            "email": email,
            "password": password.expose_secret(),
        });
        let resp = self.http.post(url).json(&body).send().await?;
        parse_tokens(resp).await
    }

    /// Exchange a refresh token for a new bearer token.
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthTokens, Error> {
        let url = endpoint(&self.base_url, "auth/refresh")?;
        debug!("refreshing bearer token at {}", url);

        let body = json!({ "refreshToken": refresh_token.expose_secret() });
        let resp = self.http.post(url).json(&body).send().await?;
        parse_tokens(resp).await
    }

    /// Invalidate the session server-side.
    pub async fn logout(&self, token: &SecretString) -> Result<(), Error> {
        let url = endpoint(&self.base_url, "auth/logout")?;
        debug!("logging out at {}", url);

        let resp = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                message: "logout rejected".into(),
            })
        }
    }
}

async fn parse_tokens(resp: reqwest::Response) -> Result<AuthTokens, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: envelope_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
        });
    }
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: envelope_message(&body).unwrap_or_else(|| preview(&body)),
        });
    }

    let envelope: ApiEnvelope<AuthTokens> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })?;

    match envelope.data {
        Some(tokens) if envelope.success => Ok(tokens),
        _ => Err(Error::Authentication {
            message: envelope
                .message
                .unwrap_or_else(|| "response carried no token".into()),
        }),
    }
}

fn envelope_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(String::from)
}

pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

// ── Session ──────────────────────────────────────────────────────────

/// Login state: the auth client plus wherever tokens are persisted.
///
/// Cheaply cloneable. The orders and stream clients read the bearer token
/// through [`Session::credential`] on every request, so a refresh is
/// picked up without rebuilding them.
#[derive(Clone)]
pub struct Session {
    auth: AuthClient,
    store: Arc<dyn TokenStore>,
}

impl Session {
    pub fn new(auth: AuthClient, store: Arc<dyn TokenStore>) -> Self {
        Self { auth, store }
    }

    /// The stored bearer token, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.store.load(TokenKey::Access).map(Credential::from_jwt)
    }

    /// Log in and persist the returned tokens.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Credential, Error> {
        let tokens = self.auth.login(email, password).await?;
        self.persist(tokens)
    }

    /// Refresh the bearer token using the stored refresh token.
    pub async fn refresh(&self) -> Result<Credential, Error> {
        let refresh_token = self
            .store
            .load(TokenKey::Refresh)
            .ok_or(Error::SessionExpired)?;
        let tokens = self.auth.refresh(&refresh_token).await?;
        self.persist(tokens)
    }

    /// Invalidate the session server-side (best effort) and forget it locally.
    pub async fn logout(&self) -> Result<(), Error> {
        if let Some(token) = self.store.load(TokenKey::Access) {
            if let Err(e) = self.auth.logout(&token).await {
                debug!(error = %e, "server-side logout failed (non-fatal)");
            }
        }
        self.clear()
    }

    /// Forget every stored token.
    pub fn clear(&self) -> Result<(), Error> {
        self.store.clear()
    }

    fn persist(&self, tokens: AuthTokens) -> Result<Credential, Error> {
        let access = SecretString::from(tokens.token);
        self.store.save(TokenKey::Access, &access)?;
        if let Some(refresh) = tokens.refresh_token {
            self.store
                .save(TokenKey::Refresh, &SecretString::from(refresh))?;
        }
        Ok(Credential::from_jwt(access))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jwt_with_payload(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decode_reads_exp_claim() {
        let token = jwt_with_payload(&json!({ "exp": 1_900_000_000, "sub": "u1" }));
        let claims = Claims::decode(&token).unwrap();
        assert_eq!(claims.exp, Some(1_900_000_000));
        assert_eq!(claims.sub.as_deref(), Some("u1"));
    }

    #[test]
    fn decode_rejects_non_jwt() {
        assert!(matches!(
            Claims::decode("not-a-token"),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            Claims::decode("a.!!!.c"),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn credential_expiry_compares_against_now() {
        let now = Utc::now();
        let past = jwt_with_payload(&json!({ "exp": now.timestamp() - 60 }));
        let future = jwt_with_payload(&json!({ "exp": now.timestamp() + 3600 }));

        assert!(Credential::from_jwt(SecretString::from(past)).is_expired(now));
        assert!(!Credential::from_jwt(SecretString::from(future)).is_expired(now));
    }

    #[test]
    fn undecodable_credential_counts_as_expired() {
        let credential = Credential::from_jwt(SecretString::from("opaque".to_string()));
        assert_eq!(credential.expiry(), Expiry::Undecodable);
        assert!(credential.is_expired(Utc::now()));
    }

    #[test]
    fn credential_without_exp_claim_never_expires() {
        let token = jwt_with_payload(&json!({ "sub": "u1", "role": "admin" }));
        let credential = Credential::from_jwt(SecretString::from(token));
        assert_eq!(credential.expiry(), Expiry::Never);
        assert!(credential.expires_at().is_none());
        assert!(!credential.is_expired(Utc::now()));
    }

    #[test]
    fn credential_debug_redacts_token() {
        let credential = Credential::new(SecretString::from("secret-token".to_string()), Expiry::Never);
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemoryTokenStore::with_access_token("abc");
        store
            .save(TokenKey::Refresh, &SecretString::from("def".to_string()))
            .unwrap();
        assert_eq!(
            store.load(TokenKey::Access).unwrap().expose_secret(),
            "abc"
        );

        store.clear().unwrap();
        assert!(store.load(TokenKey::Access).is_none());
        assert!(store.load(TokenKey::Refresh).is_none());
    }
}
