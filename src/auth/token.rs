//! Session tokens: HS256 signed JWTs over [`SessionClaims`].
//!
//! Wire form is `base64url(header).base64url(claims).base64url(signature)`,
//! unpadded, with the signature being HMAC-SHA-256 over the first two parts.
//!
//! Verification order is structure, signature, claims, then the time window
//! (`nbf <= now <= exp`). Refreshing uses [`Validation::allow_expired`], a
//! parse mode local to that call; the clock itself is never altered.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{clock::Clock, error::TokenError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
pub const DEFAULT_ISSUER: &str = "sesame";
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// The authenticated principal and its validity window.
#[derive(ToSchema, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Clone)]
pub struct TokenConfig {
    signing_key: SecretString,
    issuer: String,
    session_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key,
            issuer: DEFAULT_ISSUER.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("signing_key", &"***")
            .field("issuer", &self.issuer)
            .field("session_ttl", &self.session_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Which time checks a parse applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validation {
    check_expiry: bool,
}

impl Validation {
    #[must_use]
    pub const fn strict() -> Self {
        Self { check_expiry: true }
    }

    /// Everything except the expiry check. Only refresh uses this.
    #[must_use]
    pub const fn allow_expired() -> Self {
        Self {
            check_expiry: false,
        }
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

pub struct TokenService {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    #[must_use]
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.config.signing_key.expose_secret().as_bytes())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Claims for a freshly authenticated principal, valid from now for the
    /// configured session lifetime.
    #[must_use]
    pub fn claims_for(&self, sub: i64, name: &str, email: &str, avatar: &str) -> SessionClaims {
        let now = self.clock.now();
        SessionClaims {
            sub,
            name: name.to_string(),
            email: email.to_string(),
            avatar: avatar.to_string(),
            nbf: now,
            exp: now.saturating_add(seconds(self.config.session_ttl)),
            iss: self.config.issuer.clone(),
        }
    }

    /// Sign claims into a compact token.
    ///
    /// # Errors
    ///
    /// `TokenError::Invalid` if `exp` is not after `nbf`, `TokenError::Signing`
    /// if the key or encoder fails.
    #[instrument(skip_all, fields(sub = claims.sub))]
    pub fn create_token(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        if claims.exp <= claims.nbf {
            return Err(TokenError::Invalid);
        }

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        debug!(exp = claims.exp, "token signed");

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// One of `Malformed`, `Invalid`, `Expired` or `NotYetValid`.
    pub fn parse_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.parse_with(token, Validation::strict())
    }

    /// Verify a token with an explicit set of time checks.
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::parse_token`], minus `Expired` when the
    /// validation skips expiry.
    pub fn parse_with(
        &self,
        token: &str,
        validation: Validation,
    ) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let signature_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Invalid);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Invalid)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;

        let now = self.clock.now();
        if validation.check_expiry && now > claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }

    /// Re-sign a token's claims with a new expiry of now plus the refresh
    /// window. Expired tokens are accepted; nothing else is relaxed.
    ///
    /// # Errors
    ///
    /// Any non-expiry parse failure, or a signing failure.
    #[instrument(skip_all)]
    pub fn refresh_token(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.parse_with(token, Validation::allow_expired())?;
        let refreshed = SessionClaims {
            exp: self
                .clock
                .now()
                .saturating_add(seconds(self.config.refresh_ttl)),
            ..claims
        };
        self.create_token(&refreshed)
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}
