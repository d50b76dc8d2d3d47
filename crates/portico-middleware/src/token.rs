//! Session token retrieval and verification.
//!
//! The auth stage depends on two seams:
//!
//! - [`TokenSource`] reads the raw session token from a request. The default
//!   [`CookieTokenSource`] reads the `auth_token` cookie.
//! - [`TokenVerifier`] checks the token. The default [`JwtVerifier`] checks
//!   an HMAC-signed JWT against a shared secret.
//!
//! Verification never fails with an error. It returns a [`Verification`]
//! that says exactly why a token was not accepted, and the auth stage treats
//! every non-valid result as "no session".

use crate::cookies::Cookies;
use crate::error::{MiddlewareError, PipelineError};
use crate::types::Request;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "auth_token";

/// Claims read from a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtPayload {
    /// Subject (user id).
    pub sub: String,
    /// Expiration (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Result of verifying a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Signature and claims check out.
    Valid(JwtPayload),
    /// Signature checks out but the token has expired.
    Expired,
    /// Bad signature, wrong algorithm or otherwise rejected.
    Invalid,
    /// Not a decodable token at all.
    Malformed,
}

impl Verification {
    /// Returns the payload of a valid token.
    #[must_use]
    pub fn payload(&self) -> Option<&JwtPayload> {
        match self {
            Self::Valid(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns `true` for [`Verification::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Malformed => "malformed",
        }
    }
}

/// Checks session tokens.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies `token`.
    fn verify(&self, token: &str) -> Verification;
}

/// HMAC JWT verifier.
///
/// `exp` is optional; when present it is enforced with no clock leeway
/// unless [`with_leeway`](Self::with_leeway) says otherwise. Audience is not
/// checked.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates an HS256 verifier.
    pub fn hs256(secret: &[u8]) -> Result<Self, PipelineError> {
        Self::new(secret, Algorithm::HS256)
    }

    /// Creates a verifier for an algorithm given by name (`"HS256"`, ...).
    pub fn from_algorithm_name(secret: &[u8], algorithm: &str) -> Result<Self, PipelineError> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|_| {
            PipelineError::InvalidVerifier(format!("unknown algorithm `{algorithm}`"))
        })?;
        Self::new(secret, algorithm)
    }

    /// Creates a verifier for the given HMAC algorithm.
    ///
    /// # Errors
    ///
    /// Fails if the secret is empty or the algorithm is not HMAC.
    pub fn new(secret: &[u8], algorithm: Algorithm) -> Result<Self, PipelineError> {
        if secret.is_empty() {
            return Err(PipelineError::InvalidVerifier(
                "JWT secret must not be empty".to_string(),
            ));
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(PipelineError::InvalidVerifier(format!(
                "unsupported algorithm {algorithm:?}, expected HS256, HS384 or HS512"
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub"]);

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sets the allowed clock skew for `exp`, in seconds.
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.validation.leeway = leeway_secs;
        self
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Verification {
        match decode::<JwtPayload>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Verification::Valid(data.claims),
            Err(e) => {
                let verification = match e.kind() {
                    ErrorKind::ExpiredSignature => Verification::Expired,
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_)
                    | ErrorKind::MissingRequiredClaim(_) => Verification::Malformed,
                    _ => Verification::Invalid,
                };
                tracing::debug!(
                    error = %e,
                    result = verification.label(),
                    "JWT verification failed"
                );
                verification
            }
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

/// Reads the raw session token from a request.
pub trait TokenSource: Send + Sync + 'static {
    /// Returns the token, `None` when the request carries none.
    fn token(&self, request: &Request) -> Result<Option<String>, MiddlewareError>;
}

/// Reads the session token from a cookie.
#[derive(Debug, Clone)]
pub struct CookieTokenSource {
    cookie_name: String,
}

impl CookieTokenSource {
    /// Reads the token from the named cookie.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    /// Returns the cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

impl Default for CookieTokenSource {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME)
    }
}

impl TokenSource for CookieTokenSource {
    fn token(&self, request: &Request) -> Result<Option<String>, MiddlewareError> {
        let cookies = Cookies::from_headers(request.headers());
        Ok(cookies
            .get(&self.cookie_name)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request as HttpRequest;
    use http_body_util::Full;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    #[derive(Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        exp: Option<i64>,
    }

    fn sign(claims: &Claims<'_>, secret: &[u8], algorithm: Algorithm) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn in_one_hour() -> Option<i64> {
        Some(chrono::Utc::now().timestamp() + 3600)
    }

    #[test]
    fn test_valid_token() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let exp = in_one_hour();
        let token = sign(&Claims { sub: "user-1", exp }, SECRET, Algorithm::HS256);

        let verification = verifier.verify(&token);
        let payload = verification.payload().unwrap();
        assert_eq!(payload.sub, "user-1");
        assert_eq!(payload.exp, exp.map(|e| e as u64));
    }

    #[test]
    fn test_token_without_exp_is_valid() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let token = sign(&Claims { sub: "user-1", exp: None }, SECRET, Algorithm::HS256);

        let verification = verifier.verify(&token);
        assert!(verification.is_valid());
        assert_eq!(verification.payload().unwrap().exp, None);
    }

    #[test]
    fn test_verification_is_idempotent() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let token = sign(
            &Claims {
                sub: "user-1",
                exp: in_one_hour(),
            },
            SECRET,
            Algorithm::HS256,
        );

        let first = verifier.verify(&token);
        let second = verifier.verify(&token);
        assert!(first.is_valid());
        assert_eq!(first, second);
    }

    #[test]
    fn test_expired_token() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let exp = Some(chrono::Utc::now().timestamp() - 10);
        let token = sign(&Claims { sub: "user-1", exp }, SECRET, Algorithm::HS256);

        assert_eq!(verifier.verify(&token), Verification::Expired);
    }

    #[test]
    fn test_leeway_accepts_recently_expired_token() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap().with_leeway(60);
        let exp = Some(chrono::Utc::now().timestamp() - 10);
        let token = sign(&Claims { sub: "user-1", exp }, SECRET, Algorithm::HS256);

        assert!(verifier.verify(&token).is_valid());
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let token = sign(
            &Claims {
                sub: "user-1",
                exp: in_one_hour(),
            },
            b"other-secret",
            Algorithm::HS256,
        );

        assert_eq!(verifier.verify(&token), Verification::Invalid);
    }

    #[test]
    fn test_wrong_algorithm_is_invalid() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        let token = sign(
            &Claims {
                sub: "user-1",
                exp: in_one_hour(),
            },
            SECRET,
            Algorithm::HS512,
        );

        assert_eq!(verifier.verify(&token), Verification::Invalid);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let verifier = JwtVerifier::hs256(SECRET).unwrap();
        assert_eq!(verifier.verify("not-a-jwt"), Verification::Malformed);
    }

    #[test]
    fn test_rejects_empty_secret_and_non_hmac_algorithm() {
        assert!(matches!(
            JwtVerifier::hs256(b""),
            Err(PipelineError::InvalidVerifier(_))
        ));
        assert!(matches!(
            JwtVerifier::new(SECRET, Algorithm::RS256),
            Err(PipelineError::InvalidVerifier(_))
        ));
        assert!(matches!(
            JwtVerifier::from_algorithm_name(SECRET, "HS999"),
            Err(PipelineError::InvalidVerifier(_))
        ));
        assert!(JwtVerifier::from_algorithm_name(SECRET, "HS384").is_ok());
    }

    #[test]
    fn test_cookie_token_source() {
        let source = CookieTokenSource::default();
        assert_eq!(source.cookie_name(), "auth_token");

        let request = HttpRequest::builder()
            .uri("/dashboard")
            .header("cookie", "theme=dark; auth_token=abc")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(source.token(&request).unwrap().as_deref(), Some("abc"));

        let request = HttpRequest::builder()
            .uri("/dashboard")
            .header("cookie", "auth_token=")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(source.token(&request).unwrap(), None);
    }

    #[test]
    fn test_verification_labels() {
        assert_eq!(Verification::Expired.label(), "expired");
        assert_eq!(Verification::Invalid.label(), "invalid");
        assert_eq!(Verification::Malformed.label(), "malformed");
        assert!(Verification::Malformed.payload().is_none());
    }
}
