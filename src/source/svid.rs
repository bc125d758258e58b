//! Type-State JWT-SVID with compile-time validation guarantees
//!
//! A token moves through `Unverified -> SignatureVerified -> Validated`;
//! the identity can only be read from a `Validated` token.

use std::marker::PhantomData;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthHelperError;
use crate::source::bundle::JwtBundleSet;
use crate::source::Identity;
use crate::spiffe::SpiffeId;

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
pub const CLOCK_LEEWAY_SECS: i64 = 60;

/// Algorithms a JWT-SVID may be signed with.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    pub trait Sealed {}
}

/// Marker trait for validation states
pub trait SvidState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Parsed, nothing verified
pub struct Unverified;
impl private::Sealed for Unverified {}
impl SvidState for Unverified {
    fn state_name() -> &'static str {
        "Unverified"
    }
}

/// Signature checked against the trust domain's bundle
pub struct SignatureVerified;
impl private::Sealed for SignatureVerified {}
impl SvidState for SignatureVerified {
    fn state_name() -> &'static str {
        "SignatureVerified"
    }
}

/// Signature, lifetime and audience checked
pub struct Validated;
impl private::Sealed for Validated {}
impl SvidState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Audience::Many(Vec::new())
    }
}

impl Audience {
    fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    fn to_vec(&self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud.clone()],
            Audience::Many(auds) => auds.clone(),
        }
    }
}

/// Registered claims a JWT-SVID carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvidClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Type-state JWT-SVID wrapper
pub struct JwtSvid<State: SvidState> {
    raw: String,
    header: Header,
    kid: String,
    claims: SvidClaims,
    spiffe_id: SpiffeId,
    _state: PhantomData<State>,
}

impl JwtSvid<Unverified> {
    /// Parses a compact JWT without verifying anything but its shape, the
    /// algorithm, the key ID and the subject.
    pub fn parse(raw: &str) -> Result<Self, AuthHelperError> {
        let header = decode_header(raw)
            .map_err(|e| AuthHelperError::malformed(format!("invalid header: {e}")))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthHelperError::UnsupportedAlgorithm {
                alg: format!("{:?}", header.alg),
            });
        }

        let kid = header
            .kid
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthHelperError::MissingKeyId)?;

        let claims = decode_claims_unverified(raw)?;
        let spiffe_id = SpiffeId::parse(&claims.sub)?;

        Ok(JwtSvid {
            raw: raw.to_string(),
            header,
            kid,
            claims,
            spiffe_id,
            _state: PhantomData,
        })
    }

    /// Verifies the signature with the authority of the subject's trust domain.
    pub fn verify_signature(
        self,
        bundles: &JwtBundleSet,
    ) -> Result<JwtSvid<SignatureVerified>, AuthHelperError> {
        let trust_domain = self.spiffe_id.trust_domain();
        let bundle = bundles
            .get(trust_domain)
            .ok_or_else(|| AuthHelperError::BundleUnavailable {
                trust_domain: trust_domain.to_string(),
            })?;
        let key = bundle
            .find_authority(&self.kid)
            .ok_or_else(|| AuthHelperError::KeyNotFound {
                kid: self.kid.clone(),
                trust_domain: trust_domain.to_string(),
            })?;

        // Signature only; lifetime and audience are checked in validate_claims
        let mut validation = Validation::new(self.header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<SvidClaims>(&self.raw, &key, &validation)?;

        Ok(JwtSvid {
            raw: self.raw,
            header: self.header,
            kid: self.kid,
            claims: token_data.claims,
            spiffe_id: self.spiffe_id,
            _state: PhantomData,
        })
    }

    /// Key ID from the token header
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl JwtSvid<SignatureVerified> {
    /// Checks `exp`, `nbf` and that at least one of `audiences` is present.
    pub fn validate_claims(self, audiences: &[String]) -> Result<JwtSvid<Validated>, AuthHelperError> {
        let now = Utc::now().timestamp();

        let exp = self
            .claims
            .exp
            .ok_or_else(|| AuthHelperError::malformed("token missing exp claim"))?;
        if exp < now - CLOCK_LEEWAY_SECS {
            return Err(AuthHelperError::TokenExpired {
                expired_at: timestamp(exp),
            });
        }

        if let Some(nbf) = self.claims.nbf {
            if nbf > now + CLOCK_LEEWAY_SECS {
                return Err(AuthHelperError::TokenNotYetValid {
                    valid_from: timestamp(nbf),
                });
            }
        }

        if !audiences.iter().any(|aud| self.claims.aud.contains(aud)) {
            return Err(AuthHelperError::AudienceMismatch {
                expected: audiences.to_vec(),
                actual: self.claims.aud.to_vec(),
            });
        }

        Ok(JwtSvid {
            raw: self.raw,
            header: self.header,
            kid: self.kid,
            claims: self.claims,
            spiffe_id: self.spiffe_id,
            _state: PhantomData,
        })
    }
}

impl JwtSvid<Validated> {
    /// Identity proven by this token
    pub fn identity(&self) -> Identity {
        Identity {
            spiffe_id: self.spiffe_id.clone(),
            audience: self.claims.aud.to_vec(),
            expires_at: timestamp(self.claims.exp.unwrap_or_default()),
        }
    }

    /// Get the raw token string
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// Common methods for all states
impl<S: SvidState> JwtSvid<S> {
    /// Workload the token claims to be
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Get the current state name
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }
}

/// Parses `token`, verifies it against `bundles` and checks its claims.
pub fn validate_jwt_svid(
    token: &str,
    bundles: &JwtBundleSet,
    audiences: &[String],
) -> Result<Identity, AuthHelperError> {
    let validated = JwtSvid::parse(token)?
        .verify_signature(bundles)?
        .validate_claims(audiences)?;
    Ok(validated.identity())
}

fn decode_claims_unverified(raw: &str) -> Result<SvidClaims, AuthHelperError> {
    let mut segments = raw.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthHelperError::malformed("token must have three segments"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthHelperError::malformed(format!("invalid payload encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthHelperError::malformed(format!("invalid claims: {e}")))
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
