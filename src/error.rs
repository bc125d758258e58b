//! Error handling module
//!
//! Every failure the decision path can observe is an [`AuthHelperError`].
//! None of them reach the proxy verbatim: `Check` turns them into denials
//! with a generic body, and the error itself is only logged (through its
//! [`ErrorCode`] and `Display` text).

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tonic::Code;

use crate::spiffe::SpiffeError;

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AuthHelperError {
    /// No `authorization` header on a request that needs one
    #[error("authorization header missing")]
    AuthorizationMissing,

    /// `authorization` header is not `Bearer <token>`
    #[error("invalid or unsupported authorization header")]
    AuthorizationMalformed,

    /// Injection was requested for a request that already has credentials
    #[error("request already contains an authorization header")]
    AuthorizationPresent,

    /// Token structure is malformed
    #[error("token malformed: {reason}")]
    TokenMalformed {
        /// Description of the malformation
        reason: String,
    },

    /// Token is signed with an algorithm JWT-SVIDs may not use
    #[error("unsupported token algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// Algorithm named in the token header
        alg: String,
    },

    /// Token header has no key ID
    #[error("token header is missing the key ID")]
    MissingKeyId,

    /// Token signature verification failed
    #[error("token signature invalid")]
    TokenInvalidSignature,

    /// Token has expired
    #[error("token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token is not yet valid (nbf claim)
    #[error("token not yet valid until {valid_from}")]
    TokenNotYetValid {
        /// When the token becomes valid
        valid_from: DateTime<Utc>,
    },

    /// None of the expected audiences is in the token
    #[error("expected audience in {expected:?} (audience={actual:?})")]
    AudienceMismatch {
        /// Audiences this service accepts
        expected: Vec<String>,
        /// Audiences the token was issued for
        actual: Vec<String>,
    },

    /// `sub` is not a valid SPIFFE ID
    #[error("token has an invalid subject: {0}")]
    InvalidSubject(#[from] SpiffeError),

    /// No JWT bundle is known for the trust domain
    #[error("no JWT bundle for trust domain {trust_domain:?}")]
    BundleUnavailable {
        /// Trust domain that was looked up
        trust_domain: String,
    },

    /// The bundle has no key with the token's key ID
    #[error("no JWT authority {kid:?} found for trust domain {trust_domain:?}")]
    KeyNotFound {
        /// Key ID from the token header
        kid: String,
        /// Trust domain that was looked up
        trust_domain: String,
    },

    /// The Workload API answered without any SVID
    #[error("workload API returned no JWT-SVID")]
    NoSvidReturned,

    /// The Workload API call failed
    #[error("workload API error ({code:?}): {message}")]
    WorkloadApi {
        /// gRPC status code of the failed call
        code: Code,
        /// Status message
        message: String,
    },

    /// Operation timed out
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// How long the operation ran before timing out
        duration: Duration,
    },

    /// Internal error
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable identifiers for log fields and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AuthorizationMissing,
    AuthorizationMalformed,
    AuthorizationPresent,
    TokenMalformed,
    UnsupportedAlgorithm,
    TokenInvalid,
    TokenExpired,
    TokenNotYetValid,
    AudienceMismatch,
    InvalidSubject,
    BundleUnavailable,
    KeyNotFound,
    MintFailed,
    WorkloadApiUnavailable,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationMissing => "AUTHORIZATION_MISSING",
            Self::AuthorizationMalformed => "AUTHORIZATION_MALFORMED",
            Self::AuthorizationPresent => "AUTHORIZATION_PRESENT",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::UnsupportedAlgorithm => "TOKEN_UNSUPPORTED_ALGORITHM",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            Self::AudienceMismatch => "TOKEN_AUDIENCE_MISMATCH",
            Self::InvalidSubject => "TOKEN_INVALID_SUBJECT",
            Self::BundleUnavailable => "BUNDLE_UNAVAILABLE",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::MintFailed => "MINT_FAILED",
            Self::WorkloadApiUnavailable => "WORKLOAD_API_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl AuthHelperError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthorizationMissing => ErrorCode::AuthorizationMissing,
            Self::AuthorizationMalformed => ErrorCode::AuthorizationMalformed,
            Self::AuthorizationPresent => ErrorCode::AuthorizationPresent,
            Self::TokenMalformed { .. } | Self::MissingKeyId => ErrorCode::TokenMalformed,
            Self::UnsupportedAlgorithm { .. } => ErrorCode::UnsupportedAlgorithm,
            Self::TokenInvalidSignature => ErrorCode::TokenInvalid,
            Self::TokenExpired { .. } => ErrorCode::TokenExpired,
            Self::TokenNotYetValid { .. } => ErrorCode::TokenNotYetValid,
            Self::AudienceMismatch { .. } => ErrorCode::AudienceMismatch,
            Self::InvalidSubject(_) => ErrorCode::InvalidSubject,
            Self::BundleUnavailable { .. } => ErrorCode::BundleUnavailable,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::NoSvidReturned => ErrorCode::MintFailed,
            Self::WorkloadApi { .. } => ErrorCode::WorkloadApiUnavailable,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Creates a TokenMalformed error
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::TokenMalformed {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// From trait implementations for automatic error conversion
// ============================================================================

impl From<jsonwebtoken::errors::Error> for AuthHelperError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthHelperError::TokenInvalidSignature,
            ErrorKind::ExpiredSignature => AuthHelperError::TokenExpired {
                expired_at: Utc::now(),
            },
            ErrorKind::ImmatureSignature => AuthHelperError::TokenNotYetValid {
                valid_from: Utc::now(),
            },
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => {
                AuthHelperError::UnsupportedAlgorithm {
                    alg: err.to_string(),
                }
            }
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) => {
                AuthHelperError::TokenInvalidSignature
            }
            _ => AuthHelperError::malformed(err.to_string()),
        }
    }
}

impl From<tonic::Status> for AuthHelperError {
    fn from(status: tonic::Status) -> Self {
        AuthHelperError::WorkloadApi {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}
