//! SPIFFE ID and trust domain parsing
//!
//! JWT-SVIDs carry the workload identity in the `sub` claim as a SPIFFE ID
//! (`spiffe://<trust-domain>/<path>`). Bundles are keyed by trust domain, so
//! both the subject and the bundle map keys go through this module.

use std::fmt;

const SCHEME: &str = "spiffe://";

/// SPIFFE ID validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpiffeError {
    #[error("invalid SPIFFE URI scheme: expected 'spiffe://'")]
    InvalidScheme,

    #[error("empty trust domain")]
    EmptyTrustDomain,

    #[error("invalid trust domain: {0}")]
    InvalidTrustDomain(String),

    #[error("invalid path segment: {0:?}")]
    InvalidPath(String),
}

/// A SPIFFE trust domain name (e.g. `example.org`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrustDomain(String);

impl TrustDomain {
    /// Parses a trust domain given either as a bare name or as a SPIFFE ID
    /// without path (`spiffe://example.org`), which is how the Workload API
    /// keys JWT bundles.
    pub fn parse(raw: &str) -> Result<Self, SpiffeError> {
        let name = match raw.strip_prefix(SCHEME) {
            Some(rest) if rest.contains('/') => {
                return Err(SpiffeError::InvalidTrustDomain(raw.to_string()));
            }
            Some(rest) => rest,
            None => raw,
        };

        if name.is_empty() {
            return Err(SpiffeError::EmptyTrustDomain);
        }
        if !is_valid_trust_domain(name) {
            return Err(SpiffeError::InvalidTrustDomain(name.to_string()));
        }

        Ok(TrustDomain(name.to_string()))
    }

    /// The bare trust domain name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The trust domain rendered as a SPIFFE ID (`spiffe://<name>`).
    pub fn id_string(&self) -> String {
        format!("{SCHEME}{}", self.0)
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed SPIFFE ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: Vec<String>,
}

impl SpiffeId {
    /// Parses a SPIFFE ID from a URI string.
    /// Format: spiffe://trust-domain/path/segments
    pub fn parse(uri: &str) -> Result<Self, SpiffeError> {
        let rest = uri.strip_prefix(SCHEME).ok_or(SpiffeError::InvalidScheme)?;

        let (domain, path_str) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        if domain.is_empty() {
            return Err(SpiffeError::EmptyTrustDomain);
        }
        if !is_valid_trust_domain(domain) {
            return Err(SpiffeError::InvalidTrustDomain(domain.to_string()));
        }

        // A trailing slash or empty segment is not allowed, but no path at all is.
        let path = match path_str {
            None => Vec::new(),
            Some(path_str) => path_str
                .split('/')
                .map(|segment| {
                    if is_valid_path_segment(segment) {
                        Ok(segment.to_string())
                    } else {
                        Err(SpiffeError::InvalidPath(segment.to_string()))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(SpiffeId {
            trust_domain: TrustDomain(domain.to_string()),
            path,
        })
    }

    /// Trust domain the ID belongs to.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Path segments after the trust domain.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Converts to URI string
    pub fn to_uri(&self) -> String {
        if self.path.is_empty() {
            self.trust_domain.id_string()
        } else {
            format!("{SCHEME}{}/{}", self.trust_domain, self.path.join("/"))
        }
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Trust domain names are lowercase letters, digits, dots, dashes and underscores.
fn is_valid_trust_domain(domain: &str) -> bool {
    domain.len() <= 255
        && domain
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'))
}

fn is_valid_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
}
