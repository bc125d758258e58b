//! JWT bundles
//!
//! The Workload API streams one JWKS document per trust domain. Each key is
//! converted once into a [`DecodingKey`] so verification does no parsing.
//! Keys that cannot verify JWT-SVIDs are skipped rather than failing the
//! whole bundle, since a bundle may also carry X.509 authorities.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AuthHelperError;
use crate::spiffe::TrustDomain;

/// `use` value of JWT authorities in SPIFFE bundles.
const JWT_SVID_USE: &str = "jwt-svid";

/// Minimum base64url length of a 2048-bit RSA modulus.
const MIN_RSA_MODULUS_B64_LEN: usize = 342;

/// JSON Web Key structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,
    /// Key use (`jwt-svid`, `x509-svid`)
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
    /// RSA modulus
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default)]
    pub e: Option<String>,
    /// EC x coordinate
    #[serde(default)]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default)]
    pub y: Option<String>,
    /// EC curve
    #[serde(default)]
    pub crv: Option<String>,
}

/// JSON Web Key Set structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    /// List of keys
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// The JWT authorities of one trust domain.
#[derive(Clone)]
pub struct JwtBundle {
    trust_domain: TrustDomain,
    authorities: HashMap<String, Arc<DecodingKey>>,
}

impl std::fmt::Debug for JwtBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kids: Vec<&String> = self.authorities.keys().collect();
        kids.sort();
        f.debug_struct("JwtBundle")
            .field("trust_domain", &self.trust_domain)
            .field("authorities", &kids)
            .finish()
    }
}

impl JwtBundle {
    /// Parses a JWKS document for `trust_domain`.
    pub fn parse(trust_domain: TrustDomain, jwks: &[u8]) -> Result<Self, AuthHelperError> {
        let jwks: Jwks = serde_json::from_slice(jwks).map_err(|e| {
            AuthHelperError::Internal(anyhow::anyhow!(
                "unable to parse JWT bundle for {trust_domain}: {e}"
            ))
        })?;
        Ok(Self::from_jwks(trust_domain, &jwks))
    }

    /// Builds a bundle from already decoded keys.
    pub fn from_jwks(trust_domain: TrustDomain, jwks: &Jwks) -> Self {
        let mut authorities = HashMap::new();
        for jwk in &jwks.keys {
            if jwk.key_use.as_deref().is_some_and(|u| u != JWT_SVID_USE) {
                continue;
            }
            let Some(kid) = jwk.kid.as_deref().filter(|kid| !kid.is_empty()) else {
                warn!(trust_domain = %trust_domain, "JWT authority without key ID, skipping");
                continue;
            };
            if let Some(key) = jwk_to_decoding_key(jwk) {
                authorities.insert(kid.to_string(), Arc::new(key));
            }
        }

        Self {
            trust_domain,
            authorities,
        }
    }

    /// Looks up the authority with the given key ID.
    pub fn find_authority(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        self.authorities.get(kid).cloned()
    }

    /// Number of usable JWT authorities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }
}

/// Bundles of every trust domain the workload trusts, keyed by trust domain.
#[derive(Debug, Clone, Default)]
pub struct JwtBundleSet {
    bundles: HashMap<TrustDomain, JwtBundle>,
}

impl JwtBundleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a Workload API `JWTBundlesResponse` map.
    ///
    /// Entries with an unparsable trust domain or JWKS are logged and skipped.
    pub fn from_workload_map(bundles: &HashMap<String, Vec<u8>>) -> Self {
        let mut set = Self::new();
        for (raw_td, jwks) in bundles {
            let trust_domain = match TrustDomain::parse(raw_td) {
                Ok(td) => td,
                Err(e) => {
                    warn!(trust_domain = %raw_td, error = %e, "Skipping bundle with invalid trust domain");
                    continue;
                }
            };
            match JwtBundle::parse(trust_domain, jwks) {
                Ok(bundle) => set.insert(bundle),
                Err(e) => warn!(error = %e, "Skipping unparsable JWT bundle"),
            }
        }
        set
    }

    /// Adds or replaces the bundle for its trust domain.
    pub fn insert(&mut self, bundle: JwtBundle) {
        self.bundles.insert(bundle.trust_domain.clone(), bundle);
    }

    /// Bundle for `trust_domain`.
    pub fn get(&self, trust_domain: &TrustDomain) -> Option<&JwtBundle> {
        self.bundles.get(trust_domain)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// Converts a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_ref()?;
            let e = jwk.e.as_ref()?;

            if n.len() < MIN_RSA_MODULUS_B64_LEN {
                warn!(kid = ?jwk.kid, "RSA key too small, rejecting");
                return None;
            }

            DecodingKey::from_rsa_components(n, e).ok()
        }
        "EC" => {
            let x = jwk.x.as_ref()?;
            let y = jwk.y.as_ref()?;
            let crv = jwk.crv.as_deref().unwrap_or("P-256");

            if !matches!(crv, "P-256" | "P-384") {
                warn!(kid = ?jwk.kid, crv = %crv, "Unsupported EC curve, rejecting");
                return None;
            }

            DecodingKey::from_ec_components(x, y).ok()
        }
        _ => {
            warn!(kty = %jwk.kty, "Unsupported key type");
            None
        }
    }
}
