//! Trust material: JWT bundles, JWT-SVID verification and the Workload API.
//!
//! The decision core only depends on the [`JwtSource`] trait. The production
//! implementation is [`WorkloadApiSource`].

pub mod bundle;
pub mod svid;
pub mod workload;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuthHelperError;
use crate::spiffe::SpiffeId;

pub use bundle::{Jwk, JwtBundle, JwtBundleSet, Jwks};
pub use svid::{JwtSvid, SignatureVerified, SvidState, Unverified, Validated};
pub use workload::{BundleWatcher, WorkloadApiAddr, WorkloadApiSource};

/// Identity proven by a validated JWT-SVID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Workload the token was issued to
    pub spiffe_id: SpiffeId,
    /// Audiences the token was issued for
    pub audience: Vec<String>,
    /// Expiry of the token
    pub expires_at: DateTime<Utc>,
}

/// Supplier of JWT-SVID trust material.
#[async_trait]
pub trait JwtSource: Send + Sync {
    /// Verifies `token` against the current bundles and checks that at least
    /// one of `audiences` is among its audiences.
    async fn validate(&self, token: &str, audiences: &[String]) -> Result<Identity, AuthHelperError>;

    /// Mints a JWT-SVID for `audience` and returns it in compact form.
    async fn mint(&self, audience: &str) -> Result<String, AuthHelperError>;
}
