//! Authorization decision core
//!
//! [`AuthServer::check`] answers one intercepted request according to the
//! process-wide [`Mode`]. Every expected failure becomes a [`Decision::Deny`]
//! with a generic body; the concrete cause is only logged.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::bearer::extract_bearer_token;
use crate::auth::headers::RequestHeaders;
use crate::decision::{Decision, AUTHORIZATION_HEADER, INVALID_HEADER_BODY};
use crate::error::AuthHelperError;
use crate::mode::Mode;
use crate::observability::CheckMetrics;
use crate::source::JwtSource;

/// Default bound on a single trust-material call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides `Check` calls in one of the two modes.
pub struct AuthServer {
    mode: Mode,
    audiences: Vec<String>,
    source: Arc<dyn JwtSource>,
    call_timeout: Duration,
    metrics: Option<Arc<CheckMetrics>>,
}

impl AuthServer {
    /// Creates a server for `mode` that mints for, or validates against, `audience`.
    pub fn new(mode: Mode, audience: impl Into<String>, source: Arc<dyn JwtSource>) -> Self {
        info!(mode = %mode, "Auth Server running in {mode} mode");
        Self {
            mode,
            audiences: vec![audience.into()],
            source,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            metrics: None,
        }
    }

    /// Caps every trust-material call at `call_timeout`.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Records decisions on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<CheckMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decides one request.
    ///
    /// `deadline` is the time the caller is still willing to wait, if it sent
    /// one; trust-material calls are bounded by it and by the call timeout.
    #[instrument(
        skip(self, headers, deadline),
        fields(mode = %self.mode, correlation_id = %Uuid::new_v4())
    )]
    pub async fn check(&self, headers: &RequestHeaders, deadline: Option<Duration>) -> Decision {
        let start = Instant::now();
        let _in_flight = self.metrics.as_ref().map(|m| m.track_in_flight());
        let budget = deadline.map_or(self.call_timeout, |d| d.min(self.call_timeout));

        let result = match self.mode {
            Mode::Injection => self.inject(headers, budget).await,
            Mode::Validation => self.validate(headers, budget).await,
        };

        let (decision, reason) = match result {
            Ok(decision) => (decision, "ok"),
            Err(err) => {
                warn!(error = %err, error_code = err.code().as_str(), "Request denied");
                (Self::deny(&err), err.code().as_str())
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_check(
                self.mode.as_str(),
                decision.outcome(),
                reason,
                start.elapsed().as_secs_f64(),
            );
        }

        decision
    }

    async fn validate(&self, headers: &RequestHeaders, budget: Duration) -> Result<Decision, AuthHelperError> {
        let value = headers
            .get(AUTHORIZATION_HEADER)
            .ok_or(AuthHelperError::AuthorizationMissing)?;
        let token = extract_bearer_token(value).ok_or(AuthHelperError::AuthorizationMalformed)?;

        let identity = bounded(budget, self.source.validate(token, &self.audiences)).await?;

        info!(spiffe_id = %identity.spiffe_id, "Token is valid");
        Ok(Decision::allow())
    }

    async fn inject(&self, headers: &RequestHeaders, budget: Duration) -> Result<Decision, AuthHelperError> {
        if headers.get(AUTHORIZATION_HEADER).is_some_and(|value| !value.is_empty()) {
            warn!(
                "Request already contains an authorization header. Verify mode if expected mode is {}",
                self.mode
            );
            return Err(AuthHelperError::AuthorizationPresent);
        }

        let token = bounded(budget, self.source.mint(&self.audiences[0])).await?;

        let decision = Decision::allow_with_bearer(&token);
        info!("JWT-SVID injected. Sending response with 1 new header");
        Ok(decision)
    }

    /// Caller-facing denial for `err`. Only header problems get a specific body.
    fn deny(err: &AuthHelperError) -> Decision {
        match err {
            AuthHelperError::AuthorizationMissing | AuthHelperError::AuthorizationMalformed => {
                Decision::forbidden(INVALID_HEADER_BODY)
            }
            _ => Decision::permission_denied(),
        }
    }
}

async fn bounded<T>(
    budget: Duration,
    call: impl Future<Output = Result<T, AuthHelperError>>,
) -> Result<T, AuthHelperError> {
    timeout(budget, call)
        .await
        .map_err(|_| AuthHelperError::Timeout { duration: budget })?
}
