//! gRPC Service Implementation
//!
//! Exposes [`AuthServer`] as `envoy.service.auth.v3.Authorization`.

use std::sync::Arc;
use std::time::Duration;

use tonic::metadata::MetadataMap;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::auth::{AuthServer, RequestHeaders};
use crate::config::Config;
use crate::proto::envoy::service::auth::v3::authorization_server::Authorization;
use crate::proto::envoy::service::auth::v3::{CheckRequest, CheckResponse};

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// `Authorization` service backed by an [`AuthServer`].
#[derive(Clone)]
pub struct AuthorizationService {
    server: Arc<AuthServer>,
}

impl AuthorizationService {
    pub fn new(server: Arc<AuthServer>) -> Self {
        Self { server }
    }
}

#[tonic::async_trait]
impl Authorization for AuthorizationService {
    async fn check(&self, request: Request<CheckRequest>) -> Result<Response<CheckResponse>, Status> {
        let deadline = grpc_timeout(request.metadata());
        let headers = request_headers(request.into_inner());
        debug!(header_count = headers.len(), ?deadline, "Check request received");

        let decision = self.server.check(&headers, deadline).await;
        Ok(Response::new(decision.into_check_response()))
    }
}

/// Transport builder with the configured bound on concurrent `Check` calls,
/// applied both as the HTTP/2 stream limit and as a per-connection limit.
pub fn server_builder(config: &Config) -> Server {
    Server::builder()
        .max_concurrent_streams(Some(config.max_concurrent_streams))
        .concurrency_limit_per_connection(config.max_concurrent_streams as usize)
}

/// Headers of the intercepted HTTP request. Absent attributes read as no headers.
pub fn request_headers(request: CheckRequest) -> RequestHeaders {
    request
        .attributes
        .and_then(|attributes| attributes.request)
        .and_then(|request| request.http)
        .map(|http| RequestHeaders::new(http.headers))
        .unwrap_or_default()
}

/// Remaining time the caller allows, from its `grpc-timeout` header.
pub fn grpc_timeout(metadata: &MetadataMap) -> Option<Duration> {
    let value = metadata.get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    parse_grpc_timeout(value)
}

/// Parses a `grpc-timeout` value: up to eight ASCII digits and a unit.
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}
