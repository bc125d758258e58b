//! SPIFFE Workload API client
//!
//! Connects to the local agent (Unix socket or TCP), keeps the JWT bundle set
//! current from the `FetchJWTBundles` stream and mints JWT-SVIDs with
//! `FetchJWTSVID`. Validation is done locally against the latest snapshot.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use prometheus::IntCounter;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{Request, Streaming};
use tower::service_fn;
use tracing::{debug, info, instrument, warn};

use crate::error::AuthHelperError;
use crate::proto::workload::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use crate::proto::workload::{JwtBundlesRequest, JwtBundlesResponse, JwtsvidRequest};
use crate::source::bundle::JwtBundleSet;
use crate::source::svid::validate_jwt_svid;
use crate::source::{Identity, JwtSource};

/// Metadata header every Workload API call must carry.
pub const WORKLOAD_API_HEADER: &str = "workload.spiffe.io";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Address of the Workload API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadApiAddr {
    /// Unix domain socket path
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl FromStr for WorkloadApiAddr {
    type Err = AuthHelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid_addr(s, "empty socket path"));
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if let Some(authority) = s.strip_prefix("tcp://") {
            if authority.is_empty() || !authority.contains(':') {
                return Err(invalid_addr(s, "expected tcp://host:port"));
            }
            Ok(Self::Tcp(authority.to_string()))
        } else if s.starts_with('/') {
            Ok(Self::Unix(PathBuf::from(s)))
        } else {
            Err(invalid_addr(s, "expected unix://, tcp:// or an absolute socket path"))
        }
    }
}

impl std::fmt::Display for WorkloadApiAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(authority) => write!(f, "tcp://{authority}"),
        }
    }
}

fn invalid_addr(addr: &str, reason: &str) -> AuthHelperError {
    AuthHelperError::Internal(anyhow::anyhow!("invalid workload API address {addr:?}: {reason}"))
}

fn transport_error(err: tonic::transport::Error) -> AuthHelperError {
    AuthHelperError::WorkloadApi {
        code: tonic::Code::Unavailable,
        message: err.to_string(),
    }
}

/// Opens a channel to the Workload API.
async fn connect_channel(addr: &WorkloadApiAddr) -> Result<Channel, AuthHelperError> {
    match addr {
        WorkloadApiAddr::Unix(path) => {
            let path = path.clone();
            // The URI is ignored by the connector
            Endpoint::from_static("http://localhost")
                .connect_with_connector(service_fn(move |_: Uri| {
                    let path = path.clone();
                    async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
                }))
                .await
                .map_err(transport_error)
        }
        WorkloadApiAddr::Tcp(authority) => Endpoint::from_shared(format!("http://{authority}"))
            .map_err(transport_error)?
            .connect()
            .await
            .map_err(transport_error),
    }
}

/// Wraps a Workload API message with the required metadata.
fn workload_request<T>(message: T) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(WORKLOAD_API_HEADER, MetadataValue::from_static("true"));
    request
}

async fn open_bundle_stream(
    client: &mut SpiffeWorkloadApiClient<Channel>,
) -> Result<Streaming<JwtBundlesResponse>, AuthHelperError> {
    let response = client
        .fetch_jwt_bundles(workload_request(JwtBundlesRequest {}))
        .await?;
    Ok(response.into_inner())
}

/// JWT source backed by the SPIFFE Workload API.
pub struct WorkloadApiSource {
    client: SpiffeWorkloadApiClient<Channel>,
    bundles: Arc<ArcSwap<JwtBundleSet>>,
    fetch_timeout: Duration,
}

impl WorkloadApiSource {
    /// Connects to the Workload API and waits for the first bundle set.
    ///
    /// Returns the source together with the [`BundleWatcher`] that keeps the
    /// bundles current; the caller decides where the watcher runs.
    pub async fn connect(
        addr: &WorkloadApiAddr,
        fetch_timeout: Duration,
        startup_timeout: Duration,
    ) -> Result<(Self, BundleWatcher), AuthHelperError> {
        let bootstrap = async {
            let channel = connect_channel(addr).await?;
            let mut client = SpiffeWorkloadApiClient::new(channel);
            let mut stream = open_bundle_stream(&mut client).await?;
            let first = stream.message().await?.ok_or_else(|| AuthHelperError::WorkloadApi {
                code: tonic::Code::Unavailable,
                message: "bundle stream closed before the first update".to_string(),
            })?;
            Ok::<_, AuthHelperError>((client, stream, first))
        };

        let (client, stream, first) = timeout(startup_timeout, bootstrap)
            .await
            .map_err(|_| AuthHelperError::Timeout {
                duration: startup_timeout,
            })??;

        let set = JwtBundleSet::from_workload_map(&first.bundles);
        info!(addr = %addr, bundles = set.len(), "Received initial JWT bundles");

        let bundles = Arc::new(ArcSwap::from_pointee(set));
        let watcher = BundleWatcher {
            client: client.clone(),
            bundles: bundles.clone(),
            stream: Some(stream),
            updates: None,
        };

        Ok((
            Self {
                client,
                bundles,
                fetch_timeout,
            },
            watcher,
        ))
    }

    /// Current bundle set snapshot.
    pub fn bundles(&self) -> Arc<JwtBundleSet> {
        self.bundles.load_full()
    }
}

#[async_trait]
impl JwtSource for WorkloadApiSource {
    async fn validate(&self, token: &str, audiences: &[String]) -> Result<Identity, AuthHelperError> {
        let bundles = self.bundles.load();
        validate_jwt_svid(token, &bundles, audiences)
    }

    #[instrument(skip(self))]
    async fn mint(&self, audience: &str) -> Result<String, AuthHelperError> {
        let mut request = workload_request(JwtsvidRequest {
            audience: vec![audience.to_string()],
            spiffe_id: String::new(),
        });
        request.set_timeout(self.fetch_timeout);

        let mut client = self.client.clone();
        let response = timeout(self.fetch_timeout, client.fetch_jwtsvid(request))
            .await
            .map_err(|_| AuthHelperError::Timeout {
                duration: self.fetch_timeout,
            })??;

        let svid = response
            .into_inner()
            .svids
            .into_iter()
            .next()
            .ok_or(AuthHelperError::NoSvidReturned)?;
        debug!(spiffe_id = %svid.spiffe_id, "Fetched JWT-SVID");
        Ok(svid.svid)
    }
}

/// Background task that applies bundle updates streamed by the Workload API.
pub struct BundleWatcher {
    client: SpiffeWorkloadApiClient<Channel>,
    bundles: Arc<ArcSwap<JwtBundleSet>>,
    stream: Option<Streaming<JwtBundlesResponse>>,
    updates: Option<IntCounter>,
}

impl BundleWatcher {
    /// Counts every applied update on `counter`.
    #[must_use]
    pub fn with_update_counter(mut self, counter: IntCounter) -> Self {
        self.updates = Some(counter);
        self
    }

    /// Runs until the task is dropped. Stream failures are retried with
    /// exponential backoff while the last snapshot stays in use.
    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let mut stream = match self.stream.take() {
                Some(stream) => stream,
                None => match open_bundle_stream(&mut self.client).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, retry_in = ?backoff, "Unable to open JWT bundle stream");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                },
            };

            loop {
                match stream.message().await {
                    Ok(Some(update)) => {
                        backoff = INITIAL_BACKOFF;
                        self.apply(&update);
                    }
                    Ok(None) => {
                        warn!("JWT bundle stream closed by the workload API");
                        break;
                    }
                    Err(status) => {
                        warn!(code = ?status.code(), message = %status.message(), "JWT bundle stream failed");
                        break;
                    }
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    fn apply(&self, update: &JwtBundlesResponse) {
        let set = JwtBundleSet::from_workload_map(&update.bundles);
        info!(bundles = set.len(), "JWT bundles updated");
        self.bundles.store(Arc::new(set));
        if let Some(counter) = &self.updates {
            counter.inc();
        }
    }
}
