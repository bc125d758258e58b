//! Workload API client against a fake agent on a Unix socket.

use std::time::Duration;

use prometheus::IntCounter;

use jwt_auth_helper::error::AuthHelperError;
use jwt_auth_helper::source::{JwtSource, WorkloadApiAddr, WorkloadApiSource};

use crate::common::{bundle_map, temp_dir, FakeAgent, TestAuthority, BACKEND_ID, FRONTEND_ID};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

fn audiences() -> Vec<String> {
    vec![BACKEND_ID.to_string()]
}

#[tokio::test]
async fn test_connect_waits_for_initial_bundles() {
    let authority = TestAuthority::generate("key-1");
    let (path, _agent) = FakeAgent::new(bundle_map(&[&authority])).serve_unix().await;

    let (source, _watcher) = WorkloadApiSource::connect(&WorkloadApiAddr::Unix(path), FETCH_TIMEOUT, STARTUP_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(source.bundles().len(), 1);

    let token = authority.svid(FRONTEND_ID, BACKEND_ID, 300);
    let identity = source.validate(&token, &audiences()).await.unwrap();
    assert_eq!(identity.spiffe_id.to_string(), FRONTEND_ID);
}

#[tokio::test]
async fn test_connect_accepts_unix_uri() {
    let authority = TestAuthority::generate("key-1");
    let (path, _agent) = FakeAgent::new(bundle_map(&[&authority])).serve_unix().await;
    let addr: WorkloadApiAddr = format!("unix://{}", path.display()).parse().unwrap();

    assert!(WorkloadApiSource::connect(&addr, FETCH_TIMEOUT, STARTUP_TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn test_mint_fetches_svid_for_audience() {
    let authority = TestAuthority::generate("key-1");
    let agent = FakeAgent::new(bundle_map(&[&authority]));
    let minted = authority.svid(FRONTEND_ID, BACKEND_ID, 300);
    agent.set_svids(vec![(FRONTEND_ID.to_string(), minted.clone())]);
    let (path, _server) = agent.clone().serve_unix().await;

    let (source, _watcher) = WorkloadApiSource::connect(&WorkloadApiAddr::Unix(path), FETCH_TIMEOUT, STARTUP_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(source.mint(BACKEND_ID).await.unwrap(), minted);
    assert_eq!(agent.requested_audiences(), vec![vec![BACKEND_ID.to_string()]]);
}

#[tokio::test]
async fn test_mint_without_svid_fails() {
    let authority = TestAuthority::generate("key-1");
    let (path, _agent) = FakeAgent::new(bundle_map(&[&authority])).serve_unix().await;

    let (source, _watcher) = WorkloadApiSource::connect(&WorkloadApiAddr::Unix(path), FETCH_TIMEOUT, STARTUP_TIMEOUT)
        .await
        .unwrap();

    let err = source.mint(BACKEND_ID).await.unwrap_err();
    assert!(matches!(err, AuthHelperError::NoSvidReturned), "{err}");
}

#[tokio::test]
async fn test_watcher_applies_rotated_bundles() {
    let old = TestAuthority::generate("key-1");
    let new = TestAuthority::generate("key-2");
    let agent = FakeAgent::new(bundle_map(&[&old]));
    let (path, _server) = agent.clone().serve_unix().await;

    let (source, watcher) = WorkloadApiSource::connect(&WorkloadApiAddr::Unix(path), FETCH_TIMEOUT, STARTUP_TIMEOUT)
        .await
        .unwrap();
    let updates = IntCounter::new("bundle_updates_total", "test counter").unwrap();
    let watcher = tokio::spawn(watcher.with_update_counter(updates.clone()).run());

    let token = new.svid(FRONTEND_ID, BACKEND_ID, 300);
    let err = source.validate(&token, &audiences()).await.unwrap_err();
    assert!(matches!(err, AuthHelperError::KeyNotFound { .. }), "{err}");

    agent.rotate(bundle_map(&[&old, &new]));

    let accepted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if source.validate(&token, &audiences()).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(accepted.is_ok(), "rotated bundle was never applied");
    assert_eq!(updates.get(), 1);

    watcher.abort();
}

#[tokio::test]
async fn test_connect_fails_without_agent() {
    let path = temp_dir().join("missing.sock");

    let result = WorkloadApiSource::connect(&WorkloadApiAddr::Unix(path), FETCH_TIMEOUT, Duration::from_secs(1)).await;
    assert!(result.is_err());
}
