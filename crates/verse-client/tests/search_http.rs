mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;
use verse_client::error::ClientError;
use verse_client::search::{HttpSearchBackend, SearchBackend, SearchCoordinator, SearchEvent};
use verse_proto::config::{SearchConfig, ServerConfig};
use verse_proto::protocol::SearchRequest;
use verse_proto::session::SessionStore;
use verse_proto::state::ResultStatus;

fn backend(addr: std::net::SocketAddr, store: SessionStore) -> HttpSearchBackend {
    let url = Url::parse(&format!("http://{}/search", addr)).unwrap();
    HttpSearchBackend::new(url, &ServerConfig::default(), store).unwrap()
}

fn signed_in(dir: &tempfile::TempDir) -> SessionStore {
    let store = SessionStore::new(dir.path().join("session"));
    store.save(common::GOOD_TOKEN).unwrap();
    store
}

#[tokio::test]
async fn test_request_wire_format_and_cookie() {
    let (addr, recorder) = common::spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(addr, signed_in(&dir));

    let response = backend
        .search(SearchRequest::new("hurt", 2, 20))
        .await
        .unwrap();
    assert_eq!(response.total, 45);
    assert_eq!(response.results.len(), 5);
    assert_eq!(response.results[0].spotify.name, "hurt #40");
    assert_eq!(
        response.results[0].preview_url(),
        Some("https://p.scdn.co/mp3-preview/40")
    );

    let sent = &recorder.searches()[0];
    assert_eq!(sent["q"], "hurt");
    assert_eq!(sent["offset"], "40");
    assert_eq!(sent["limit"], "20");
    assert_eq!(
        recorder.cookies.lock().unwrap()[0].as_deref(),
        Some("session=good-session")
    );
}

#[tokio::test]
async fn test_null_results_decode_as_empty() {
    let (addr, _recorder) = common::spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(addr, signed_in(&dir));

    let response = backend.search(SearchRequest::new("none", 0, 20)).await.unwrap();
    assert_eq!(response.total, 0);
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_error_statuses() {
    let (addr, _recorder) = common::spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    let backend_ok = backend(addr, signed_in(&dir));
    let err = backend_ok
        .search(SearchRequest::new("explode", 0, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status(s) if s.as_u16() == 500));

    let anonymous = backend(addr, SessionStore::new(dir.path().join("missing")));
    let err = anonymous
        .search(SearchRequest::new("*", 0, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status(s) if s.as_u16() == 401));
}

#[tokio::test]
async fn test_coordinator_over_http_failure_then_recovery() {
    let (addr, _recorder) = common::spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(backend(addr, signed_in(&dir)));
    let (tx, mut rx) = mpsc::channel(16);
    let mut coord = SearchCoordinator::new(backend, tx, &SearchConfig::default());

    async fn finish(
        coord: &mut SearchCoordinator<HttpSearchBackend>,
        rx: &mut mpsc::Receiver<SearchEvent>,
    ) {
        let evt = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match evt {
            SearchEvent::Finished {
                generation,
                outcome,
            } => assert!(coord.apply(generation, outcome)),
            other => panic!("unexpected {:?}", other),
        }
    }

    coord.submit_now("explode");
    finish(&mut coord, &mut rx).await;
    assert_eq!(coord.snapshot().status(), ResultStatus::Failed);
    assert_eq!(coord.snapshot().total, 0);

    coord.submit_now("love");
    finish(&mut coord, &mut rx).await;
    assert_eq!(coord.snapshot().status(), ResultStatus::Loaded);
    assert_eq!(coord.snapshot().page_count(), 3);

    assert!(coord.change_page(2));
    finish(&mut coord, &mut rx).await;
    assert_eq!(coord.snapshot().items.len(), 5);
    assert_eq!(coord.snapshot().items[0].spotify.name, "love #40");
}
