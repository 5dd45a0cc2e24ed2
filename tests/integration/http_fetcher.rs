//! HttpFetcher against a local mock server

use futures_util::StreamExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_downloader::downloader::{
    DownloadTask, FailureReason, FetchError, Fetcher, HttpFetcher, HttpFetcherConfig, PoolConfig,
    TransferOutcome, VariantDescriptor, WorkerPool,
};
use catalog_downloader::shutdown::ShutdownCoordinator;
use tempfile::TempDir;

const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpFetcherConfig::default()).unwrap()
}

async fn collect(fetcher: &HttpFetcher, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut body = fetcher.open(url).await?;
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Landing page reached through a redirecting OpenURL, plus its PDF.
async fn mount_item(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/openurl"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/book/10.1007%2F978-1", server.uri())),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/book/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>landing</html>", "text/html"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/pdf/10.1007/978-1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PDF_BYTES, "application/pdf"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resolve_follows_redirects() {
    let server = MockServer::start().await;
    mount_item(&server).await;

    let resolved = fetcher()
        .resolve(&format!("{}/openurl", server.uri()))
        .await
        .unwrap();
    assert_eq!(resolved, format!("{}/book/10.1007%2F978-1", server.uri()));
}

#[tokio::test]
async fn test_open_streams_payload() {
    let server = MockServer::start().await;
    mount_item(&server).await;

    let body = collect(&fetcher(), &format!("{}/content/pdf/10.1007/978-1.pdf", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, PDF_BYTES);
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html>please log in</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let uri = server.uri();

    let missing = collect(&fetcher, &format!("{uri}/missing.pdf")).await;
    assert_eq!(missing, Err(FetchError::NotFound));

    let broken = collect(&fetcher, &format!("{uri}/broken.pdf")).await;
    assert_eq!(broken, Err(FetchError::Status(503)));

    match collect(&fetcher, &format!("{uri}/login.pdf")).await {
        Err(FetchError::ErrorPage(content_type)) => assert!(content_type.starts_with("text/html")),
        other => panic!("expected error page, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    // Nothing listens on port 1.
    let result = fetcher().open("http://127.0.0.1:1/book.pdf").await;
    match result {
        Err(e @ FetchError::Network(_)) => assert!(e.is_retryable()),
        Err(other) => panic!("expected network error, got {other:?}"),
        Ok(_) => panic!("expected network error, got a body"),
    }
}

#[tokio::test]
async fn test_malformed_locator_is_invalid_url() {
    let result = fetcher().resolve("not a url").await;
    assert!(matches!(result, Err(FetchError::InvalidUrl(_))), "{result:?}");
}

#[tokio::test]
async fn test_reset_replaces_session() {
    let server = MockServer::start().await;
    mount_item(&server).await;

    let mut fetcher = fetcher();
    fetcher.reset().unwrap();
    let body = collect(&fetcher, &format!("{}/content/pdf/10.1007/978-1.pdf", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, PDF_BYTES);
}

#[tokio::test]
async fn test_pool_end_to_end_over_http() {
    let server = MockServer::start().await;
    mount_item(&server).await;

    let dir = TempDir::new().unwrap();
    let found = DownloadTask::new(
        format!("{}/openurl", server.uri()),
        dir.path().join("Mathematics"),
        "Item - Author - 978-1",
        VariantDescriptor::pdf(),
        "Item",
    );
    // No EPUB is mounted, so the mock server answers 404.
    let missing = DownloadTask {
        variant: VariantDescriptor::epub(),
        ..found.clone()
    };

    let pool = WorkerPool::new(
        fetcher(),
        dir.path(),
        PoolConfig::new(2),
        ShutdownCoordinator::shared(),
    );
    let summary = pool.run_all(vec![found.clone(), missing.clone()]).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(std::fs::read(found.destination_path()).unwrap(), PDF_BYTES);
    assert!(!missing.destination_path().exists());

    let failure = summary
        .reports
        .iter()
        .find(|r| r.task.variant == VariantDescriptor::epub())
        .unwrap();
    assert_eq!(
        failure.outcome,
        TransferOutcome::Failed {
            reason: FailureReason::NotFound,
            retryable: false,
        }
    );
}
