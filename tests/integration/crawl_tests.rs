//! Integration tests for the crawl worker
//!
//! These tests use wiremock to create mock HTTP servers and drive real
//! workers over a SQLite store, a blob directory and the SQLite index.

use async_trait::async_trait;
use clawdgle::config::{BlobConfig, IndexConfig, RetryConfig, UserAgentConfig};
use clawdgle::crawler::{
    build_http_client, CrawlContext, CrawlTask, Fetcher, HtmlExtractor, TaskOutcome, Worker,
    WorkerPool, WorkerSettings,
};
use clawdgle::publish::{
    BlobStore, FsBlobStore, IndexedDocument, PublishError, PublishResult, Publisher, SearchIndex,
    SearchPage, SqliteIndex,
};
use clawdgle::robots::RobotsPolicy;
use clawdgle::storage::{FrontierStore, PolitenessStore, SqliteStore, StatsStore};
use clawdgle::url::url_digest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A SQLite store plus on-disk blobs, both in temporary directories
struct Harness {
    store: Arc<SqliteStore>,
    blob_root: TempDir,
    _db_dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let db_dir = TempDir::new().expect("Failed to create db dir");
        let store = SqliteStore::new(&db_dir.path().join("crawl.db")).expect("Failed to open store");
        Self {
            store: Arc::new(store),
            blob_root: TempDir::new().expect("Failed to create blob dir"),
            _db_dir: db_dir,
        }
    }

    fn index(&self) -> SqliteIndex {
        SqliteIndex::new(self.store.connection())
    }

    fn blobs(&self) -> FsBlobStore {
        FsBlobStore::new(self.blob_root.path())
    }

    async fn publisher_with(
        &self,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Publisher {
        let publisher = Publisher::new(blobs, index, &BlobConfig::default(), &IndexConfig::default());
        publisher.prepare().await.expect("Failed to prepare index");
        publisher
    }

    async fn publisher(&self) -> Publisher {
        self.publisher_with(Arc::new(self.blobs()), Arc::new(self.index()))
            .await
    }

    fn worker(&self, publisher: Publisher, settings: WorkerSettings) -> Worker {
        Worker::new(0, Arc::new(context(self.store.clone(), publisher, settings, None)))
    }

    async fn counter(&self, name: &str) -> u64 {
        self.store
            .stats()
            .await
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    async fn seed(&self, url: String, depth: u32) {
        self.store.enqueue(&CrawlTask::new(url, depth)).await.unwrap();
    }
}

fn agent() -> UserAgentConfig {
    UserAgentConfig {
        name: "ClawdgleBot".to_string(),
        version: "0.1".to_string(),
        contact_url: Some("https://example.com/bot".to_string()),
        header: None,
    }
}

fn settings(max_depth: u32) -> WorkerSettings {
    WorkerSettings {
        max_depth,
        allow_domains: Vec::new(),
        polite_delay: Duration::ZERO,
        dequeue_timeout: Duration::from_millis(50),
        idle_delay: Duration::from_millis(10),
        retry: RetryConfig::default(),
    }
}

fn context(
    store: Arc<SqliteStore>,
    publisher: Publisher,
    settings: WorkerSettings,
    robots_timeout: Option<Duration>,
) -> CrawlContext {
    let client = build_http_client(&agent(), Duration::from_secs(5)).unwrap();
    let mut robots = RobotsPolicy::new(client.clone(), agent().product_token());
    if let Some(timeout) = robots_timeout {
        robots = robots.with_timeout(timeout);
    }
    CrawlContext::new(
        store,
        Fetcher::new(client, 1_000_000),
        robots,
        Arc::new(HtmlExtractor::new()),
        publisher,
        settings,
    )
}

/// Runs a worker until the frontier stays empty
async fn drain(worker: &Worker) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = worker.run_once().await.expect("store failure") {
        outcomes.push(outcome);
    }
    outcomes
}

async fn mount_page(server: &MockServer, page: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// A search index that is always down
struct OfflineIndex;

#[async_trait]
impl SearchIndex for OfflineIndex {
    async fn ensure_collection(&self, _name: &str) -> PublishResult<()> {
        Ok(())
    }

    async fn upsert(&self, _collection: &str, _document: &IndexedDocument) -> PublishResult<()> {
        Err(PublishError::Index("index offline".to_string()))
    }

    async fn search(&self, _: &str, _: &str, _: u32, _: u32) -> PublishResult<SearchPage> {
        Err(PublishError::Index("index offline".to_string()))
    }

    async fn find_by_url(&self, _: &str, _: &str) -> PublishResult<Option<IndexedDocument>> {
        Ok(None)
    }
}

/// Blob storage that rejects every write
struct ReadOnlyBlobs;

#[async_trait]
impl BlobStore for ReadOnlyBlobs {
    async fn put(&self, _: &str, key: &str, _: Vec<u8>, _: &str) -> PublishResult<()> {
        Err(PublishError::Blob(format!("bucket is read-only: {}", key)))
    }

    async fn get(&self, bucket: &str, key: &str) -> PublishResult<Vec<u8>> {
        Err(PublishError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn content_type(&self, _: &str, _: &str) -> PublishResult<Option<String>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_seed_with_two_links_at_max_depth_one() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body><main>
            <p>Welcome home</p>
            <a href="/a">A</a>
            <a href="/b">B</a>
        </main></body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/a",
        r#"<html><head><title>Page A</title></head><body><p>Alpha</p><a href="/deeper">x</a></body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/b",
        r#"<html><head><title>Page B</title></head><body><p>Bravo</p></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/deeper"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(1));
    harness.seed(format!("{}/", base), 0).await;

    let outcomes = drain(&worker).await;
    assert_eq!(
        outcomes,
        vec![
            TaskOutcome::Published {
                indexed: true,
                links_enqueued: Some(2)
            },
            TaskOutcome::Published {
                indexed: true,
                links_enqueued: None
            },
            TaskOutcome::Published {
                indexed: true,
                links_enqueued: None
            },
        ]
    );

    assert_eq!(harness.counter("stored").await, 3);
    assert_eq!(harness.counter("indexed").await, 3);
    assert_eq!(harness.counter("links_enqueued").await, 1);
    assert_eq!(harness.counter("fetch_errors").await, 0);

    // Blobs land at <root>/<bucket>/<prefix><sha256(url)>.md
    let root_url = format!("{}/", base);
    let blob_path = harness
        .blob_root
        .path()
        .join("clawdgle")
        .join(format!("markdown/{}.md", url_digest(&root_url)));
    let markdown = std::fs::read_to_string(&blob_path).expect("root page blob missing");
    assert!(markdown.contains("Welcome home"));

    let index = harness.index();
    let all = index.search("clawdgle_docs", "", 1, 10).await.unwrap();
    assert_eq!(all.found, 3);

    let home = index
        .find_by_url("clawdgle_docs", &root_url)
        .await
        .unwrap()
        .expect("root page not indexed");
    assert_eq!(home.title, "Home");
    assert_eq!(home.id, url_digest(&root_url));

    let bravo = index.search("clawdgle_docs", "bravo", 1, 10).await.unwrap();
    assert_eq!(bravo.found, 1);
    assert_eq!(bravo.hits[0].url, format!("{}/b", base));
}

#[tokio::test]
async fn test_concurrent_duplicates_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/dup"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Only once</p></body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new();
    let variants = [
        format!("{}/dup", base),
        format!("{}/dup#section", base),
        format!("{}/dup?utm_source=feed", base),
        format!("{}/dup", base),
        format!("{}/dup?fbclid=abc#x", base),
        format!("{}/dup", base),
    ];
    for url in &variants {
        harness.seed(url.clone(), 0).await;
    }

    let publisher = harness.publisher().await;
    let ctx = Arc::new(context(harness.store.clone(), publisher, settings(0), None));
    let pool = WorkerPool::new(ctx, 4);
    let (tx, rx) = watch::channel(false);

    let stop_when_done = async {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let done = harness.counter("stored").await + harness.counter("skipped_seen").await;
            if done == variants.len() as u64 || Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
    };

    let (handled, ()) = tokio::join!(pool.run(rx), stop_when_done);

    assert_eq!(handled, variants.len() as u64);
    assert_eq!(harness.counter("stored").await, 1);
    assert_eq!(harness.counter("skipped_seen").await, variants.len() as u64 - 1);
    assert_eq!(harness.store.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_robots_disallow_skips_fetch() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(1));
    harness.seed(format!("{}/private/page", base), 0).await;

    assert_eq!(drain(&worker).await, vec![TaskOutcome::RobotsDisallowed]);
    assert_eq!(harness.counter("skipped_robots").await, 1);
    assert_eq!(harness.counter("stored").await, 0);
}

#[tokio::test]
async fn test_robots_agent_group_disallow() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: ClawdgleBot\nDisallow: /\n\nUser-agent: *\nAllow: /\n",
        ))
        .mount(&server)
        .await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(1));
    harness.seed(format!("{}/page", base), 0).await;

    assert_eq!(drain(&worker).await, vec![TaskOutcome::RobotsDisallowed]);
}

#[tokio::test]
async fn test_robots_server_error_fails_open() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/open", "<html><body><p>Open page</p></body></html>").await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(0));
    harness.seed(format!("{}/open", base), 0).await;

    let outcomes = drain(&worker).await;
    assert!(matches!(outcomes[..], [TaskOutcome::Published { indexed: true, .. }]));
    assert_eq!(harness.counter("skipped_robots").await, 0);
    assert_eq!(harness.counter("stored").await, 1);
}

#[tokio::test]
async fn test_robots_timeout_fails_open() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /\n")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/slow-robots", "<html><body><p>Still crawled</p></body></html>").await;

    let harness = Harness::new();
    let publisher = harness.publisher().await;
    let ctx = context(
        harness.store.clone(),
        publisher,
        settings(0),
        Some(Duration::from_millis(200)),
    );
    let worker = Worker::new(0, Arc::new(ctx));
    harness.seed(format!("{}/slow-robots", base), 0).await;

    let outcomes = drain(&worker).await;
    assert!(matches!(outcomes[..], [TaskOutcome::Published { .. }]));
    assert_eq!(harness.counter("stored").await, 1);
}

#[tokio::test]
async fn test_depth_bound() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><p>Root</p><a href="/child">child</a></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>child</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(0));
    harness.seed(format!("{}/", base), 0).await;
    harness.seed(format!("{}/child", base), 1).await;

    let outcomes = drain(&worker).await;
    assert_eq!(
        outcomes,
        vec![
            TaskOutcome::Published {
                indexed: true,
                links_enqueued: None
            },
            TaskOutcome::TooDeep,
        ]
    );
    assert_eq!(harness.counter("skipped_max_depth").await, 1);
    assert_eq!(harness.counter("links_enqueued").await, 0);
    assert_eq!(harness.store.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_index_failure_keeps_blob_and_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><p>Indexed nowhere</p><a href="/next">next</a></body></html>"#,
    )
    .await;

    let harness = Harness::new();
    let publisher = harness
        .publisher_with(Arc::new(harness.blobs()), Arc::new(OfflineIndex))
        .await;
    let worker = harness.worker(publisher.clone(), settings(1));
    harness.seed(format!("{}/", base), 0).await;

    let outcome = worker.run_once().await.unwrap().unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Published {
            indexed: false,
            links_enqueued: Some(1)
        }
    );
    assert_eq!(harness.counter("stored").await, 1);
    assert_eq!(harness.counter("index_errors").await, 1);
    assert_eq!(harness.counter("indexed").await, 0);
    assert_eq!(harness.counter("links_enqueued").await, 1);

    let key = publisher.storage_key(&format!("{}/", base));
    assert!(publisher.load(&key).await.unwrap().contains("Indexed nowhere"));

    let next = harness
        .store
        .dequeue(Duration::from_millis(50))
        .await
        .unwrap()
        .expect("link should be enqueued");
    assert_eq!(next, CrawlTask::new(format!("{}/next", base), 1));
}

#[tokio::test]
async fn test_store_failure_ends_task() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><p>Nowhere to go</p><a href="/next">next</a></body></html>"#,
    )
    .await;

    let harness = Harness::new();
    let publisher = harness
        .publisher_with(Arc::new(ReadOnlyBlobs), Arc::new(harness.index()))
        .await;
    let worker = harness.worker(publisher, settings(1));
    harness.seed(format!("{}/", base), 0).await;

    assert_eq!(drain(&worker).await, vec![TaskOutcome::StoreFailed]);
    assert_eq!(harness.counter("store_errors").await, 1);
    assert_eq!(harness.counter("stored").await, 0);
    assert_eq!(harness.counter("indexed").await, 0);
    assert_eq!(harness.counter("links_enqueued").await, 0);
    assert_eq!(harness.store.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_recrawl_overwrites_blob_and_document() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>First version</p></body></html>"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Second version</p></body></html>"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/page", base);
    let harness = Harness::new();
    let publisher = harness.publisher().await;

    // Two crawls of the same URL, each from a fresh frontier and seen set.
    for _ in 0..2 {
        let frontier_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(&frontier_dir.path().join("f.db")).unwrap());
        store.enqueue(&CrawlTask::seed(url.clone())).await.unwrap();
        let worker = Worker::new(0, Arc::new(context(store, publisher.clone(), settings(0), None)));
        assert_eq!(drain(&worker).await.len(), 1);
    }

    let bucket_dir = harness.blob_root.path().join("clawdgle").join("markdown");
    let objects: Vec<_> = std::fs::read_dir(&bucket_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map(|ext| ext == "md").unwrap_or(false))
        .collect();
    assert_eq!(objects.len(), 1);

    let results = publisher.search("", 1, 10).await.unwrap();
    assert_eq!(results.found, 1);
    assert!(results.hits[0].content.contains("Second version"));
    let stored = publisher.load(&results.hits[0].storage_key).await.unwrap();
    assert!(stored.contains("Second version"));
}

#[tokio::test]
async fn test_politeness_spacing_per_origin() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/one", "<html><body><p>one</p></body></html>").await;
    mount_page(&server, "/two", "<html><body><p>two</p></body></html>").await;

    let harness = Harness::new();
    let mut s = settings(0);
    s.polite_delay = Duration::from_millis(400);
    let worker = harness.worker(harness.publisher().await, s);
    harness.seed(format!("{}/one", base), 0).await;
    harness.seed(format!("{}/two", base), 0).await;

    let origin = base.trim_end_matches('/').to_string();

    worker.run_once().await.unwrap().unwrap();
    let first = harness.store.last_fetch(&origin).await.unwrap().unwrap();

    let started = Instant::now();
    worker.run_once().await.unwrap().unwrap();
    let second = harness.store.last_fetch(&origin).await.unwrap().unwrap();

    assert!(second > first);
    assert!(second - first >= chrono::Duration::milliseconds(400));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_robots_crawl_delay_raises_spacing() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1\n"))
        .mount(&server)
        .await;
    mount_page(&server, "/one", "<html><body><p>one</p></body></html>").await;
    mount_page(&server, "/two", "<html><body><p>two</p></body></html>").await;

    let harness = Harness::new();
    let worker = harness.worker(harness.publisher().await, settings(0));
    harness.seed(format!("{}/one", base), 0).await;
    harness.seed(format!("{}/two", base), 0).await;

    let origin = base.trim_end_matches('/').to_string();
    worker.run_once().await.unwrap().unwrap();
    let first = harness.store.last_fetch(&origin).await.unwrap().unwrap();
    worker.run_once().await.unwrap().unwrap();
    let second = harness.store.last_fetch(&origin).await.unwrap().unwrap();

    assert!(second - first >= chrono::Duration::milliseconds(1000));
}

#[tokio::test]
async fn test_invalid_and_off_domain_records() {
    let harness = Harness::new();
    let mut s = settings(1);
    s.allow_domains = vec!["allowed.example".to_string()];
    let worker = harness.worker(harness.publisher().await, s);

    harness.seed("mailto:someone@example.com".to_string(), 0).await;
    harness.seed("https://elsewhere.example/".to_string(), 0).await;

    assert_eq!(
        drain(&worker).await,
        vec![TaskOutcome::Invalid, TaskOutcome::OffDomain]
    );
    assert_eq!(harness.counter("skipped_invalid").await, 1);
    assert_eq!(harness.counter("skipped_domain").await, 1);
}
