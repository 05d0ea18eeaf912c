//! Tests for the remote bucket backend
//!
//! These tests verify:
//! - Object URLs follow the bucket/prefix/shard layout
//! - HEAD / GET (with Range) / PUT / DELETE status handling
//! - Nothing is uploaded for an object that fails verification
//! - Unreachable or failing buckets surface as BackendUnavailable
//!
//! ## Note on `spawn_blocking`
//!
//! The store and its HTTP client are blocking and must not be created, used
//! or dropped on a Tokio worker. Every store call runs inside
//! `tokio::task::spawn_blocking` while wiremock serves from the runtime.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use lfs_store::backend::{Backend, RemoteBackend};
use lfs_store::config::RemoteOptions;
use lfs_store::{Config, ContentStore, ObjectDescriptor, StorageTarget, StoreError};
use sha2::{Digest, Sha256};
use url::Url;
use wiremock::matchers::{any, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const OBJECT_PATHS: &str = "^/bucket/lfs/";

// =============================================================================
// Bucket Mock
// =============================================================================

/// Objects held by the mocked bucket, keyed by request path
#[derive(Clone, Default)]
struct BucketObjects(Arc<Mutex<HashMap<String, Vec<u8>>>>);

impl BucketObjects {
    fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(path).cloned()
    }

    fn insert(&self, path: &str, data: &[u8]) {
        self.0.lock().unwrap().insert(path.to_string(), data.to_vec());
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Serve HEAD / GET / PUT / DELETE for every object path on `server`
    async fn mount(&self, server: &MockServer) {
        let objects = self.clone();
        Mock::given(method("HEAD"))
            .and(path_regex(OBJECT_PATHS))
            .respond_with(move |req: &Request| match objects.get(req.url.path()) {
                // Body is dropped for HEAD; it only sets Content-Length.
                Some(data) => ResponseTemplate::new(200).set_body_bytes(data),
                None => ResponseTemplate::new(404),
            })
            .mount(server)
            .await;

        let objects = self.clone();
        Mock::given(method("GET"))
            .and(path_regex(OBJECT_PATHS))
            .respond_with(move |req: &Request| {
                let Some(data) = objects.get(req.url.path()) else {
                    return ResponseTemplate::new(404);
                };
                match range_start(req) {
                    Some(start) if start >= data.len() => ResponseTemplate::new(416)
                        .insert_header("content-range", format!("bytes */{}", data.len())),
                    Some(start) => {
                        ResponseTemplate::new(206).set_body_bytes(data[start..].to_vec())
                    }
                    None => ResponseTemplate::new(200).set_body_bytes(data),
                }
            })
            .mount(server)
            .await;

        let objects = self.clone();
        Mock::given(method("PUT"))
            .and(path_regex(OBJECT_PATHS))
            .respond_with(move |req: &Request| {
                objects.insert(req.url.path(), &req.body);
                ResponseTemplate::new(200)
            })
            .mount(server)
            .await;

        let objects = self.clone();
        Mock::given(method("DELETE"))
            .and(path_regex(OBJECT_PATHS))
            .respond_with(move |req: &Request| {
                match objects.0.lock().unwrap().remove(req.url.path()) {
                    Some(_) => ResponseTemplate::new(204),
                    None => ResponseTemplate::new(404),
                }
            })
            .mount(server)
            .await;
    }
}

/// `N` from a `Range: bytes=N-` header
fn range_start(req: &Request) -> Option<usize> {
    req.headers
        .get("range")?
        .to_str()
        .ok()?
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

async fn start_bucket() -> (MockServer, BucketObjects) {
    let server = MockServer::start().await;
    let objects = BucketObjects::default();
    objects.mount(&server).await;
    (server, objects)
}

async fn received(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.method.as_str() == verb)
        .count()
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

fn options() -> RemoteOptions {
    RemoteOptions {
        timeout_ms: 5_000,
        connect_timeout_ms: 2_000,
        use_env_proxy: false,
    }
}

fn bucket_url(uri: &str) -> String {
    format!("{uri}/bucket")
}

fn remote_store(uri: &str) -> ContentStore {
    let config = Config::builder()
        .target(StorageTarget::remote(&bucket_url(uri), "lfs").unwrap())
        .remote_timeout_ms(5_000)
        .remote_env_proxy(false)
        .build();
    ContentStore::open(&config).unwrap()
}

fn remote_backend(uri: &str) -> RemoteBackend {
    RemoteBackend::new(Url::parse(&bucket_url(uri)).unwrap(), "lfs", options()).unwrap()
}

fn descriptor_for(data: &[u8]) -> ObjectDescriptor {
    let oid = hex::encode(Sha256::digest(data));
    ObjectDescriptor::parse(&oid, data.len() as u64).unwrap()
}

fn object_path(descriptor: &ObjectDescriptor) -> String {
    format!("/bucket/lfs/{}", descriptor.storage_key())
}

fn read_all(mut reader: impl Read) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

// =============================================================================
// URL Layout Tests
// =============================================================================

#[test]
fn test_object_url_layout() {
    let backend = RemoteBackend::new(
        Url::parse("http://objects.example/bucket/").unwrap(),
        "/team//lfs/",
        options(),
    )
    .unwrap();

    let url = backend.object_url("ab/cd/ef0123").unwrap();
    assert_eq!(
        url.as_str(),
        "http://objects.example/bucket/team/lfs/ab/cd/ef0123"
    );
}

#[test]
fn test_object_url_without_prefix() {
    let backend =
        RemoteBackend::new(Url::parse("http://objects.example").unwrap(), "", options()).unwrap();

    let url = backend.object_url("ab/cd/ef").unwrap();
    assert_eq!(url.as_str(), "http://objects.example/ab/cd/ef");
}

#[test]
fn test_object_url_rejects_traversal() {
    let backend =
        RemoteBackend::new(Url::parse("http://objects.example/b").unwrap(), "lfs", options())
            .unwrap();

    let err = backend.object_url("ab/../../etc").unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier(_)));
}

#[test]
fn test_cannot_be_a_base_url_rejected() {
    let err = RemoteBackend::new(Url::parse("mailto:ops@example.com").unwrap(), "", options())
        .unwrap_err();

    assert!(matches!(err, StoreError::Config(_)));
}

#[test]
fn test_debug_shows_bucket_and_prefix() {
    let backend = RemoteBackend::new(
        Url::parse("http://objects.example/bucket").unwrap(),
        "team/lfs",
        options(),
    )
    .unwrap();

    let debug = format!("{backend:?}");
    assert!(debug.contains("http://objects.example/bucket"));
    assert!(debug.contains("team/lfs"));
}

// =============================================================================
// Store Over Remote Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_put_get_round_trip() {
    let (server, objects) = start_bucket().await;
    let data = b"remote object body".to_vec();
    let descriptor = descriptor_for(&data);

    let uri = server.uri();
    let (d, body) = (descriptor.clone(), data.clone());
    let read_back = blocking(move || {
        let store = remote_store(&uri);
        store.put(&d, Cursor::new(&body)).unwrap();

        assert!(store.exists(&d));
        assert!(store.verify(&d).unwrap());
        assert!(store.verify_content(&d).unwrap());
        read_all(store.get(&d, 0).unwrap())
    })
    .await;

    assert_eq!(read_back, data);
    assert_eq!(objects.get(&object_path(&descriptor)), Some(data));
    assert_eq!(received(&server, "PUT").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_put_uploads_nothing() {
    let (server, objects) = start_bucket().await;
    let data = b"remote object body";
    let descriptor = ObjectDescriptor::parse(&hex::encode(Sha256::digest(data)), 99).unwrap();

    let uri = server.uri();
    let err = blocking(move || remote_store(&uri).put(&descriptor, &data[..]).unwrap_err()).await;

    assert!(matches!(err, StoreError::SizeMismatch { expected: 99, .. }));
    assert_eq!(received(&server, "PUT").await, 0);
    assert_eq!(objects.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ranged_get() {
    let (server, _objects) = start_bucket().await;

    let uri = server.uri();
    blocking(move || {
        let store = remote_store(&uri);
        let data = b"0123456789";
        let descriptor = descriptor_for(data);
        store.put(&descriptor, &data[..]).unwrap();

        assert_eq!(read_all(store.get(&descriptor, 4).unwrap()), b"456789");
        assert!(read_all(store.get(&descriptor, 10).unwrap()).is_empty());

        let err = store.get(&descriptor, 11).err().unwrap();
        assert!(matches!(
            err,
            StoreError::RangeError {
                offset: 11,
                size: 10
            }
        ));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_is_idempotent() {
    let (server, objects) = start_bucket().await;

    let uri = server.uri();
    blocking(move || {
        let store = remote_store(&uri);
        let data = b"short lived";
        let descriptor = descriptor_for(data);
        store.put(&descriptor, &data[..]).unwrap();

        store.delete(&descriptor).unwrap();
        assert!(!store.exists(&descriptor));

        // Bucket answers 404 the second time.
        store.delete(&descriptor).unwrap();
    })
    .await;

    assert_eq!(objects.len(), 0);
    assert_eq!(received(&server, "DELETE").await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_object() {
    let (server, _objects) = start_bucket().await;

    let uri = server.uri();
    blocking(move || {
        let store = remote_store(&uri);
        let descriptor = descriptor_for(b"never stored");

        assert!(!store.try_exists(&descriptor).unwrap());
        assert!(store.get(&descriptor, 0).err().unwrap().is_not_found());
        assert!(store.verify(&descriptor).unwrap_err().is_not_found());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_verify_detects_short_remote_object() {
    let (server, objects) = start_bucket().await;
    let data = b"the full object";
    let descriptor = descriptor_for(data);
    objects.insert(&object_path(&descriptor), &data[..8]);

    let uri = server.uri();
    let ok = blocking(move || remote_store(&uri).verify(&descriptor).unwrap()).await;

    assert!(!ok);
}

// =============================================================================
// Handle-Level Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_skips_when_range_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket/lfs/ab/cd/ef"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .mount(&server)
        .await;

    let uri = server.uri();
    blocking(move || {
        let handle = remote_backend(&uri).open().unwrap();

        assert_eq!(read_all(handle.new_reader("ab/cd/ef", 3).unwrap()), b"3456789");
        assert!(read_all(handle.new_reader("ab/cd/ef", 10).unwrap()).is_empty());

        // Body runs out before the offset is reached.
        let err = handle.new_reader("ab/cd/ef", 12).err().unwrap();
        assert!(matches!(
            err,
            StoreError::RangeError {
                offset: 12,
                size: 10
            }
        ));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_range_not_satisfiable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket/lfs/ab/cd/ef"))
        .and(header("range", "bytes=12-"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/bucket/lfs/ab/cd/ef"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .mount(&server)
        .await;

    let uri = server.uri();
    let err = blocking(move || {
        let handle = remote_backend(&uri).open().unwrap();
        handle.new_reader("ab/cd/ef", 12).err().unwrap()
    })
    .await;

    assert!(matches!(
        err,
        StoreError::RangeError {
            offset: 12,
            size: 10
        }
    ));
    assert_eq!(received(&server, "HEAD").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_at_end_is_empty() {
    let (server, objects) = start_bucket().await;
    objects.insert("/bucket/lfs/ab/cd/ef", b"0123456789");

    let uri = server.uri();
    let rest = blocking(move || {
        let handle = remote_backend(&uri).open().unwrap();
        read_all(handle.new_reader("ab/cd/ef", 10).unwrap())
    })
    .await;

    assert!(rest.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stat_size_and_exists() {
    let (server, objects) = start_bucket().await;
    objects.insert("/bucket/lfs/ab/cd/ef", b"12345");

    let uri = server.uri();
    blocking(move || {
        let handle = remote_backend(&uri).open().unwrap();

        assert!(handle.exists("ab/cd/ef").unwrap());
        assert_eq!(handle.stat_size("ab/cd/ef").unwrap(), 5);
        assert!(!handle.exists("ab/cd/00").unwrap());
        assert!(handle.stat_size("ab/cd/00").unwrap_err().is_not_found());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_writer_uploads_nothing() {
    let (server, objects) = start_bucket().await;

    let uri = server.uri();
    blocking(move || {
        let handle = remote_backend(&uri).open().unwrap();

        let mut writer = handle.new_writer("ab/cd/ef").unwrap();
        writer.write_all(b"partial").unwrap();
        writer.abort();

        assert!(!handle.exists("ab/cd/ef").unwrap());
    })
    .await;

    assert_eq!(received(&server, "PUT").await, 0);
    assert_eq!(objects.len(), 0);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_errors_are_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let uri = server.uri();
    blocking(move || {
        let store = remote_store(&uri);
        let data = b"anything";
        let descriptor = descriptor_for(data);

        // Fail-open exists, fail-closed everything else.
        assert!(!store.exists(&descriptor));
        assert!(matches!(
            store.try_exists(&descriptor).unwrap_err(),
            StoreError::BackendUnavailable(_)
        ));
        assert!(matches!(
            store.put(&descriptor, &data[..]).unwrap_err(),
            StoreError::BackendUnavailable(_)
        ));
        assert!(matches!(
            store.delete(&descriptor).unwrap_err(),
            StoreError::BackendUnavailable(_)
        ));
    })
    .await;
}

#[test]
fn test_unreachable_bucket() {
    // Grab a free port, then close it.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let store = remote_store(&format!("http://{addr}"));
    let descriptor = descriptor_for(b"x");

    assert!(!store.exists(&descriptor));
    assert!(matches!(
        store.try_exists(&descriptor).unwrap_err(),
        StoreError::BackendUnavailable(_)
    ));
}
