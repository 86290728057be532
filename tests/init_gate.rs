//! Initialization-gate behaviour under concurrent traffic.
//!
//! Uses counting mock resolvers and factories to pin down the single-flight,
//! idempotence, and fail-open-retry guarantees, and the separation between
//! "never came up" and "item absent".

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use toolhost::{
    tools::documents::{DocumentStore, MemoryDocumentStore},
    ConnectError, ConnectionFactory, CredentialSpec, DocumentsAdapter, GateStatus, InitError,
    InitGate, SecretError, SecretResolver, SecretValue, ToolError,
};

/// Resolver that replays a script of responses, then repeats the last one.
/// Every call counts, and optionally sleeps to widen race windows.
struct ScriptedResolver {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<String, SecretError>>>,
    fallback: Result<String, SecretError>,
}

impl ScriptedResolver {
    fn ok(value: &str) -> Arc<Self> {
        Self::with_script(Duration::ZERO, vec![], Ok(value.to_string()))
    }

    fn ok_slow(value: &str, delay: Duration) -> Arc<Self> {
        Self::with_script(delay, vec![], Ok(value.to_string()))
    }

    fn with_script(
        delay: Duration,
        script: Vec<Result<String, SecretError>>,
        fallback: Result<String, SecretError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            script: Mutex::new(script.into()),
            fallback,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretResolver for ScriptedResolver {
    async fn resolve(
        &self,
        _store_id: &str,
        _secret_name: &str,
    ) -> Result<SecretValue, SecretError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map(SecretValue::new)
    }
}

/// Factory producing an in-memory document store seeded with `docs`.
struct SeededFactory {
    calls: AtomicUsize,
    docs: Vec<(String, serde_json::Value)>,
}

impl SeededFactory {
    fn new(docs: Vec<(String, serde_json::Value)>) -> SeededFactoryHandle {
        SeededFactoryHandle(Arc::new(Self {
            calls: AtomicUsize::new(0),
            docs,
        }))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Local newtype so `ConnectionFactory` can be implemented on it (the trait
/// and `Arc` are both foreign to this integration-test crate, so `Arc<SeededFactory>`
/// cannot carry the impl directly).
#[derive(Clone)]
struct SeededFactoryHandle(Arc<SeededFactory>);

impl SeededFactoryHandle {
    fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl ConnectionFactory for SeededFactoryHandle {
    type Handle = Arc<dyn DocumentStore>;

    async fn build(&self, _secret: &SecretValue) -> Result<Self::Handle, ConnectError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let store = MemoryDocumentStore::new("items");
        for (id, doc) in &self.0.docs {
            store.insert(id.clone(), doc.clone());
        }
        Ok(Arc::new(store))
    }
}

/// Bare factory for driving `InitGate` directly.
struct StringFactory {
    calls: AtomicUsize,
    fail: Option<ConnectError>,
}

impl StringFactory {
    fn ok() -> StringFactoryHandle {
        StringFactoryHandle(Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: None,
        }))
    }

    fn failing(err: ConnectError) -> StringFactoryHandle {
        StringFactoryHandle(Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: Some(err),
        }))
    }
}

/// Local newtype so `ConnectionFactory` can be implemented on it (the trait
/// and `Arc` are both foreign to this integration-test crate, so `Arc<StringFactory>`
/// cannot carry the impl directly).
#[derive(Clone)]
struct StringFactoryHandle(Arc<StringFactory>);

#[async_trait]
impl ConnectionFactory for StringFactoryHandle {
    type Handle = Arc<String>;

    async fn build(&self, secret: &SecretValue) -> Result<Self::Handle, ConnectError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        match &self.0.fail {
            Some(err) => Err(err.clone()),
            None => Ok(Arc::new(secret.expose().to_string())),
        }
    }
}

fn credential() -> CredentialSpec {
    CredentialSpec {
        store_id: "kv-test".to_string(),
        secret_name: "conn".to_string(),
    }
}

fn denied() -> SecretError {
    SecretError::AccessDenied {
        store: "kv-test".to_string(),
        message: "forbidden".to_string(),
    }
}

// Scenario D: ten simultaneous operations against an uninitialized gate with
// measurable resolver latency collapse into one resolver/factory invocation.
#[tokio::test]
async fn ten_concurrent_operations_single_flight() {
    let resolver = ScriptedResolver::ok_slow("secret", Duration::from_millis(50));
    let factory = SeededFactory::new(vec![("x".to_string(), json!({"id": "x", "v": 1}))]);
    let adapter = Arc::new(DocumentsAdapter::with_factory(
        resolver.clone(),
        factory.clone(),
        credential(),
    ));

    let calls = (0..10).map(|_| {
        let adapter = Arc::clone(&adapter);
        async move { adapter.get_document_by_id("x").await }
    });
    let results = join_all(calls).await;

    for result in results {
        let payload = result.expect("all concurrent calls succeed");
        assert_eq!(payload.data, json!({"id": "x", "v": 1}));
    }
    assert_eq!(resolver.calls(), 1, "resolver invoked exactly once");
    assert_eq!(factory.calls(), 1, "factory invoked exactly once");
    assert_eq!(adapter.status(), GateStatus::Ready);
}

// All callers of one attempt observe the same handle identity.
#[tokio::test]
async fn concurrent_callers_share_handle_identity() {
    let resolver = ScriptedResolver::ok_slow("secret", Duration::from_millis(20));
    let gate = Arc::new(InitGate::provisioned(
        "identity",
        resolver,
        StringFactory::ok(),
        credential(),
    ));

    let handles = join_all((0..4).map(|_| {
        let gate = Arc::clone(&gate);
        async move { gate.ensure_ready().await }
    }))
    .await;

    let first = handles[0].as_ref().expect("attempt succeeds").clone();
    for handle in &handles {
        let handle = handle.as_ref().expect("attempt succeeds");
        assert!(Arc::ptr_eq(&first, handle), "same handle for every waiter");
    }
}

// Idempotence: once ready, repeat calls cost zero resolver/factory work.
#[tokio::test]
async fn ready_gate_serves_without_reinitializing() {
    let resolver = ScriptedResolver::ok("secret");
    let factory = SeededFactory::new(vec![("a".to_string(), json!({"id": "a"}))]);
    let adapter = DocumentsAdapter::with_factory(resolver.clone(), factory.clone(), credential());

    for _ in 0..5 {
        adapter
            .get_document_by_id("a")
            .await
            .expect("document present");
    }
    assert_eq!(resolver.calls(), 1);
    assert_eq!(factory.calls(), 1);
}

// Scenario B: a denied resolver fails all three concurrent callers with the
// same classified cause; one later call triggers exactly one new attempt.
#[tokio::test]
async fn access_denied_shared_then_retried_once() {
    let resolver = ScriptedResolver::with_script(
        Duration::from_millis(20),
        vec![],
        Err(denied()),
    );
    let factory = SeededFactory::new(vec![]);
    let adapter = Arc::new(DocumentsAdapter::with_factory(
        resolver.clone(),
        factory.clone(),
        credential(),
    ));

    let results = join_all((0..3).map(|_| {
        let adapter = Arc::clone(&adapter);
        async move { adapter.get_document_by_id("x").await }
    }))
    .await;

    for result in results {
        match result.expect_err("attempt was denied") {
            ToolError::NotInitialized(InitError::Secret(SecretError::AccessDenied {
                store,
                ..
            })) => assert_eq!(store, "kv-test"),
            other => panic!("expected NotInitialized(AccessDenied), got {other:?}"),
        }
    }
    assert_eq!(resolver.calls(), 1, "three waiters shared one attempt");
    assert_eq!(factory.calls(), 0, "factory never reached a denied attempt");
    assert_eq!(adapter.status(), GateStatus::Failed);

    let err = adapter
        .get_document_by_id("x")
        .await
        .expect_err("still denied");
    assert!(matches!(err, ToolError::NotInitialized(_)));
    assert_eq!(resolver.calls(), 2, "exactly one fresh attempt");
}

// Fail-open retry: after a transient failure, the next caller drives one
// fresh attempt and concurrent callers single-flight onto it.
#[tokio::test]
async fn fail_open_retry_single_flights_the_reattempt() {
    let resolver = ScriptedResolver::with_script(
        Duration::from_millis(20),
        vec![Err(SecretError::StoreUnreachable("timeout".to_string()))],
        Ok("secret".to_string()),
    );
    let factory = SeededFactory::new(vec![("x".to_string(), json!({"id": "x"}))]);
    let adapter = Arc::new(DocumentsAdapter::with_factory(
        resolver.clone(),
        factory.clone(),
        credential(),
    ));

    let err = adapter
        .get_document_by_id("x")
        .await
        .expect_err("first attempt fails");
    match err {
        ToolError::NotInitialized(InitError::Secret(cause)) => assert!(cause.is_transient()),
        other => panic!("expected NotInitialized, got {other:?}"),
    }
    assert_eq!(adapter.status(), GateStatus::Failed);

    let results = join_all((0..5).map(|_| {
        let adapter = Arc::clone(&adapter);
        async move { adapter.get_document_by_id("x").await }
    }))
    .await;
    for result in results {
        result.expect("retry succeeds for every waiter");
    }
    assert_eq!(resolver.calls(), 2, "one failed + one fresh attempt");
    assert_eq!(factory.calls(), 1);
    assert_eq!(adapter.status(), GateStatus::Ready);
}

// Factory failures are classified and shared just like resolver failures.
#[tokio::test]
async fn factory_failure_reaches_all_waiters() {
    let resolver = ScriptedResolver::ok_slow("secret", Duration::from_millis(20));
    let gate = Arc::new(InitGate::provisioned(
        "refused",
        resolver.clone(),
        StringFactory::failing(ConnectError::ConnectionRefused("handshake".to_string())),
        credential(),
    ));

    let results = join_all((0..3).map(|_| {
        let gate = Arc::clone(&gate);
        async move { gate.ensure_ready().await }
    }))
    .await;

    for result in results {
        match result.expect_err("factory refused") {
            InitError::Connection(ConnectError::ConnectionRefused(msg)) => {
                assert_eq!(msg, "handshake")
            }
            other => panic!("expected ConnectionRefused, got {other:?}"),
        }
    }
    assert_eq!(resolver.calls(), 1);
}

// Scenario A + C: a ready gate answers point-reads, reports absent ids as
// NotFound, and performs no further resolver calls while doing so.
#[tokio::test]
async fn not_found_is_distinct_from_not_initialized() {
    let resolver = ScriptedResolver::ok("secret");
    let factory = SeededFactory::new(vec![("present-1".to_string(), json!({"id": "present-1"}))]);
    let adapter = DocumentsAdapter::with_factory(resolver.clone(), factory, credential());

    let payload = adapter
        .get_document_by_id("present-1")
        .await
        .expect("present document");
    assert_eq!(payload.id, "present-1");

    let err = adapter
        .get_document_by_id("missing-1")
        .await
        .expect_err("absent document");
    assert!(
        matches!(err, ToolError::NotFound(_)),
        "absent item reports NotFound, got {err:?}"
    );
    assert_eq!(
        resolver.calls(),
        1,
        "lookups on a ready gate make no resolver calls"
    );
    assert_eq!(adapter.status(), GateStatus::Ready);
}

// A waiter cancelled mid-suspension neither kills the attempt nor perturbs
// the outcome other callers receive.
#[tokio::test]
async fn cancelled_waiter_does_not_affect_the_attempt() {
    let resolver = ScriptedResolver::ok_slow("secret", Duration::from_millis(80));
    let factory = SeededFactory::new(vec![("x".to_string(), json!({"id": "x"}))]);
    let adapter = Arc::new(DocumentsAdapter::with_factory(
        resolver.clone(),
        factory.clone(),
        credential(),
    ));

    let survivor = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.get_document_by_id("x").await }
    });
    let doomed = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.get_document_by_id("x").await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    doomed.abort();
    assert!(doomed.await.is_err(), "waiter was aborted");

    survivor
        .await
        .expect("task completes")
        .expect("surviving waiter gets the handle");
    assert_eq!(resolver.calls(), 1);
    assert_eq!(factory.calls(), 1);
    assert_eq!(adapter.status(), GateStatus::Ready);
}

// Initiator cancellation: even the caller that started the attempt can go
// away without stranding everyone else.
#[tokio::test]
async fn cancelled_initiator_still_completes_for_late_waiters() {
    let resolver = ScriptedResolver::ok_slow("secret", Duration::from_millis(80));
    let gate = Arc::new(InitGate::provisioned(
        "initiator",
        resolver.clone(),
        StringFactory::ok(),
        credential(),
    ));

    let initiator = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.ensure_ready().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gate.status(), GateStatus::Initializing);
    initiator.abort();
    assert!(initiator.await.is_err());

    let handle = gate
        .ensure_ready()
        .await
        .expect("late caller resumes against the same attempt");
    assert_eq!(handle.as_str(), "secret");
    assert_eq!(resolver.calls(), 1, "no second attempt was needed");
}
