//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use dbgate::clock::{ManualClock, SharedClock};
use dbgate::config::GatewayConfig;
use dbgate::datastore::{self, Connector};
use dbgate::supervisor::ConnectionSupervisor;

/// Handle handed out by [`FakeConnector`]: the 1-based dial number.
pub type FakeHandle = Arc<usize>;

struct FakeInner {
    dials: AtomicUsize,
    closes: AtomicUsize,
    fail: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
}

/// In-memory datastore whose dials can be failed, held open, and counted.
#[derive(Clone)]
pub struct FakeConnector {
    inner: Arc<FakeInner>,
}

impl FakeConnector {
    pub fn healthy() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                dials: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                held: AtomicBool::new(false),
                gate: Semaphore::new(0),
            }),
        }
    }

    pub fn failing() -> Self {
        let connector = Self::healthy();
        connector.set_failing(true);
        connector
    }

    /// Dials block until [`FakeConnector::release`] is called.
    pub fn held() -> Self {
        let connector = Self::healthy();
        connector.inner.held.store(true, Ordering::SeqCst);
        connector
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    /// Let `n` held dials complete.
    pub fn release(&self, n: usize) {
        self.inner.gate.add_permits(n);
    }

    pub fn dials(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Handle = FakeHandle;

    async fn connect(&self) -> Result<Self::Handle, datastore::Error> {
        let n = self.inner.dials.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.held.load(Ordering::SeqCst) {
            let permit = self
                .inner
                .gate
                .acquire()
                .await
                .map_err(|e| datastore::Error::Other(e.to_string()))?;
            permit.forget();
        }
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(datastore::Error::Other("connection refused".into()));
        }
        Ok(Arc::new(n))
    }

    async fn close(&self, _handle: Self::Handle) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn target(&self) -> String {
        "fake://datastore".into()
    }
}

/// Config tuned for fast tests: small breaker threshold, no maintenance.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.reset_timeout_secs = 30;
    config.datastore.connect_timeout_ms = 2_000;
    config.gate.request_timeout_ms = 1_000;
    config.maintenance.enabled = false;
    config
}

pub fn supervisor(
    connector: FakeConnector,
    config: &GatewayConfig,
) -> (ConnectionSupervisor<FakeConnector>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let shared: SharedClock = clock.clone();
    let supervisor = ConnectionSupervisor::new(
        connector,
        &config.datastore,
        &config.circuit_breaker,
        shared,
    );
    (supervisor, clock)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

/// Drive one GET through the router without a socket.
pub async fn get(router: &Router, path: &str) -> TestResponse {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(router, request).await
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
        text,
    }
}

/// A TCP listener that accepts connections and holds them open.
pub async fn start_mock_datastore() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
