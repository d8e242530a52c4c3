//! Concurrency tests: bursts of gated requests against one supervisor.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Router};

use dbgate::config::GatewayConfig;
use dbgate::http::{Db, HttpServer};
use dbgate::supervisor::{ConnectionSupervisor, Phase};

mod common;
use common::{FakeConnector, FakeHandle};

async fn posts(Extension(Db(handle)): Extension<Db<FakeHandle>>) -> String {
    format!("dial {}", handle)
}

fn app(supervisor: ConnectionSupervisor<FakeConnector>, config: &GatewayConfig) -> Router {
    let routes = Router::new().route("/api/v1/posts", get(posts));
    HttpServer::with_routes(config.clone(), supervisor, None, routes).router()
}

async fn burst(router: &Router, n: usize) -> Vec<tokio::task::JoinHandle<common::TestResponse>> {
    (0..n)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move { common::get(&router, "/api/v1/posts").await })
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cold_start_burst_shares_one_dial() {
    let config = common::test_config();
    let connector = FakeConnector::held();
    let (supervisor, _clock) = common::supervisor(connector.clone(), &config);
    let router = app(supervisor.clone(), &config);

    let tasks = burst(&router, 64).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.phase(), Phase::Connecting);
    connector.release(1);

    for task in tasks {
        let res = task.await.unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.text, "dial 1");
    }
    assert_eq!(connector.dials(), 1);
    assert_eq!(supervisor.activity().requests_total(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn half_open_burst_sends_a_single_probe() {
    let config = common::test_config();
    let connector = FakeConnector::held();
    connector.set_failing(true);
    connector.release(3);
    let (supervisor, clock) = common::supervisor(connector.clone(), &config);
    let router = app(supervisor.clone(), &config);

    for _ in 0..3 {
        let res = common::get(&router, "/api/v1/posts").await;
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    }
    assert!(supervisor.breaker().is_open());

    connector.set_failing(false);
    clock.advance(Duration::from_secs(30));

    let tasks = burst(&router, 32).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.dials(), 4);
    connector.release(1);

    for task in tasks {
        let res = task.await.unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.text, "dial 4");
    }
    assert_eq!(connector.dials(), 4);
    assert!(supervisor.is_healthy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sustained_traffic_reuses_the_handle() {
    let config = common::test_config();
    let connector = FakeConnector::healthy();
    let (supervisor, _clock) = common::supervisor(connector.clone(), &config);
    let router = app(supervisor.clone(), &config);

    let start = Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                let res = common::get(&router, "/api/v1/posts").await;
                assert_eq!(res.status, StatusCode::OK);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    println!("400 gated requests in {:?}", start.elapsed());
    assert_eq!(connector.dials(), 1);
    assert_eq!(supervisor.activity().requests_total(), 400);
}
