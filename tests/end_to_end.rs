//! Real sockets on both sides: a TCP datastore and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use dbgate::clock::{SharedClock, SystemClock};
use dbgate::config::GatewayConfig;
use dbgate::datastore::TcpConnector;
use dbgate::lifecycle::{startup, Shutdown};
use dbgate::supervisor::{ConnectionSupervisor, Phase};

mod common;

fn tcp_supervisor(config: &GatewayConfig) -> ConnectionSupervisor<TcpConnector> {
    let clock: SharedClock = Arc::new(SystemClock);
    ConnectionSupervisor::new(
        TcpConnector::new(config.datastore.address.clone()),
        &config.datastore,
        &config.circuit_breaker,
        clock,
    )
}

#[tokio::test]
async fn serves_gated_traffic_and_shuts_down_cleanly() {
    let datastore = common::start_mock_datastore().await;
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.datastore.address = datastore.to_string();
    config.maintenance.enabled = false;

    let supervisor = tcp_supervisor(&config);
    let listener = startup::prepare(&config, &supervisor).await.unwrap();
    assert_eq!(supervisor.phase(), Phase::Connected);
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = tokio::spawn(startup::serve(
        config,
        supervisor.clone(),
        None,
        Router::new(),
        listener,
        shutdown.clone(),
    ));

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let res = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "dbgate is running");

    let res = client
        .get(format!("http://{addr}/health/db"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connection"], "CONNECTED");
    assert_eq!(body["pool"]["target"], datastore.to_string());
    assert_eq!(body["pool"]["connectAttempts"], 1);
    assert_eq!(body["activity"]["requestsTotal"], 1);

    shutdown.trigger();
    server.await.unwrap().unwrap();
    assert_eq!(supervisor.phase(), Phase::Disconnected);
}

#[tokio::test]
async fn shutdown_raised_before_serving_is_not_lost() {
    let datastore = common::start_mock_datastore().await;
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.datastore.address = datastore.to_string();
    config.datastore.idle_timeout_secs = 60;
    config.maintenance.enabled = false;

    let supervisor = tcp_supervisor(&config);
    let listener = startup::prepare(&config, &supervisor).await.unwrap();
    assert_eq!(supervisor.phase(), Phase::Connected);

    let shutdown = Shutdown::new();
    shutdown.trigger();

    let served = tokio::time::timeout(
        Duration::from_secs(5),
        startup::serve(
            config,
            supervisor.clone(),
            None,
            Router::new(),
            listener,
            shutdown,
        ),
    )
    .await
    .expect("serve ignored an earlier shutdown");
    served.unwrap();
    assert_eq!(supervisor.phase(), Phase::Disconnected);
}

#[tokio::test]
async fn unreachable_datastore_is_fatal_at_startup() {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.datastore.address = common::unused_addr().await.to_string();

    let supervisor = tcp_supervisor(&config);
    let err = startup::prepare(&config, &supervisor).await.unwrap_err();

    assert!(format!("{err:#}").contains("initial connection"));
    assert_eq!(supervisor.phase(), Phase::Failed);
}

#[tokio::test]
async fn lazy_startup_connects_on_first_request() {
    let datastore = common::start_mock_datastore().await;
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.datastore.address = datastore.to_string();
    config.datastore.eager_connect = false;

    let supervisor = tcp_supervisor(&config);
    let _listener = startup::prepare(&config, &supervisor).await.unwrap();
    assert_eq!(supervisor.phase(), Phase::Disconnected);

    let link = supervisor.connect().await.unwrap();
    assert_eq!(link.peer(), datastore);
    supervisor.close().await;
}
