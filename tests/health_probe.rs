mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use pgadmin4_runtime::health::{
    HealthCheckSession, HealthPoller, HttpProbe, LaunchTiming, PollOutcome, Probe, STATUS_STARTED,
};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{QuietPresenter, serve};

#[derive(Deserialize)]
struct PingQuery {
    key: String,
}

/// Answers 503 for the first `warmup` pings, then 200 for the right key.
async fn ping(
    State((hits, warmup)): State<(Arc<AtomicU32>, u32)>,
    Query(q): Query<PingQuery>,
) -> StatusCode {
    let n = hits.fetch_add(1, Ordering::SeqCst);
    if q.key != "session" {
        StatusCode::UNAUTHORIZED
    } else if n < warmup {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

fn backend(warmup: u32) -> (Router, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/misc/ping", get(ping))
        .with_state((Arc::clone(&hits), warmup));
    (app, hits)
}

#[tokio::test]
async fn probe_accepts_2xx_only() {
    let (app, _) = backend(0);
    let addr = serve(app).await;

    let good = HttpProbe::new(format!("http://{addr}/misc/ping?key=session"), Duration::from_secs(5)).unwrap();
    let bad = HttpProbe::new(format!("http://{addr}/misc/ping?key=other"), Duration::from_secs(5)).unwrap();

    assert!(good.probe().await.is_ok());
    assert!(bad.probe().await.is_err());
}

#[tokio::test]
async fn connection_refused_is_a_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = HttpProbe::new(format!("http://127.0.0.1:{port}/misc/ping?key=session"), Duration::from_secs(5)).unwrap();

    assert!(probe.probe().await.is_err());
}

#[tokio::test]
async fn poller_waits_for_backend_warmup() {
    let (app, hits) = backend(2);
    let addr = serve(app).await;
    let url = format!("http://{addr}/misc/ping?key=session");
    let presenter = Arc::new(QuietPresenter::default());
    let poller = HealthPoller::new(
        HttpProbe::new(url.clone(), Duration::from_secs(10)).unwrap(),
        presenter.clone(),
    )
    .with_tick(Duration::from_millis(50));
    let now = Instant::now();
    let session = HealthCheckSession::new(url, now, Duration::from_secs(10));

    let outcome = poller
        .poll_until_healthy(
            &session,
            LaunchTiming {
                launch_started: now,
                spawned: now,
            },
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome, PollOutcome::Healthy { attempts: 3 });
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(
        presenter.statuses.lock().unwrap().last().map(String::as_str),
        Some(STATUS_STARTED)
    );
}
