//! End-to-end scenarios over real sockets.

use std::time::Duration;

mod common;

#[tokio::test]
async fn scrape_lists_every_defined_metric() {
    let dir = tempfile::tempdir().unwrap();
    common::start_worker(18101, 19101, Some(dir.path())).await;

    let response = reqwest::get("http://127.0.0.1:19101/_metrics")
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let body = response.text().await.unwrap();
    // HELP/TYPE pairs appear even though nothing was recorded yet.
    for metric in [
        "http_incoming_requests",
        "http_incoming_processed_requests",
        "http_incoming_requests_processing_seconds",
        "http_incoming_requests_payload_size",
    ] {
        assert!(body.contains(&format!("# HELP {metric} ")), "missing HELP for {metric}");
        assert!(body.contains(&format!("# TYPE {metric} ")), "missing TYPE for {metric}");
    }
}

#[tokio::test]
async fn requests_are_counted_and_timed() {
    let dir = tempfile::tempdir().unwrap();
    common::start_worker(18102, 19102, Some(dir.path())).await;

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let response = client
            .get("http://127.0.0.1:18102/ping")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["version"].is_string());
    }

    let body = client
        .get("http://127.0.0.1:19102/_metrics")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains(
        "http_incoming_requests_total{method=\"GET\",path=\"/ping\",host=\"127.0.0.1\"} 2"
    ));
    assert!(body.contains(
        "http_incoming_processed_requests_total{method=\"GET\",path=\"/ping\",host=\"127.0.0.1\",status=\"200\"} 2"
    ));
    assert!(body.contains(
        "http_incoming_requests_processing_seconds_count{method=\"GET\",path=\"/ping\",host=\"127.0.0.1\",status=\"200\"} 2"
    ));
}

#[tokio::test]
async fn content_length_matches_the_body_exactly() {
    let dir = tempfile::tempdir().unwrap();
    common::start_worker(18103, 19103, Some(dir.path())).await;

    let response = reqwest::get("http://127.0.0.1:19103/_metrics")
        .await
        .unwrap();
    let declared = response.content_length().unwrap();
    let body = response.bytes().await.unwrap();
    assert_eq!(declared, body.len() as u64);
}

#[tokio::test]
async fn metrics_path_on_the_app_port_reaches_the_application() {
    common::start_worker(18104, 19104, None).await;

    // The demo app has no /_metrics route, so the pass-through answer is
    // its 404, not an exposition.
    let response = reqwest::get("http://127.0.0.1:18104/_metrics")
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn corrupted_shard_does_not_fail_the_scrape() {
    let dir = tempfile::tempdir().unwrap();
    common::start_worker(18105, 19105, Some(dir.path())).await;

    let client = reqwest::Client::new();
    client
        .get("http://127.0.0.1:18105/ping")
        .send()
        .await
        .unwrap();
    std::fs::write(dir.path().join("999-corrupt.json"), b"{ half a shard").unwrap();

    let response = client
        .get("http://127.0.0.1:19105/_metrics")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains(
        "http_incoming_processed_requests_total{method=\"GET\",path=\"/ping\",host=\"127.0.0.1\",status=\"200\"} 1"
    ));
}

#[tokio::test]
async fn single_process_mode_scrapes_without_a_shard_dir() {
    common::start_worker(18106, 19106, None).await;

    let client = reqwest::Client::new();
    client
        .get("http://127.0.0.1:18106/ping")
        .send()
        .await
        .unwrap();
    // Give the post hook a beat on slow machines.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let body = client
        .get("http://127.0.0.1:19106/_metrics")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(
        "http_incoming_requests_total{method=\"GET\",path=\"/ping\",host=\"127.0.0.1\"} 1"
    ));
}

#[tokio::test]
async fn scrapes_are_deterministic_between_merges() {
    let dir = tempfile::tempdir().unwrap();
    common::start_worker(18107, 19107, Some(dir.path())).await;

    let client = reqwest::Client::new();
    client
        .get("http://127.0.0.1:18107/ping")
        .send()
        .await
        .unwrap();

    // Two scrapes with no app traffic in between differ only in the
    // scrape-request series itself, which the first scrape creates; from
    // the second scrape on, the underlying state is identical except for
    // the scrape counters. Compare the /ping series line for line.
    let first = client
        .get("http://127.0.0.1:19107/_metrics")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let second = client
        .get("http://127.0.0.1:19107/_metrics")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let ping_lines = |body: &str| -> Vec<String> {
        body.lines()
            .filter(|l| l.contains("path=\"/ping\""))
            .map(|l| l.to_string())
            .collect()
    };
    assert_eq!(ping_lines(&first), ping_lines(&second));
    assert!(!ping_lines(&first).is_empty());
}
