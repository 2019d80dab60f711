// tests/fetcher_http.rs
//
// HttpFetcher against real sockets: an axum router on an ephemeral port,
// plus a raw TCP responder for chunked bodies without a Content-Length.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use topic_digest::config::settings::Tunables;
use topic_digest::error::FetchError;
use topic_digest::ingest::fetcher::{Fetcher, HttpFetcher};
use topic_digest::model::{Source, SourceKind};

mod common;

type Arrivals = Arc<Mutex<Vec<Instant>>>;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

fn router(arrivals: Arrivals) -> Router {
    Router::new()
        .route("/unavailable", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/big", get(|| async { vec![b'x'; 4096] }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route(
            "/echo",
            get(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string();
                let region = q.get("region").cloned().unwrap_or_else(|| "-".into());
                format!("{key}|{region}")
            }),
        )
        .route(
            "/ok",
            get(|State(arrivals): State<Arrivals>| async move {
                arrivals.lock().unwrap().push(Instant::now());
                ([("content-type", "application/rss+xml")], "<rss/>")
            }),
        )
        .with_state(arrivals)
}

/// Answers one request with `chunks` chunks of 512 bytes and no length header.
async fn serve_chunked(chunks: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut sock, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 4096];
        let _ = sock.read(&mut buf).await;
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\n\
                    transfer-encoding: chunked\r\nconnection: close\r\n\r\n";
        if sock.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let chunk = [b'y'; 512];
        for _ in 0..chunks {
            // The client hangs up once its cap is hit.
            if sock.write_all(b"200\r\n").await.is_err()
                || sock.write_all(&chunk).await.is_err()
                || sock.write_all(b"\r\n").await.is_err()
            {
                return;
            }
        }
        let _ = sock.write_all(b"0\r\n\r\n").await;
    });
    format!("http://{addr}")
}

fn source_at(url: String) -> Source {
    let mut src = common::source("remote", SourceKind::Rss, 0.5, &["technology"]);
    src.url = url;
    src
}

fn fetcher(tunables: Tunables) -> HttpFetcher {
    HttpFetcher::new(&tunables).expect("http client")
}

fn small_limits() -> Tunables {
    Tunables {
        max_response_bytes: 1024,
        fetch_timeout_secs: 1,
        ..common::tunables()
    }
}

#[tokio::test]
async fn error_status_is_reported_with_its_code() {
    let base = serve(router(Arrivals::default())).await;
    let err = fetcher(small_limits())
        .fetch(&source_at(format!("{base}/unavailable")))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::HttpStatus(503));
}

#[tokio::test]
async fn announced_length_over_the_cap_is_refused() {
    let base = serve(router(Arrivals::default())).await;
    let err = fetcher(small_limits())
        .fetch(&source_at(format!("{base}/big")))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::TooLarge { limit: 1024 });
}

#[tokio::test]
async fn chunked_body_over_the_cap_is_cut_off() {
    let base = serve_chunked(16).await;
    let err = fetcher(small_limits())
        .fetch(&source_at(format!("{base}/stream")))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::TooLarge { limit: 1024 });
}

#[tokio::test]
async fn chunked_body_under_the_cap_is_returned() {
    let base = serve_chunked(1).await;
    let resp = fetcher(small_limits())
        .fetch(&source_at(format!("{base}/stream")))
        .await
        .unwrap();
    assert_eq!(resp.body.len(), 512);
    assert_eq!(resp.content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn slow_server_times_out() {
    let base = serve(router(Arrivals::default())).await;
    let started = Instant::now();
    let err = fetcher(small_limits())
        .fetch(&source_at(format!("{base}/slow")))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn configured_headers_and_params_are_sent() {
    let base = serve(router(Arrivals::default())).await;
    let mut src = source_at(format!("{base}/echo"));
    src.headers.insert("X-Api-Key".into(), "k-123".into());
    src.params.insert("region".into(), "north".into());
    let resp = fetcher(small_limits()).fetch(&src).await.unwrap();
    assert_eq!(resp.text(), "k-123|north");
}

#[tokio::test]
async fn requests_to_one_source_are_spaced() {
    let arrivals = Arrivals::default();
    let base = serve(router(arrivals.clone())).await;
    let fetcher = fetcher(Tunables {
        rate_limit_spacing_ms: 300,
        ..small_limits()
    });
    let src = source_at(format!("{base}/ok"));

    let first = fetcher.fetch(&src).await.unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.content_type.as_deref(), Some("application/rss+xml"));
    fetcher.fetch(&src).await.unwrap();

    let seen = arrivals.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].duration_since(seen[0]) >= Duration::from_millis(290));
}
