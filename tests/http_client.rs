//! HTTP client behavior against a local canned-response server: retry
//! budget, linear backoff, challenge recovery, and Host/SNI override.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use reach_probe::client::{HttpClient, RequestConfig, RequestDescriptor, RequestError};

fn canned(status: u16, reason: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        reason,
        body.len(),
        extra_headers,
        body
    )
}

/// Serves one canned response per connection, repeating the last one once
/// the script runs out. `Connection: close` in every response keeps one
/// connection per request so the hit count equals the attempt count.
async fn spawn_server(
    script: Vec<String>,
) -> (SocketAddr, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let hits_bg = Arc::clone(&hits);
    let requests_bg = Arc::clone(&requests);
    tokio::spawn(async move {
        let mut remaining = script.into_iter();
        let mut last = String::new();
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            hits_bg.fetch_add(1, Ordering::SeqCst);

            let mut head = String::new();
            let mut buf = [0u8; 4096];
            loop {
                if let Some(pos) = head.find("\r\n\r\n") {
                    let content_length = head[..pos]
                        .lines()
                        .find_map(|line| {
                            let line = line.to_lowercase();
                            line.strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if head.len() >= pos + 4 + content_length {
                        break;
                    }
                }
                let Ok(read) = sock.read(&mut buf).await else {
                    break;
                };
                if read == 0 {
                    break;
                }
                head.push_str(&String::from_utf8_lossy(&buf[..read]));
            }
            requests_bg.lock().unwrap().push(head);

            if let Some(next) = remaining.next() {
                last = next;
            }
            let _ = sock.write_all(last.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });

    (addr, hits, requests)
}

fn client(max_retries: u32, service_domain: &str) -> HttpClient {
    HttpClient::new(
        RequestConfig {
            timeout: Duration::from_secs(5),
            max_retries,
            retry_delay: Duration::from_millis(20),
        },
        service_domain,
    )
    .unwrap()
}

#[tokio::test]
async fn first_success_short_circuits() {
    let (addr, hits, _) = spawn_server(vec![canned(200, "OK", "", "hello")]).await;
    let client = client(3, "example.com");

    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "hello");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_exhaust_the_full_retry_budget() {
    let (addr, hits, _) = spawn_server(vec![canned(500, "Internal Server Error", "", "")]).await;
    let client = client(2, "example.com");

    let start = Instant::now();
    let err = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    // max_retries + 1 attempts, with 1*20ms + 2*20ms of linear backoff.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_millis(60));
    match err {
        RequestError::Exhausted { status, .. } => assert_eq!(status, 500),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn a_retry_can_recover_from_a_transient_5xx() {
    let (addr, hits, _) = spawn_server(vec![
        canned(502, "Bad Gateway", "", ""),
        canned(200, "OK", "", "recovered"),
    ])
    .await;
    let client = client(3, "example.com");

    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhaustion_without_any_response_reports_internal_error_status() {
    // Nothing listens on this address; every attempt is a transport error.
    let client = client(1, "example.com");
    let err = client
        .request(
            &RequestDescriptor::get("http://127.0.0.1:1"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    match err {
        RequestError::Exhausted { source, .. } => assert!(source.is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn challenge_grants_exactly_one_extra_attempt() {
    // The service keeps answering 403 with a cookie; the one challenge
    // retry is spent, then the 403 is returned as a normal response.
    let (addr, hits, requests) = spawn_server(vec![canned(
        403,
        "Forbidden",
        "Set-Cookie: sid=abc123; Path=/\r\n",
        "checking your browser",
    )])
    .await;
    let client = client(3, "127.0.0.1");

    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // The replay carries the interstitial's cookie from the shared store.
    let requests = requests.lock().unwrap();
    assert!(requests[1].to_lowercase().contains("sid=abc123"));
}

#[tokio::test]
async fn challenge_replay_does_not_consume_a_normal_retry_slot() {
    // 503 + cookie triggers the challenge replay; the second 503 is no
    // longer challenge-eligible and burns normal retries instead.
    let (addr, hits, _) = spawn_server(vec![
        canned(503, "Service Unavailable", "Set-Cookie: sid=1; Path=/\r\n", ""),
        canned(503, "Service Unavailable", "Set-Cookie: sid=1; Path=/\r\n", ""),
        canned(200, "OK", "", "through"),
    ])
    .await;
    let client = client(1, "127.0.0.1");

    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn challenge_is_not_granted_off_the_service_domain() {
    let (addr, hits, _) = spawn_server(vec![canned(
        403,
        "Forbidden",
        "Set-Cookie: sid=abc123; Path=/\r\n",
        "",
    )])
    .await;
    let client = client(3, "example.com");

    // 403 is below 500, so without challenge eligibility it is simply the
    // response.
    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn challenge_requires_a_cookie() {
    let (addr, hits, _) = spawn_server(vec![canned(403, "Forbidden", "", "")]).await;
    let client = client(3, "127.0.0.1");

    let response = client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn host_override_rewrites_the_wire_host_header() {
    let (addr, _, requests) = spawn_server(vec![canned(200, "OK", "", "ok")]).await;
    let client = client(0, "example.com");

    let desc = RequestDescriptor::get(format!("http://{}", addr))
        .with_header("Host", "check.shecan.ir");
    let response = client
        .request(&desc, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let requests = requests.lock().unwrap();
    let head = requests[0].to_lowercase();
    assert!(
        head.contains("host: check.shecan.ir"),
        "missing overridden host header in: {head}"
    );
    assert!(!head.contains("host: 127.0.0.1"));
}

#[tokio::test]
async fn default_headers_are_applied_when_none_are_given() {
    let (addr, _, requests) = spawn_server(vec![canned(200, "OK", "", "ok")]).await;
    let client = client(0, "example.com");

    client
        .request(
            &RequestDescriptor::get(format!("http://{}", addr)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let requests = requests.lock().unwrap();
    let head = requests[0].to_lowercase();
    assert!(head.contains("user-agent: reach-probe/"));
    assert!(head.contains("accept: application/json"));
}

#[tokio::test]
async fn caller_headers_replace_the_defaults() {
    let (addr, _, requests) = spawn_server(vec![canned(200, "OK", "", "ok")]).await;
    let client = client(0, "example.com");

    let desc = RequestDescriptor::get(format!("http://{}", addr))
        .with_header("X-Probe", "1")
        .with_header("Accept", "text/plain");
    client.request(&desc, &CancellationToken::new()).await.unwrap();

    let requests = requests.lock().unwrap();
    let head = requests[0].to_lowercase();
    assert!(head.contains("x-probe: 1"));
    assert!(head.contains("accept: text/plain"));
    assert!(!head.contains("accept: application/json"));
}

#[tokio::test]
async fn cancellation_stops_before_any_attempt() {
    let (addr, hits, _) = spawn_server(vec![canned(200, "OK", "", "ok")]).await;
    let client = client(3, "example.com");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = client
        .request(&RequestDescriptor::get(format!("http://{}", addr)), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Cancelled));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn post_bodies_are_sent() {
    let (addr, _, requests) = spawn_server(vec![canned(200, "OK", "", "ok")]).await;
    let client = client(0, "example.com");

    let desc = RequestDescriptor {
        url: format!("http://{}", addr),
        method: Some("post".into()),
        body: Some("payload=1".into()),
        headers: vec![("Content-Type".into(), "application/x-www-form-urlencoded".into())],
        timeout_secs: None,
    };
    client.request(&desc, &CancellationToken::new()).await.unwrap();

    let requests = requests.lock().unwrap();
    assert!(requests[0].starts_with("POST "));
    assert!(requests[0].contains("payload=1"));
}

#[tokio::test]
async fn invalid_urls_fail_without_attempts() {
    let client = client(3, "example.com");
    let err = client
        .request(
            &RequestDescriptor::get("not a url"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Invalid(_)));
}
