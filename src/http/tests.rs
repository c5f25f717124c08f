use super::*;
use std::cell::Cell;

fn fast_client(attempts: u32) -> HttpClient {
    HttpClient::new(Duration::from_secs(5), attempts).with_backoff_unit(Duration::from_millis(1))
}

#[test]
fn retry_attempts_are_at_least_one() {
    let client = HttpClient::new(Duration::from_secs(5), 0);
    assert_eq!(client.retry_attempts(), 1);

    let client = client.with_retry_attempts(4);
    assert_eq!(client.retry_attempts(), 4);
}

#[test]
fn server_errors_are_retried() {
    let client = fast_client(3);
    let calls = Cell::new(0);

    let result = client.with_retry("test", |_| {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(ureq::Error::StatusCode(503))
        } else {
            Ok("done")
        }
    });

    assert_eq!(result.expect("third attempt succeeds"), "done");
    assert_eq!(calls.get(), 3);
}

#[test]
fn client_errors_are_not_retried() {
    let client = fast_client(3);
    let calls = Cell::new(0);

    let result: Result<()> = client.with_retry("test", |_| {
        calls.set(calls.get() + 1);
        Err(ureq::Error::StatusCode(400))
    });

    let error = result.expect_err("400 is fatal");
    assert_eq!(error.to_string(), "HTTP 400");
    assert_eq!(calls.get(), 1);
}

#[test]
fn gives_up_after_all_attempts() {
    let client = fast_client(2);
    let calls = Cell::new(0);

    let result: Result<()> = client.with_retry("test", |_| {
        calls.set(calls.get() + 1);
        Err(ureq::Error::ConnectionFailed)
    });

    assert!(result.is_err());
    assert_eq!(calls.get(), 2);
}

#[test]
fn retryable_classification() {
    assert!(is_retryable(&ureq::Error::StatusCode(500)));
    assert!(is_retryable(&ureq::Error::StatusCode(429)));
    assert!(is_retryable(&ureq::Error::HostNotFound));
    assert!(!is_retryable(&ureq::Error::StatusCode(404)));
}

/// Serve one response whose body stalls for `stall` after `first` is written
fn stalling_server(first: &'static str, rest: &'static str, stall: Duration) -> String {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local addr");

    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
            first.len() + rest.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(first.as_bytes());
        let _ = stream.flush();
        std::thread::sleep(stall);
        let _ = stream.write_all(rest.as_bytes());
    });

    format!("http://{}/", address)
}

#[test]
fn stalled_body_times_out() {
    let url = stalling_server("partial", " body", Duration::from_secs(3));
    let client = HttpClient::new(Duration::from_millis(500), 1);
    let started = std::time::Instant::now();

    let result = client.with_retry("stall", |agent| {
        agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
    });

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn streamed_body_outlives_the_timeout() {
    let url = stalling_server("partial", " body", Duration::from_millis(1200));
    let client = HttpClient::new(Duration::from_millis(500), 1);

    let body = client
        .with_streaming_retry("stream", |agent| {
            agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .expect("streamed body is not time-bounded");

    assert_eq!(body, "partial body");
}
