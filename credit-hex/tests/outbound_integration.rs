//! HTTP adapter tests against a throwaway local HTTP responder.

use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use credit_hex::outbound::{HttpRateProvider, WebhookNotifier};
use credit_types::{NotificationKind, Notifier, NotifyError, RateError, RateProvider, UserId};

/// Serves `status` + `body` to every connection and forwards each request
/// body to the returned channel. `delay` holds the response back.
async fn serve(
    status: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (requests, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let requests = requests.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let _ = requests.send(request);
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/key-rate", addr), received)
}

/// Reads one HTTP request and returns its body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            let body = &buf[header_end + 4..];
            if body.len() >= content_length {
                return String::from_utf8_lossy(body).to_string();
            }
        }
    }
    String::new()
}

#[tokio::test]
async fn test_http_rate_provider_reads_key_rate() {
    let (url, _) = serve("200 OK", r#"{"key_rate": 21}"#, Duration::ZERO).await;
    let provider = HttpRateProvider::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(provider.annual_rate().await.unwrap(), dec!(21));
}

#[tokio::test]
async fn test_http_rate_provider_server_error() {
    let (url, _) = serve("503 Service Unavailable", "{}", Duration::ZERO).await;
    let provider = HttpRateProvider::new(url, Duration::from_secs(5)).unwrap();

    assert!(matches!(
        provider.annual_rate().await,
        Err(RateError::ServiceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_http_rate_provider_malformed_body() {
    let (url, _) = serve("200 OK", r#"{"key_rate": "n/a"}"#, Duration::ZERO).await;
    let provider = HttpRateProvider::new(url, Duration::from_secs(5)).unwrap();

    assert!(matches!(
        provider.annual_rate().await,
        Err(RateError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_http_rate_provider_times_out() {
    let (url, _) = serve("200 OK", r#"{"key_rate": 21}"#, Duration::from_secs(5)).await;
    let provider = HttpRateProvider::new(url, Duration::from_millis(200)).unwrap();

    assert!(matches!(
        provider.annual_rate().await,
        Err(RateError::Timeout)
    ));
}

#[tokio::test]
async fn test_webhook_notifier_posts_envelope() {
    let (url, mut received) = serve("204 No Content", "", Duration::ZERO).await;
    let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
    let recipient = UserId::new();

    notifier
        .send(
            NotificationKind::PaymentOverdue,
            recipient,
            serde_json::json!({ "payment_number": 3 }),
        )
        .await
        .unwrap();

    let body = received.recv().await.unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(envelope["kind"], "payment_overdue");
    assert_eq!(envelope["recipient"], recipient.to_string());
    assert_eq!(envelope["payload"]["payment_number"], 3);
}

#[tokio::test]
async fn test_webhook_notifier_reports_rejection() {
    let (url, _) = serve("500 Internal Server Error", "{}", Duration::ZERO).await;
    let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();

    let result = notifier
        .send(
            NotificationKind::PaymentSucceeded,
            UserId::new(),
            serde_json::json!({}),
        )
        .await;
    assert!(matches!(result, Err(NotifyError::Rejected(500))));
}

#[tokio::test]
async fn test_webhook_notifier_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let notifier =
        WebhookNotifier::new(format!("http://{}/hook", addr), Duration::from_secs(2)).unwrap();
    let result = notifier
        .send(
            NotificationKind::PaymentSucceeded,
            UserId::new(),
            serde_json::json!({}),
        )
        .await;
    assert!(matches!(result, Err(NotifyError::Delivery(_))));
}
