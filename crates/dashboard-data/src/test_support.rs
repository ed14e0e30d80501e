//! Minimal canned-response HTTP server for client tests.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Request lines (`METHOD /path?query HTTP/1.1`) in arrival order.
pub type SeenRequests = Arc<Mutex<Vec<String>>>;

/// Serve each response to one connection, in order, then stop accepting.
///
/// Returns the base URL and the request lines seen so far.
pub async fn serve(responses: Vec<String>) -> (String, SeenRequests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let seen_task = Arc::clone(&seen);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]);
            let line = request.lines().next().unwrap_or_default().to_string();
            seen_task.lock().await.push(line);
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), seen)
}

/// A complete HTTP/1.1 response with a JSON body.
pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// A local URL nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
