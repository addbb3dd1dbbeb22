//! Minimal HTTP listener for Prometheus `/metrics` scraping.
//! Raw `TcpListener`, kept off the API router so scrapes bypass auth and rate limits.

use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::state::ServiceMetrics;

/// Serve Prometheus text metrics at any path on `addr` until the cancel token fires.
pub async fn serve_metrics(addr: String, metrics: Arc<ServiceMetrics>, cancel: CancellationToken) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics HTTP: failed to bind {}: {}", addr, e);
            return;
        }
    };

    tracing::info!("Metrics HTTP: listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Metrics HTTP: shutting down");
                break;
            }
            accept = listener.accept() => {
                let (mut stream, _) = match accept {
                    Ok(s) => s,
                    Err(_) => continue,
                };

                let response = render_response(&metrics.to_prometheus());
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        }
    }
}

fn render_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain; version=0.0.4; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    )
}
