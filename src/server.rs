//! Exposition Server
//!
//! Serves the latency series on `/metrics` and the liveness document on
//! every other path. Peers probe this same server, so the liveness handler
//! doubles as the probe target.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metrics::LatencyMetrics;

/// Message carried by the liveness document.
pub const LIVENESS_MESSAGE: &str = "connected to scout";

/// Liveness document returned on `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: LivenessMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessMessage {
    pub message: String,
}

impl LivenessResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            status_code: StatusCode::OK.as_u16(),
            body: LivenessMessage {
                message: LIVENESS_MESSAGE.to_string(),
            },
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// The fixed liveness response.
pub fn liveness_response() -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&LivenessResponse::ok()).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Current metrics in the text exposition format.
pub fn metrics_response(metrics: &LatencyMetrics) -> Response<Full<Bytes>> {
    match metrics.encode() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            let value = HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(prometheus::TEXT_FORMAT));
            response.headers_mut().insert(CONTENT_TYPE, value);
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            let mut response = Response::new(Full::new(Bytes::from("failed to encode metrics")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// Dispatch on request path.
pub fn route(path: &str, metrics: &LatencyMetrics) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(metrics),
        _ => liveness_response(),
    }
}

// =============================================================================
// Server
// =============================================================================

/// Bind the exposition listener.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind server on {}: {}", addr, e)))?;

    info!("server is listening at http://{}", addr);
    Ok(listener)
}

/// Accept connections until `cancel` fires.
///
/// Accept errors are logged and do not stop the server.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<LatencyMetrics>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Server accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let metrics = Arc::clone(&metrics);
                async move { Ok::<_, Infallible>(route(req.uri().path(), &metrics)) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, "Server connection error: {}", e);
            }
        });
    }

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SourceIdentity;
    use http_body_util::BodyExt;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_exact_body() {
        let response = liveness_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_string(response).await,
            r#"{"status":"OK","statusCode":200,"body":{"message":"connected to scout"}}"#
        );
    }

    #[tokio::test]
    async fn test_liveness_roundtrips() {
        let body = body_string(liveness_response()).await;
        let parsed: LivenessResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, LivenessResponse::ok());
        assert_eq!(parsed.body.message, "connected to scout");
    }

    #[tokio::test]
    async fn test_route_dispatch() {
        let metrics = LatencyMetrics::new("scout", SourceIdentity::local()).unwrap();

        let response = route("/metrics", &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(CONTENT_TYPE).unwrap().clone();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));

        let response = route("/", &metrics);
        assert!(body_string(response).await.contains(LIVENESS_MESSAGE));

        let response = route("/anything", &metrics);
        assert!(body_string(response).await.contains(LIVENESS_MESSAGE));
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        assert!(matches!(bind("not-an-addr").await, Err(Error::Config(_))));
    }
}
