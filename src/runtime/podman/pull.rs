// ABOUTME: Image pulls through Podman's native libpod endpoint.
// ABOUTME: Speaks HTTP/1 over the engine socket so TLS verification can be disabled.

use crate::runtime::error::{ResourceKind, RuntimeError};
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;

/// One progress object of a libpod pull response.
#[derive(Debug, Deserialize)]
struct PullReport {
    #[serde(default)]
    error: Option<String>,
}

fn pull_uri(image: &str) -> String {
    format!(
        "/v4.0.0/libpod/images/pull?reference={}&tlsVerify=false",
        urlencoding::encode(image)
    )
}

fn pull_failure(image: &str, message: String) -> RuntimeError {
    let lower = message.to_lowercase();
    if lower.contains("manifest unknown") || lower.contains("not found") {
        return RuntimeError::not_found(ResourceKind::Image, image);
    }
    RuntimeError::engine("pull", image, message)
}

/// First error reported in a libpod progress stream, if any.
fn first_error(body: &[u8]) -> Option<String> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<PullReport>()
        .filter_map(Result::ok)
        .find_map(|report| report.error.filter(|e| !e.is_empty()))
}

/// Pull `image` with TLS verification off, so local plain-HTTP registries work.
pub(super) async fn pull(socket: &str, image: &str) -> Result<(), RuntimeError> {
    let unavailable = |e: Box<dyn std::error::Error + Send + Sync>| RuntimeError::EngineUnavailable {
        endpoint: socket.to_string(),
        source: e,
    };

    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| unavailable(Box::new(e)))?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| unavailable(Box::new(e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::warn!(error = %e, "libpod connection error");
        }
    });

    let req = hyper::Request::builder()
        .method("POST")
        .uri(pull_uri(image))
        .header("Host", "localhost")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| RuntimeError::engine("pull", image, e))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| unavailable(Box::new(e)))?;
    let status = resp.status();

    // The body is a progress stream; it ends when the pull is done.
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| RuntimeError::engine("pull", image, e))?
        .to_bytes();

    if status == hyper::StatusCode::NOT_FOUND {
        return Err(RuntimeError::not_found(ResourceKind::Image, image));
    }
    if !status.is_success() {
        return Err(pull_failure(image, String::from_utf8_lossy(&body).into_owned()));
    }
    match first_error(&body) {
        Some(message) => Err(pull_failure(image, message)),
        None => Ok(()),
    }
}
