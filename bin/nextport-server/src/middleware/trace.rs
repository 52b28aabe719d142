use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON request bodies up to this size are logged verbatim at `debug`.
const MAX_LOGGED_BODY: usize = 1024;

/// Upper bound on a buffered request body; matches axum's default `Json` limit.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    // Reuse the caller's trace id when it is a valid UUID.
    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (parts, body) = req.into_parts();
        let mut response = match buffer_and_log(&parts.headers, body).await {
            Ok(req_bytes) => {
                let mut req = Request::from_parts(parts, Body::from(req_bytes));
                if let Some(v) = &header_value {
                    req.headers_mut().insert(X_TRACE_ID, v.clone());
                }
                next.run(req).await
            }
            Err(e) => e.into_response(),
        };
        if let Some(v) = header_value {
            response.headers_mut().insert(X_TRACE_ID, v);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Collect a request body of at most [`MAX_BUFFERED_BODY`] bytes, logging it
/// when it is small JSON.
async fn buffer_and_log(headers: &HeaderMap, body: Body) -> Result<Bytes, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.contains("application/json");

    let bytes = match Limited::new(body, MAX_BUFFERED_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit = MAX_BUFFERED_BODY, "request body too large");
            return Err(ServerError::PayloadTooLarge(format!(
                "request body exceeds {MAX_BUFFERED_BODY} bytes"
            )));
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Err(ServerError::BadRequest("unreadable request body".into()));
        }
    };

    if is_json && bytes.len() < MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            debug!(body = %text, "request body");
        }
    } else if !bytes.is_empty() {
        debug!(content_type, size = bytes.len(), "request body skipped");
    }

    Ok(bytes)
}
