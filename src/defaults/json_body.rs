//! JSON request body parsing.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::pipeline::{DispatchError, Handler, Next};

/// Default body limit: 1 MiB.
pub const DEFAULT_LIMIT: usize = 1024 * 1024;

/// Parsed JSON request body, stored in request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson(pub Value);

/// Buffers and parses `application/json` bodies.
///
/// The parsed value goes into request extensions and the original bytes are
/// restored, so later handlers can use either.
#[derive(Debug, Clone, Copy)]
pub struct JsonBody {
    limit: usize,
}

impl JsonBody {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for JsonBody {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

#[async_trait]
impl Handler for JsonBody {
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        if !is_json(req.headers()) {
            return next.run(req).await;
        }

        let (mut parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, self.limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, limit = self.limit, "Rejecting JSON body");
                return Ok((StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
            }
        };

        if !bytes.is_empty() {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    parts.extensions.insert(ParsedJson(value));
                }
                Err(e) => {
                    let body = Json(json!({ "error": format!("invalid JSON body: {e}") }));
                    return Ok((StatusCode::BAD_REQUEST, body).into_response());
                }
            }
        }

        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}
