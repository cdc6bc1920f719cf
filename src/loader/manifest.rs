//! Declarative middleware files.
//!
//! A manifest describes one handler: which requests it applies to, headers it
//! adds, and optionally a canned response. Without `[respond]` the handler
//! calls through to the next one.
//!
//! ```toml
//! [match]
//! method = "GET"
//! path = "/api/users/*"
//!
//! [headers]
//! x-mock = "users"
//!
//! [respond]
//! status = 200
//! json = { users = [] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{
        header::{self, HeaderName, HeaderValue},
        HeaderMap, Method, Request, StatusCode,
    },
    response::Response,
};
use serde::Deserialize;

use crate::loader::{HandlerLoader, LoadError};
use crate::pipeline::{DispatchError, Handler, Next, SharedHandler};
use crate::routing::{AndMatcher, ExactPathMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// On-disk encodings understood by [`ManifestLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(ManifestFormat::Toml),
            "json" => Some(ManifestFormat::Json),
            _ => None,
        }
    }
}

/// Raw manifest as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerManifest {
    #[serde(default, rename = "match")]
    pub matcher: MatchSpec,

    /// Headers added to every response this handler touches.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Canned response; absent means call through.
    pub respond: Option<RespondSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchSpec {
    pub method: Option<String>,
    /// Exact path, or a segment prefix when it ends in `/*`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondSpec {
    #[serde(default = "default_status")]
    pub status: u16,
    pub body: Option<String>,
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_status() -> u16 {
    200
}

impl HandlerManifest {
    /// Parse manifest text in the given format.
    pub fn parse(path: &Path, format: ManifestFormat, content: &str) -> Result<Self, LoadError> {
        let parsed = match format {
            ManifestFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ManifestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| LoadError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Validate and compile into a ready-to-run handler.
    pub fn compile(self, path: &Path) -> Result<ManifestHandler, LoadError> {
        let invalid = |message: String| LoadError::InvalidHandler {
            path: path.to_path_buf(),
            message,
        };

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(method) = &self.matcher.method {
            let method = Method::from_str(&method.to_ascii_uppercase())
                .map_err(|e| invalid(format!("method `{method}`: {e}")))?;
            matchers.push(Box::new(MethodMatcher::new(method)));
        }
        if let Some(route) = &self.matcher.path {
            if !route.starts_with('/') {
                return Err(invalid(format!("path `{route}` must start with '/'")));
            }
            match route.strip_suffix("/*") {
                Some(prefix) => matchers.push(Box::new(PathPrefixMatcher::new(prefix))),
                None => matchers.push(Box::new(ExactPathMatcher::new(route.clone()))),
            }
        }

        let headers = header_map(&self.headers).map_err(invalid)?;

        let response = match self.respond {
            None => None,
            Some(spec) => {
                let status = StatusCode::from_u16(spec.status)
                    .map_err(|_| invalid(format!("status {} is not a valid HTTP status", spec.status)))?;
                let mut headers = header_map(&spec.headers).map_err(invalid)?;
                let body = match (spec.body, spec.json) {
                    (Some(_), Some(_)) => {
                        return Err(invalid("`body` and `json` are mutually exclusive".to_string()))
                    }
                    (Some(text), None) => Bytes::from(text),
                    (None, Some(value)) => {
                        if !headers.contains_key(header::CONTENT_TYPE) {
                            headers.insert(
                                header::CONTENT_TYPE,
                                HeaderValue::from_static("application/json"),
                            );
                        }
                        Bytes::from(value.to_string())
                    }
                    (None, None) => Bytes::new(),
                };
                Some(CannedResponse { status, headers, body })
            }
        };

        Ok(ManifestHandler {
            matcher: AndMatcher::new(matchers),
            headers,
            response,
        })
    }
}

fn header_map(raw: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("header name `{name}`: {e}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| format!("header `{name}` value: {e}"))?;
        map.append(name, value);
    }
    Ok(map)
}

#[derive(Debug, Clone)]
struct CannedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// Handler compiled from a [`HandlerManifest`].
#[derive(Debug)]
pub struct ManifestHandler {
    matcher: AndMatcher,
    headers: HeaderMap,
    response: Option<CannedResponse>,
}

impl ManifestHandler {
    /// True when this handler answers matching requests itself.
    pub fn is_terminal(&self) -> bool {
        self.response.is_some()
    }

    fn decorate(&self, response: &mut Response) {
        for (name, value) in &self.headers {
            response.headers_mut().append(name, value.clone());
        }
    }
}

#[async_trait]
impl Handler for ManifestHandler {
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        if !self.matcher.matches(&req) {
            return next.run(req).await;
        }

        let mut response = match &self.response {
            Some(canned) => {
                let mut response = Response::new(Body::from(canned.body.clone()));
                *response.status_mut() = canned.status;
                *response.headers_mut() = canned.headers.clone();
                response
            }
            None => next.run(req).await?,
        };
        self.decorate(&mut response);
        Ok(response)
    }
}

/// Loads manifest files from disk on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HandlerLoader for ManifestLoader {
    async fn load(&self, path: &Path) -> Result<SharedHandler, LoadError> {
        let format = ManifestFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let handler = HandlerManifest::parse(path, format, &content)?.compile(path)?;

        tracing::debug!(
            path = %path.display(),
            terminal = handler.is_terminal(),
            "Loaded middleware manifest"
        );
        Ok(std::sync::Arc::new(handler))
    }
}
