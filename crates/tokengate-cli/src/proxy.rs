//! Upstream forwarding for requests that passed the gate

use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};
use url::Url;

/// Connection-scoped headers that must not be relayed (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Header names listed in `Connection`; these are hop-by-hop as well.
fn connection_options(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|option| option.trim().to_ascii_lowercase())
        .filter(|option| !option.is_empty())
        .collect()
}

fn relayable(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_options(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let named_by_connection = listed.iter().any(|option| option == name.as_str());
        if !is_hop_by_hop(name) && !named_by_connection && *name != header::HOST {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// The protected service behind the gate.
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
    max_body_bytes: usize,
}

impl Upstream {
    pub fn new(base: Url, timeout: Duration, max_body_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // Upstream redirects go back to the client untouched.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            base,
            max_body_bytes,
        })
    }

    /// Map a request target onto the upstream base URL, keeping any base path prefix.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, uri.path()));
        url.set_query(uri.query());
        url
    }

    /// Relay an authorized request and its response, unchanged apart from
    /// hop-by-hop headers.
    pub async fn forward(&self, req: Request) -> Response {
        let (parts, body) = req.into_parts();

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            warn!(
                "Request body too large: {:?} bytes (max {})",
                declared, self.max_body_bytes
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }

        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) if exceeds_limit(&e) => {
                warn!("Request body too large: over {} bytes", self.max_body_bytes);
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return (StatusCode::BAD_REQUEST, "Unreadable request body").into_response();
            }
        };

        let url = self.target_url(&parts.uri);
        debug!("Forwarding {} {} upstream", parts.method, url.path());

        let result = self
            .client
            .request(parts.method, url)
            .headers(relayable(&parts.headers))
            .body(body)
            .send()
            .await;

        match result {
            Ok(upstream) => relay_response(upstream).await,
            Err(e) => {
                // reqwest errors include the URL; strip it so query strings stay out of logs.
                warn!("Upstream request failed: {}", e.without_url());
                (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
            }
        }
    }
}

/// Whether a body read failed because it ran past the size limit, as opposed
/// to a transport error. Covers bodies sent without `Content-Length`.
fn exceeds_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

async fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = relayable(upstream.headers());
    match upstream.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            warn!("Failed to read upstream response: {}", e.without_url());
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}
