//! Session upgrade: exchange a validated query token for a session cookie
//!
//! The upgrade response is a `307 Temporary Redirect` (method and body are
//! preserved by the client) to the same URL with the token parameter removed,
//! carrying a `Set-Cookie` bound to the validated token. The token never
//! appears in the redirect target.

use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

/// Bytes that cannot appear raw in a cookie value, plus `%` so the value
/// survives the decode on the way back in.
const COOKIE_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'\\')
    .add(b'%');

/// A pending upgrade: the cookie to set and where to send the client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionUpgrade {
    location: String,
    set_cookie: String,
}

impl SessionUpgrade {
    pub fn new(
        uri: &Uri,
        token_param: &str,
        cookie_name: &str,
        token: &str,
        max_age_secs: Option<u64>,
    ) -> Self {
        Self {
            location: redirect_target(uri, token_param),
            set_cookie: session_cookie(cookie_name, token, max_age_secs),
        }
    }

    /// Redirect target, already scrubbed of the token parameter.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Full `Set-Cookie` header value.
    pub fn set_cookie(&self) -> &str {
        &self.set_cookie
    }
}

impl std::fmt::Debug for SessionUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The cookie carries the token; only the location is safe to print.
        f.debug_struct("SessionUpgrade")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl IntoResponse for SessionUpgrade {
    fn into_response(self) -> Response {
        (
            StatusCode::TEMPORARY_REDIRECT,
            [
                (header::LOCATION, self.location),
                (header::SET_COOKIE, self.set_cookie),
            ],
        )
            .into_response()
    }
}

/// Build the session cookie:
/// `name=value; Path=/[; Max-Age=n]; HttpOnly; Secure; SameSite=Strict`.
pub fn session_cookie(name: &str, token: &str, max_age_secs: Option<u64>) -> String {
    let value = utf8_percent_encode(token, COOKIE_VALUE);
    let mut cookie = format!("{}={}; Path=/", name, value);
    if let Some(max_age) = max_age_secs {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie.push_str("; HttpOnly; Secure; SameSite=Strict");
    cookie
}

/// Remove every occurrence of `param` from a raw query string.
///
/// Keys are compared after form-urlencoded decoding; the surviving pairs are
/// kept byte-for-byte, in their original order and encoding.
pub fn scrub_query(query: &str, param: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            form_urlencoded::parse(pair.as_bytes())
                .next()
                .is_none_or(|(key, _)| key != param)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Rebuild the request URL without the token parameter.
///
/// Absolute-form request targets keep their scheme, host and port (userinfo
/// is dropped). Origin-form targets yield an origin-relative location, which
/// the client resolves against the scheme and host it used.
pub fn redirect_target(uri: &Uri, token_param: &str) -> String {
    let mut target = String::new();
    if let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) {
        target.push_str(scheme);
        target.push_str("://");
        target.push_str(host);
        if let Some(port) = uri.port_u16() {
            target.push_str(&format!(":{}", port));
        }
    }
    target.push_str(uri.path());
    if let Some(query) = uri.query() {
        let scrubbed = scrub_query(query, token_param);
        if !scrubbed.is_empty() {
            target.push('?');
            target.push_str(&scrubbed);
        }
    }
    target
}
