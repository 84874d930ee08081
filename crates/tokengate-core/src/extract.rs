//! Credential extraction from the three request carriers
//!
//! - `Authorization` header (bearer variant), taken verbatim
//! - a named cookie (session variant)
//! - a named query parameter (session variant)

use axum::http::{header, HeaderMap, Uri};
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// Read the `Authorization` header verbatim.
///
/// Returns an empty candidate when the header is absent or not visible ASCII,
/// so a missing header is validated through the same path as a wrong one.
pub fn authorization(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Find the value of cookie `name` across all `Cookie` headers.
///
/// The first occurrence wins. Surrounding double quotes are stripped and the
/// value is percent-decoded, mirroring how the session cookie is written.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| decode_cookie_value(value.trim()))
}

fn decode_cookie_value(raw: &str) -> String {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(raw);
    percent_decode_str(unquoted).decode_utf8_lossy().into_owned()
}

/// First value of query parameter `name`, form-urlencoded decoded.
///
/// `Some("")` means the parameter was present with an empty value.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
