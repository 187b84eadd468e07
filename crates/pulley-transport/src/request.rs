//! Unit descriptors and request header composition.

use std::collections::BTreeMap;

use pulley_core::{DEFAULT_ACCEPT, HttpMethod};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::events::BodySource;

/// How the body is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// One request streaming the whole file.
    Stream,
    /// Consecutive range requests of at most `block_size` bytes each.
    Blocks {
        /// Maximum bytes per request.
        block_size: u64,
    },
}

/// Everything the transport needs to run one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Destination.
    pub url: Url,
    /// Final request headers, keyed by lower-cased name.
    pub headers: BTreeMap<String, String>,
    /// Body file.
    pub body: BodySource,
    /// Wire strategy.
    pub mode: TransferMode,
    /// Correlation tag, kept for in-flight listings.
    pub tag: Option<String>,
    /// Whether metered connections may carry the unit.
    pub allow_cellular: bool,
}

/// Merge default headers with the caller's; caller values win, names compare case-insensitively.
///
/// `Accept: */*` is always present by default; `content_type` is added when given.
#[must_use]
pub fn compose_headers(
    content_type: Option<&str>,
    caller: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("accept".to_string(), DEFAULT_ACCEPT.to_string());
    if let Some(content_type) = content_type {
        headers.insert("content-type".to_string(), content_type.to_string());
    }
    for (name, value) in caller {
        headers.insert(name.trim().to_ascii_lowercase(), value.clone());
    }
    headers
}

pub(crate) fn to_header_map(headers: &BTreeMap<String, String>) -> TransportResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || TransportError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

pub(crate) fn collect_headers(map: &HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_headers_override_defaults_case_insensitively() {
        let mut caller = BTreeMap::new();
        caller.insert("Accept".to_string(), "application/json".to_string());
        caller.insert("X-Trace".to_string(), "abc".to_string());

        let headers = compose_headers(Some("multipart/form-data; boundary=b"), &caller);
        assert_eq!(headers.get("accept").map(String::as_str), Some("application/json"));
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("multipart/form-data; boundary=b")
        );
        assert_eq!(headers.get("x-trace").map(String::as_str), Some("abc"));

        let defaults = compose_headers(None, &BTreeMap::new());
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults.get("accept").map(String::as_str), Some("*/*"));
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            to_header_map(&headers),
            Err(TransportError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn repeated_response_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));
        let headers = collect_headers(&map);
        assert_eq!(headers.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
    }
}
