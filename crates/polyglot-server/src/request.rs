//! HTTP request conversion.

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use tracing::debug;

use polyglot_common::InvocationRequest;

/// Build an [`InvocationRequest`] from the parts of an HTTP request.
///
/// Headers whose values are not visible ASCII are skipped.
pub fn from_http(method: &Method, uri: &Uri, headers: &HeaderMap, body: Bytes) -> InvocationRequest {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.to_string(), value.to_string())),
            Err(_) => {
                debug!(header = %name, "Skipping non-text header");
                None
            }
        })
        .collect();

    InvocationRequest {
        method: method.to_string(),
        uri: uri.to_string(),
        headers,
        body: body.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_from_http() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("123"));

        let req = from_http(
            &Method::POST,
            &Uri::from_static("/api/v1/handler/greeter?lang=en"),
            &headers,
            Bytes::from(r#"{"name": "test"}"#),
        );

        assert_eq!(req.method, "POST");
        assert_eq!(req.uri, "/api/v1/handler/greeter?lang=en");
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.get_header("Content-Type"), Some("application/json"));
        assert_eq!(req.body_text(), r#"{"name": "test"}"#);
    }

    #[test]
    fn test_binary_header_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap());

        let req = from_http(&Method::GET, &Uri::from_static("/"), &headers, Bytes::new());

        assert!(req.headers.is_empty());
        assert!(req.body.is_empty());
    }
}
