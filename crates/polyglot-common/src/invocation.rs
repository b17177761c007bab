//! Request and response values exchanged with a bundle.
//!
//! These are transport-neutral: the HTTP layer converts to and from them, and
//! both execution strategies consume [`InvocationRequest`] and produce
//! [`InvocationResponse`].

use serde::{Deserialize, Serialize};

/// Inbound request handed to a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InvocationRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request URI including the query string.
    pub uri: String,
    /// Request headers as key-value pairs.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl InvocationRequest {
    /// Create a new request without headers or body.
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Response written by a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InvocationResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as key-value pairs.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl InvocationResponse {
    /// Create a JSON response.
    pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }

    /// Create an error response with a JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::json(status, body)
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Default for InvocationResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request() {
        let req = InvocationRequest::new("GET", "/api/v1/handler/greeter");
        assert_eq!(req.method, "GET");
        assert!(req.headers.is_empty());
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_get_header() {
        let req = InvocationRequest::new("GET", "/").with_header("Content-Type", "application/json");

        assert_eq!(req.get_header("content-type"), Some("application/json"));
        assert_eq!(req.get_header("CONTENT-TYPE"), Some("application/json"));
        assert!(req.get_header("X-Missing").is_none());
    }

    #[test]
    fn test_body_text_is_lossy() {
        let req = InvocationRequest::new("POST", "/").with_body(vec![b'o', b'k', 0xff]);
        assert_eq!(req.body_text(), "ok\u{fffd}");
    }

    #[test]
    fn test_json_response() {
        let resp = InvocationResponse::json(201, r#"{"id":1}"#);
        assert_eq!(resp.status, 201);
        assert_eq!(resp.get_header("Content-Type"), Some("application/json"));
        assert_eq!(resp.body_text(), r#"{"id":1}"#);
    }

    #[test]
    fn test_error_response() {
        let resp = InvocationResponse::error(404, "Handler not found: x");
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Handler not found: x");
    }
}
