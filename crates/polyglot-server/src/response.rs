//! HTTP responses for invocation results and failures.
//!
//! [`HttpResponse`] turns an [`InvocationResponse`] into an axum response;
//! [`ApiError`] maps a [`RuntimeError`] to a status code and a
//! `{"error": "..."}` body.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use tracing::warn;

use polyglot_common::{ErrorCategory, InvocationResponse, RuntimeError};

/// An invocation result ready to be sent.
#[derive(Debug, Clone)]
pub struct HttpResponse(pub InvocationResponse);

impl HttpResponse {
    /// Convert to an axum response.
    ///
    /// Headers that are not valid HTTP are dropped and an out-of-range status
    /// becomes 500.
    pub fn into_axum_response(self) -> Response<Body> {
        let InvocationResponse {
            status,
            headers,
            body,
        } = self.0;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in &headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().append(name, value);
                }
                _ => warn!(header = %name, "Dropping invalid response header"),
            }
        }

        response
    }
}

impl From<InvocationResponse> for HttpResponse {
    fn from(response: InvocationResponse) -> Self {
        Self(response)
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> axum::response::Response {
        self.into_axum_response()
    }
}

/// A failure reported to the HTTP client.
#[derive(Debug)]
pub struct ApiError(pub RuntimeError);

impl ApiError {
    /// Status code for this failure.
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<RuntimeError> for ApiError {
    fn from(error: RuntimeError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        HttpResponse(InvocationResponse::error(status.as_u16(), &self.0.to_string()))
            .into_axum_response()
    }
}

/// Map an error to its HTTP status.
///
/// Resource limits get their own codes; everything else follows the error
/// category.
pub fn status_for(error: &RuntimeError) -> StatusCode {
    match error {
        RuntimeError::FuelExhausted => StatusCode::TOO_MANY_REQUESTS,
        RuntimeError::ExecutionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => match error.category() {
            ErrorCategory::Lookup => StatusCode::NOT_FOUND,
            ErrorCategory::Registration => StatusCode::BAD_REQUEST,
            ErrorCategory::Load | ErrorCategory::Execution | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}
