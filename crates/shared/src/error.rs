use thiserror::Error;

use crate::protocol::ErrorBody;

pub const GENERIC_REQUEST_FAILURE: &str = "Request failed";

/// Error returned by the remote case-management service, reduced to the
/// single human-readable message the renderer surfaces.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Builds the error for a non-2xx response: the body's `detail` field
    /// when present, otherwise the generic fallback.
    pub fn from_response_body(status: u16, body: Option<ErrorBody>) -> Self {
        let message = body
            .and_then(|body| body.detail)
            .filter(|detail| !detail.is_empty())
            .unwrap_or_else(|| GENERIC_REQUEST_FAILURE.to_string());
        Self { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_field_becomes_the_message() {
        let err = ApiError::from_response_body(
            404,
            Some(ErrorBody {
                detail: Some("Case not found".into()),
            }),
        );
        assert_eq!(err.message, "Case not found");
        assert_eq!(err.status, 404);
    }

    #[test]
    fn missing_or_empty_detail_falls_back() {
        let err = ApiError::from_response_body(500, None);
        assert_eq!(err.message, GENERIC_REQUEST_FAILURE);

        let err = ApiError::from_response_body(500, Some(ErrorBody { detail: None }));
        assert_eq!(err.message, GENERIC_REQUEST_FAILURE);

        let err = ApiError::from_response_body(
            500,
            Some(ErrorBody {
                detail: Some(String::new()),
            }),
        );
        assert_eq!(err.message, GENERIC_REQUEST_FAILURE);
    }
}
