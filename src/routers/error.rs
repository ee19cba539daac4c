use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_mcp::{ErrorKind, McpError};
use serde::Serialize;

pub const HEADER_X_GATEWAY_ERROR_KIND: &str = "X-Gateway-Error-Kind";

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    kind: &'a str,
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Disabled => StatusCode::FORBIDDEN,
        ErrorKind::Permission | ErrorKind::Connection | ErrorKind::ToolError => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn bad_request(message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), message)
}

pub fn create_error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let message = message.into();

    let mut headers = HeaderMap::with_capacity(1);
    if let Ok(val) = HeaderValue::from_str(kind) {
        headers.insert(HEADER_X_GATEWAY_ERROR_KIND, val);
    }

    (
        status,
        headers,
        Json(ErrorResponse {
            error: &message,
            kind,
        }),
    )
        .into_response()
}

/// Handler error carrying the gateway error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub McpError);

impl From<McpError> for ApiError {
    fn from(err: McpError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        create_error(status_for(kind), kind.as_str(), self.0.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
