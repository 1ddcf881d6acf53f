use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

use crate::providers::Provider;

#[derive(Debug, ThisError)]
pub enum ScopeError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("caller does not own this resource")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} is not connected for this site")]
    NotConnected(Provider),

    #[error("no {provider} resource selected: {hint}")]
    ResourceNotSelected { provider: Provider, hint: String },

    #[error("OAuth client is not configured")]
    OAuthNotConfigured,

    #[error("operator credential missing: {0}")]
    CredentialsMissing(&'static str),

    #[error("stored access token is empty; reconnect the integration")]
    TokenMissing,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("upstream permission denied: {hint}")]
    PermissionDenied { hint: String },

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("report export timed out")]
    ExportTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for ScopeError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => ScopeError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                ScopeError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => ScopeError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => ScopeError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for ScopeError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            ScopeError::Database(_) | ScopeError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
            ScopeError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication required.".to_string(),
                },
            ),
            ScopeError::Forbidden => (
                StatusCode::FORBIDDEN,
                ApiErrorBody {
                    code: "FORBIDDEN".to_string(),
                    message: "You do not have access to this resource.".to_string(),
                },
            ),
            ScopeError::NotFound => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: "Resource not found.".to_string(),
                },
            ),
            ScopeError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "VALIDATION".to_string(),
                    message,
                },
            ),
            ScopeError::NotConnected(provider) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "NOT_CONNECTED".to_string(),
                    message: format!("Connect {provider} for this site first."),
                },
            ),
            ScopeError::ResourceNotSelected { provider, hint } => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "RESOURCE_NOT_SELECTED".to_string(),
                    message: format!("{provider}: {hint}"),
                },
            ),
            ScopeError::OAuthNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "OAUTH_NOT_CONFIGURED".to_string(),
                    message: "The OAuth client is not configured; ask the operator to set it up."
                        .to_string(),
                },
            ),
            ScopeError::CredentialsMissing(which) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody {
                    code: "CREDENTIALS_MISSING".to_string(),
                    message: format!("The {which} credential is not configured on this server."),
                },
            ),
            ScopeError::TokenMissing => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "TOKEN_MISSING".to_string(),
                    message: "Stored access token is empty; reconnect the integration."
                        .to_string(),
                },
            ),
            ScopeError::RefreshFailed(detail) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "REFRESH_FAILED".to_string(),
                    message: format!("Token refresh failed ({detail}); reconnect the integration."),
                },
            ),
            ScopeError::PermissionDenied { hint } => (
                StatusCode::FORBIDDEN,
                ApiErrorBody {
                    code: "PERMISSION_DENIED".to_string(),
                    message: hint,
                },
            ),
            ScopeError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ApiErrorBody {
                    code: "RATE_LIMIT".to_string(),
                    message: "Rate limit exceeded; try again later.".to_string(),
                },
            ),
            ScopeError::Upstream { status, message } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "UPSTREAM_ERROR".to_string(),
                    message: format!("Upstream returned {status}: {message}"),
                },
            ),
            ScopeError::ExportTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiErrorBody {
                    code: "EXPORT_TIMEOUT".to_string(),
                    message: "Report export did not become ready in time.".to_string(),
                },
            ),
            ScopeError::Oauth2Server { .. } | ScopeError::Oauth2Token(_) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "OAUTH_ERROR".to_string(),
                    message: "OAuth exchange failed.".to_string(),
                },
            ),
            ScopeError::Json(_) | ScopeError::Reqwest(_) | ScopeError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
