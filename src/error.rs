use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::mailer::MailError;

/// A single field validation failure, reported under `details.errors`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Service error taxonomy. Every lifecycle and sync operation returns one of
/// these; the boundary serializes them into the JSON envelope without
/// reinterpreting status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// Bad or missing credentials/token. Messages stay deliberately vague so
    /// callers cannot distinguish unknown-user from wrong-password, nor an
    /// expired token from a tampered one.
    #[error("{0}")]
    Authentication(String),

    /// Deactivated account or insufficient privilege.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Second-store or mail-provider failure.
    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Unclassified failures must not leak internals in release
            // builds; the full chain is logged before we get here.
            ApiError::Internal(err) => {
                if cfg!(debug_assertions) {
                    format!("{err:#}")
                } else {
                    "An unexpected error occurred on the auth service.".to_string()
                }
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation { errors, .. } if !errors.is_empty() => {
                Some(serde_json::json!({ "errors": errors }))
            }
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        tracing::error!(error = %err, "mail send failed");
        ApiError::Upstream("Failed to send email".to_string())
    }
}

/// Structured payload of every error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    status_code: u16,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Error data stashed in response extensions so the envelope middleware can
/// re-render the body with request path and method attached.
#[derive(Debug, Clone)]
pub struct ErrorParts {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Error").to_string()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn render_envelope(parts: &ErrorParts, path: Option<String>, method: Option<String>) -> Response {
    let envelope = ErrorEnvelope {
        status_code: parts.status.as_u16(),
        error: status_text(parts.status),
        message: parts.message.clone(),
        path,
        method,
        timestamp: now_rfc3339(),
        details: parts.details.clone(),
    };
    (parts.status, Json(envelope)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
            }
            ApiError::Upstream(message) => {
                tracing::error!(%message, "upstream failure");
            }
            _ => {}
        }

        let parts = ErrorParts {
            status: self.status(),
            message: self.public_message(),
            details: self.details(),
        };
        // Render a complete body up front so the envelope survives even when
        // the middleware layer is not installed (e.g. extractor rejections in
        // isolated router tests).
        let mut response = render_envelope(&parts, None, None);
        response.extensions_mut().insert(parts);
        response
    }
}

/// Middleware that stamps the request path and method into error envelopes.
pub async fn error_envelope(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();

    let mut response = next.run(req).await;
    if let Some(parts) = response.extensions_mut().remove::<ErrorParts>() {
        return render_envelope(&parts, Some(path), Some(method));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            ApiError::validation("bad", vec![]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Authentication("Invalid credentials".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("User account is deactivated".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("User not found".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("Email already in use".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_serializes_expected_fields() {
        let parts = ErrorParts {
            status: StatusCode::CONFLICT,
            message: "Email already in use".into(),
            details: None,
        };
        let envelope = ErrorEnvelope {
            status_code: parts.status.as_u16(),
            error: status_text(parts.status),
            message: parts.message.clone(),
            path: Some("/api/auth/register".into()),
            method: Some("POST".into()),
            timestamp: now_rfc3339(),
            details: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["statusCode"], 409);
        assert_eq!(json["error"], "Conflict");
        assert_eq!(json["message"], "Email already in use");
        assert_eq!(json["path"], "/api/auth/register");
        assert_eq!(json["method"], "POST");
        assert!(json["timestamp"].is_string());
        assert!(json.get("details").is_none());
    }

    #[test]
    fn validation_details_carry_field_errors() {
        let err = ApiError::validation(
            "Validation failed",
            vec![FieldError::new("email", "must be a valid email")],
        );
        let details = err.details().expect("details present");
        assert_eq!(details["errors"][0]["field"], "email");
    }
}
