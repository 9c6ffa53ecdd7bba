use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Field-level validation errors collected during form checks.
///
/// Only the first failing rule per field is kept, so the user sees one
/// message per input.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

/// Error taxonomy for the credential and reset-token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("{0} already in use")]
    DuplicateField(&'static str),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("reset token expired or invalid")]
    TokenExpired,

    #[error("reset token already used or unknown")]
    TokenNotFound,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            AuthError::DuplicateField(field) => {
                let mut errors = ValidationErrors::new();
                errors.add(field, format!("{field} already in use"));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "errors": errors })),
                )
                    .into_response()
            }
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid username or password" })),
            )
                .into_response(),
            // Both token failures restart the forgot-password flow.
            AuthError::TokenExpired => {
                Redirect::to("/forgotPassword?notice=token_expired").into_response()
            }
            AuthError::TokenNotFound => {
                Redirect::to("/forgotPassword?notice=token_invalid").into_response()
            }
            AuthError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": message })),
            )
                .into_response(),
            AuthError::UploadRejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": reason })),
            )
                .into_response(),
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
