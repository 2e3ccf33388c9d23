//! Unified error handling for the bridge.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cin7::Cin7Error;
use crate::dispatch::DispatchError;
use crate::shopify::{ShopifyError, VerifyError};

/// Application-level error type for the bridge.
#[derive(Debug, Error)]
pub enum AppError {
    /// Webhook failed verification (bad signature or disallowed shop).
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] VerifyError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Shopify API operation failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] ShopifyError),

    /// Cin7 API operation failed.
    #[error("Cin7 error: {0}")]
    Cin7(#[from] Cin7Error),

    /// Outbound dispatch failed or was refused.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server-side errors with Sentry
        if matches!(
            self,
            Self::Internal(_) | Self::Shopify(_) | Self::Cin7(_) | Self::Dispatch(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Bridge request error"
            );
        }

        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Dispatch(DispatchError::Backpressure) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Shopify(_) | Self::Cin7(_) | Self::Dispatch(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Shopify(_) | Self::Cin7(_) | Self::Dispatch(_) => {
                "Upstream service error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("missing line items".to_string());
        assert_eq!(err.to_string(), "Bad request: missing line items");

        let err = AppError::Unauthorized(VerifyError::MissingSignature);
        assert_eq!(
            err.to_string(),
            "Unauthorized: missing webhook signature header"
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::Unauthorized(VerifyError::SignatureMismatch)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Dispatch(DispatchError::Backpressure)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Dispatch(DispatchError::Shutdown)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_details_are_not_exposed() {
        let err = AppError::Cin7(Cin7Error::Api {
            status: 403,
            message: "secret internals".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
