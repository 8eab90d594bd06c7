use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::TransactionStatus;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not on sale: {0}")]
    NotSellable(String),

    #[error("Outside sale window: {0}")]
    OutOfWindow(String),

    #[error("Sold out: {remaining} ticket(s) remaining")]
    SoldOut { remaining: i32 },

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Not refundable: {0}")]
    NotRefundable(String),

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Invalid transaction transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Inventory invariant violated: {0}")]
    InventoryInvariantViolation(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotSellable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::OutOfWindow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SoldOut { .. } => StatusCode::CONFLICT,
            AppError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::NotRefundable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RefundFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidTransition { .. }
            | AppError::InventoryInvariantViolation(_)
            | AppError::DatabaseError(_)
            | AppError::ConfigError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NotSellable(_) => "NOT_SELLABLE",
            AppError::OutOfWindow(_) => "OUT_OF_WINDOW",
            AppError::SoldOut { .. } => "SOLD_OUT",
            AppError::PaymentFailed(_) => "PAYMENT_FAILED",
            AppError::NotRefundable(_) => "NOT_REFUNDABLE",
            AppError::RefundFailed(_) => "REFUND_FAILED",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Busy(_) => "BUSY",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::InventoryInvariantViolation(_) => "INVENTORY_INVARIANT_VIOLATION",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Consistency failures mean the locking discipline was broken
    /// somewhere; they are never absorbed into a business result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::InvalidTransition { .. }
                | AppError::InventoryInvariantViolation(_)
                | AppError::DatabaseError(_)
                | AppError::ConfigError(_)
                | AppError::InternalServerError(_)
        )
    }

    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg)
            | AppError::NotSellable(msg)
            | AppError::OutOfWindow(msg)
            | AppError::PaymentFailed(msg)
            | AppError::NotRefundable(msg)
            | AppError::RefundFailed(msg)
            | AppError::AuthError(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Busy(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::SoldOut { remaining } => {
                format!("Not enough tickets available. Only {} remaining.", remaining)
            }
            AppError::InvalidTransition { .. } | AppError::InventoryInvariantViolation(_) => {
                "An internal consistency error occurred".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::ConfigError(_) | AppError::InternalServerError(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::SoldOut { remaining } => Some(json!({ "remaining": remaining })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            err if err.is_fatal() => {
                error!(error = ?err, code = err.code(), "Fatal application error");
            }
            err if err.status_code().is_server_error() => {
                error!(error = ?err, code = err.code(), "Application error");
            }
            err => {
                warn!(code = err.code(), message = %err, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
