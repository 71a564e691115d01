//! Errors raised while saving an invoice.

use serde::Serialize;
use service_core::error::AppError;
use service_core::grpc::IntoStatus;
use thiserror::Error;
use tonic::Status;

/// A part whose stock cannot cover the requested sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub part_id: i64,
    pub description: String,
    pub quantity_on_hand: i32,
    pub requested: i64,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Part {} ({}) has {} on hand but {} more are required",
            self.part_id, self.description, self.quantity_on_hand, self.requested
        )
    }
}

#[derive(Debug, Error)]
pub enum InvoiceError {
    /// Nothing was submitted.
    #[error("No {0} was supplied")]
    MissingInput(&'static str),

    /// Business-rule violations, all of them.
    #[error("Unable to save invoice. Check concerns: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The submitted invoice does not line up with what is stored.
    #[error("Invoice does not match stored state: {}", .0.join("; "))]
    Consistency(Vec<String>),

    #[error("Insufficient stock: {}", join_shortfalls(.0))]
    InsufficientStock(Vec<StockShortfall>),

    /// Another save got there first. Reload and retry.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] AppError),
}

fn join_shortfalls(shortfalls: &[StockShortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl InvoiceError {
    /// Every human-readable message carried by the error.
    pub fn messages(&self) -> Vec<String> {
        match self {
            InvoiceError::Validation(messages) | InvoiceError::Consistency(messages) => {
                messages.clone()
            }
            InvoiceError::InsufficientStock(shortfalls) => {
                shortfalls.iter().map(ToString::to_string).collect()
            }
            other => vec![other.to_string()],
        }
    }

    /// Whether resubmitting after reloading the invoice can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvoiceError::Conflict(_))
    }

    /// Label used for the error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InvoiceError::MissingInput(_) => "missing_input",
            InvoiceError::Validation(_) => "validation",
            InvoiceError::Consistency(_) => "consistency",
            InvoiceError::InsufficientStock(_) => "insufficient_stock",
            InvoiceError::Conflict(_) => "conflict",
            InvoiceError::Storage(_) => "storage",
        }
    }
}

impl From<InvoiceError> for Status {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::MissingInput(_) | InvoiceError::Validation(_) => {
                Status::invalid_argument(err.to_string())
            }
            InvoiceError::Consistency(_) | InvoiceError::InsufficientStock(_) => {
                Status::failed_precondition(err.to_string())
            }
            InvoiceError::Conflict(_) => Status::aborted(err.to_string()),
            InvoiceError::Storage(inner) => inner.into_status(),
        }
    }
}
