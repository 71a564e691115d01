//! Invoice line model for parts-invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted invoice line.
///
/// `price` is captured when the line is created and never refreshed from
/// the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub invoice_line_id: i64,
    pub invoice_id: i64,
    pub part_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub removed_from_view: bool,
}

/// Invoice line joined with its part for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceLineView {
    pub invoice_line_id: i64,
    pub invoice_id: i64,
    pub part_id: i64,
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub taxable: bool,
    pub removed_from_view: bool,
}

impl InvoiceLineView {
    pub fn extended_price(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }

    pub fn to_draft(&self) -> InvoiceLineDraft {
        InvoiceLineDraft {
            invoice_line_id: Some(self.invoice_line_id),
            part_id: self.part_id,
            description: self.description.clone(),
            quantity: self.quantity,
            price: self.price,
            removed_from_view: self.removed_from_view,
        }
    }
}

/// A line of a submitted invoice.
///
/// `invoice_line_id` of `None` is a new line. `description` is only used to
/// make error messages readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineDraft {
    pub invoice_line_id: Option<i64>,
    pub part_id: i64,
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub removed_from_view: bool,
}

impl InvoiceLineDraft {
    /// A new line selling `quantity` of a part at `price`.
    pub fn new(part_id: i64, quantity: i32, price: Decimal) -> Self {
        Self {
            invoice_line_id: None,
            part_id,
            description: String::new(),
            quantity,
            price,
            removed_from_view: false,
        }
    }

    /// Name used in validation messages.
    pub fn label(&self) -> String {
        if self.description.trim().is_empty() {
            format!("for part {}", self.part_id)
        } else {
            self.description.clone()
        }
    }
}
