//! Invoice model for parts-invoicing-service.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::invoice_line::{InvoiceLineDraft, InvoiceLineView};

/// Persisted invoice header.
///
/// `sub_total` and `tax` are derived from the lines on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: i64,
    pub invoice_date: NaiveDate,
    pub customer_id: i64,
    pub employee_id: i64,
    pub sub_total: Decimal,
    pub tax: Decimal,
    pub version: i64,
}

impl Invoice {
    pub fn total(&self) -> Decimal {
        self.sub_total.saturating_add(self.tax)
    }
}

/// Row for a customer's invoice history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceSummary {
    pub invoice_id: i64,
    pub invoice_date: NaiveDate,
    pub sub_total: Decimal,
    pub tax: Decimal,
}

impl InvoiceSummary {
    pub fn total(&self) -> Decimal {
        self.sub_total.saturating_add(self.tax)
    }
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            invoice_date: invoice.invoice_date,
            sub_total: invoice.sub_total,
            tax: invoice.tax,
        }
    }
}

/// Target state of an invoice as submitted for saving.
///
/// `invoice_id` of `None` creates a new invoice; `customer_id` and
/// `employee_id` of `0` mean "not provided".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub invoice_id: Option<i64>,
    pub invoice_date: NaiveDate,
    pub customer_id: i64,
    pub employee_id: i64,
    pub lines: Vec<InvoiceLineDraft>,
}

/// Invoice as opened for display or editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceView {
    pub invoice_id: Option<i64>,
    pub invoice_date: NaiveDate,
    pub customer_id: i64,
    pub customer_name: String,
    pub employee_id: i64,
    pub employee_name: String,
    pub sub_total: Decimal,
    pub tax: Decimal,
    pub lines: Vec<InvoiceLineView>,
}

impl InvoiceView {
    pub fn total(&self) -> Decimal {
        self.sub_total.saturating_add(self.tax)
    }

    /// Start an edit from what is currently displayed.
    pub fn to_draft(&self) -> InvoiceDraft {
        InvoiceDraft {
            invoice_id: self.invoice_id,
            invoice_date: self.invoice_date,
            customer_id: self.customer_id,
            employee_id: self.employee_id,
            lines: self.lines.iter().map(InvoiceLineView::to_draft).collect(),
        }
    }
}
