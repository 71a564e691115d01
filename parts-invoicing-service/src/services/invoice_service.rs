//! Invoice use cases: save with stock reconciliation, open, history.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument, warn};

use crate::error::InvoiceError;
use crate::models::{InvoiceDraft, InvoiceSummary, InvoiceView};
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_SAVED_TOTAL, STOCK_UNITS_MOVED_TOTAL};
use crate::services::reconciler::{plan_save, validate_draft, ReconciliationPlan};
use crate::services::store::InvoiceStore;

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    tax_rate: Decimal,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn InvoiceStore>, tax_rate: Decimal) -> Self {
        Self { store, tax_rate }
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Save an invoice and reconcile part stock with its lines.
    ///
    /// Either everything is written (header, lines, stock) or nothing is.
    /// Rule violations are reported together and nothing is read from the
    /// store until the submission passes its own checks.
    #[instrument(skip(self, draft), fields(invoice_id, lines))]
    pub async fn save_invoice(&self, draft: Option<InvoiceDraft>) -> Result<i64, InvoiceError> {
        let result = self.try_save(draft).await;

        match &result {
            Ok(_) => {}
            Err(err) => {
                let outcome = match err {
                    InvoiceError::Conflict(_) => "conflict",
                    InvoiceError::Storage(_) => "failed",
                    _ => "rejected",
                };
                INVOICES_SAVED_TOTAL.with_label_values(&[outcome]).inc();
                ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                warn!(error = %err, retryable = err.is_retryable(), "Invoice save failed");
            }
        }

        result
    }

    async fn try_save(&self, draft: Option<InvoiceDraft>) -> Result<i64, InvoiceError> {
        let draft = draft.ok_or(InvoiceError::MissingInput("invoice"))?;

        let span = tracing::Span::current();
        if let Some(invoice_id) = draft.invoice_id {
            span.record("invoice_id", invoice_id);
        }
        span.record("lines", draft.lines.len());

        let violations = validate_draft(&draft);
        if !violations.is_empty() {
            return Err(InvoiceError::Validation(violations));
        }

        let snapshot = self.store.load_snapshot(&draft).await?;
        let plan = plan_save(&draft, &snapshot, self.tax_rate)?;
        let invoice_id = self.store.apply_plan(&plan).await?;

        record_saved(&plan);
        info!(
            invoice_id,
            sub_total = %plan.header().sub_total,
            tax = %plan.header().tax,
            "Invoice saved"
        );

        Ok(invoice_id)
    }

    /// Open an invoice for display or editing.
    ///
    /// With no invoice and no customer this is a blank invoice dated today;
    /// with only a customer it is a new invoice for that customer. Otherwise
    /// the stored invoice is loaded with its lines.
    #[instrument(skip(self))]
    pub async fn open_invoice(
        &self,
        invoice_id: Option<i64>,
        customer_id: Option<i64>,
        employee_id: Option<i64>,
    ) -> Result<InvoiceView, AppError> {
        let today = Utc::now().date_naive();

        let mut view = match invoice_id {
            None => InvoiceView {
                invoice_id: None,
                invoice_date: today,
                customer_id: customer_id.unwrap_or(0),
                customer_name: String::new(),
                employee_id: employee_id.unwrap_or(0),
                employee_name: String::new(),
                sub_total: Decimal::ZERO,
                tax: Decimal::ZERO,
                lines: Vec::new(),
            },
            Some(invoice_id) => {
                let (invoice, lines) =
                    self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
                    })?;
                InvoiceView {
                    invoice_id: Some(invoice.invoice_id),
                    invoice_date: invoice.invoice_date,
                    customer_id: invoice.customer_id,
                    customer_name: String::new(),
                    employee_id: invoice.employee_id,
                    employee_name: String::new(),
                    sub_total: invoice.sub_total,
                    tax: invoice.tax,
                    lines,
                }
            }
        };

        if view.customer_id != 0 {
            if let Some(customer) = self.store.get_customer(view.customer_id).await? {
                view.customer_name = customer.full_name();
            }
        }
        if view.employee_id != 0 {
            if let Some(employee) = self.store.get_employee(view.employee_id).await? {
                view.employee_name = employee.full_name();
            }
        }

        Ok(view)
    }

    /// A customer's invoices ordered by date, then ID.
    #[instrument(skip(self))]
    pub async fn customer_invoices(&self, customer_id: i64) -> Result<Vec<InvoiceSummary>, AppError> {
        if customer_id == 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Please provide a customer"
            )));
        }
        self.store.list_customer_invoices(customer_id).await
    }
}

fn record_saved(plan: &ReconciliationPlan) {
    let outcome = if plan.header().invoice_id.is_some() {
        "updated"
    } else {
        "created"
    };
    INVOICES_SAVED_TOTAL.with_label_values(&[outcome]).inc();

    for delta in plan.stock_deltas().into_values() {
        if delta < 0 {
            STOCK_UNITS_MOVED_TOTAL
                .with_label_values(&["sold"])
                .inc_by(delta.unsigned_abs() as f64);
        } else if delta > 0 {
            STOCK_UNITS_MOVED_TOTAL
                .with_label_values(&["returned"])
                .inc_by(delta as f64);
        }
    }
}
