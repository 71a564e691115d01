//! Storage seam for invoices, parts and people.

use std::borrow::Cow;
use std::collections::BTreeSet;

use async_trait::async_trait;
use service_core::error::AppError;
use validator::{ValidationError, ValidationErrors};

use crate::error::InvoiceError;
use crate::models::{
    Customer, Employee, Invoice, InvoiceDraft, InvoiceLineView, InvoiceSummary, Part, PartEdit,
};
use crate::services::reconciler::{ReconciliationPlan, Snapshot};

/// Persistence used by the invoice and part services.
///
/// Implemented by [`crate::services::Database`] (PostgreSQL) and
/// [`crate::services::MemoryStore`].
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Read everything `plan_save` needs for `draft`.
    ///
    /// Parts are loaded for every part referenced by the draft and by the
    /// stored lines of the invoice.
    async fn load_snapshot(&self, draft: &InvoiceDraft) -> Result<Snapshot, AppError>;

    /// Apply every mutation of `plan` atomically and return the invoice ID.
    ///
    /// Fails with [`InvoiceError::Conflict`] when the invoice or a part
    /// changed after the snapshot was read in a way the plan cannot absorb.
    async fn apply_plan(&self, plan: &ReconciliationPlan) -> Result<i64, InvoiceError>;

    async fn get_invoice(
        &self,
        invoice_id: i64,
    ) -> Result<Option<(Invoice, Vec<InvoiceLineView>)>, AppError>;

    /// Invoices of a customer, oldest first.
    async fn list_customer_invoices(&self, customer_id: i64)
        -> Result<Vec<InvoiceSummary>, AppError>;

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError>;

    async fn get_employee(&self, employee_id: i64) -> Result<Option<Employee>, AppError>;

    async fn get_part(&self, part_id: i64) -> Result<Option<Part>, AppError>;

    /// Whether another part in the category already uses `description`
    /// (case-insensitive, ignoring surrounding whitespace).
    async fn part_description_taken(
        &self,
        part_category_id: i64,
        description: &str,
        excluding: Option<i64>,
    ) -> Result<bool, AppError>;

    /// Insert or update a part. Returns `None` when an existing part was not found.
    async fn save_part(&self, edit: &PartEdit) -> Result<Option<Part>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Part IDs a snapshot must cover: the draft's and the stored lines'.
pub(crate) fn referenced_part_ids(
    draft: &InvoiceDraft,
    stored_part_ids: impl IntoIterator<Item = i64>,
) -> Vec<i64> {
    draft
        .lines
        .iter()
        .map(|line| line.part_id)
        .chain(stored_part_ids)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn normalize_description(description: &str) -> String {
    description.trim().to_lowercase()
}

/// Field error for a part whose (category, description) is already used.
pub(crate) fn duplicate_part() -> ValidationError {
    let mut duplicate = ValidationError::new("duplicate");
    duplicate.message = Some(Cow::Borrowed(
        "Part already exists in the catalog and cannot be entered again",
    ));
    duplicate
}

/// [`duplicate_part`] as the error a store returns when its own check trips.
pub(crate) fn duplicate_part_error() -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add("description", duplicate_part());
    AppError::ValidationError(errors)
}
