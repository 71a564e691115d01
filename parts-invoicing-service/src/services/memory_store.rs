//! In-process store.
//!
//! Used with `STORE_BACKEND=memory` and by the tests. A save is applied to a
//! copy of the state which replaces the live state only when every mutation
//! succeeded, so a failed save leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use service_core::error::AppError;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::InvoiceError;
use crate::models::{
    Customer, Employee, Invoice, InvoiceDraft, InvoiceLine, InvoiceLineView, InvoiceSummary, Part,
    PartEdit,
};
use crate::services::reconciler::{Mutation, ReconciliationPlan, Snapshot};
use crate::services::store::{
    duplicate_part_error, normalize_description, referenced_part_ids, InvoiceStore,
};

#[derive(Debug, Clone, Default)]
struct State {
    customers: BTreeMap<i64, Customer>,
    employees: BTreeMap<i64, Employee>,
    parts: BTreeMap<i64, Part>,
    invoices: BTreeMap<i64, Invoice>,
    lines: BTreeMap<i64, InvoiceLine>,
    next_invoice_id: i64,
    next_line_id: i64,
    next_part_id: i64,
}

impl State {
    fn lines_of(&self, invoice_id: i64) -> Vec<InvoiceLine> {
        self.lines
            .values()
            .filter(|line| line.invoice_id == invoice_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_customer(&self, customer: Customer) {
        let mut state = self.state.lock().await;
        state.customers.insert(customer.customer_id, customer);
    }

    pub async fn insert_employee(&self, employee: Employee) {
        let mut state = self.state.lock().await;
        state.employees.insert(employee.employee_id, employee);
    }

    /// Seed a part, keeping its ID.
    pub async fn insert_part(&self, part: Part) {
        let mut state = self.state.lock().await;
        state.next_part_id = state.next_part_id.max(part.part_id);
        state.parts.insert(part.part_id, part);
    }

    /// Current state of a part, including removed ones.
    pub async fn part(&self, part_id: i64) -> Option<Part> {
        self.state.lock().await.parts.get(&part_id).cloned()
    }

    /// Stored lines of an invoice in line ID order.
    pub async fn lines(&self, invoice_id: i64) -> Vec<InvoiceLine> {
        self.state.lock().await.lines_of(invoice_id)
    }

    /// Make the next `apply_plan` fail after all mutations were staged.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

/// Apply `plan` to `state`, failing on anything the snapshot did not foresee.
fn apply(state: &mut State, plan: &ReconciliationPlan) -> Result<i64, InvoiceError> {
    let header = plan.header();

    let invoice_id = match header.invoice_id {
        Some(invoice_id) => {
            let invoice = state.invoices.get_mut(&invoice_id).ok_or_else(|| {
                InvoiceError::Conflict(format!("Invoice {} was deleted", invoice_id))
            })?;
            if Some(invoice.version) != header.expected_version {
                return Err(InvoiceError::Conflict(format!(
                    "Invoice {} was modified by another user",
                    invoice_id
                )));
            }
            invoice.invoice_date = header.invoice_date;
            invoice.customer_id = header.customer_id;
            invoice.employee_id = header.employee_id;
            invoice.sub_total = header.sub_total;
            invoice.tax = header.tax;
            invoice.version += 1;
            invoice_id
        }
        None => {
            state.next_invoice_id += 1;
            let invoice_id = state.next_invoice_id;
            state.invoices.insert(
                invoice_id,
                Invoice {
                    invoice_id,
                    invoice_date: header.invoice_date,
                    customer_id: header.customer_id,
                    employee_id: header.employee_id,
                    sub_total: header.sub_total,
                    tax: header.tax,
                    version: 1,
                },
            );
            invoice_id
        }
    };

    for mutation in plan.mutations() {
        match mutation {
            Mutation::UpsertHeader(_) | Mutation::AdjustStock(_) => {}
            Mutation::InsertLine(line) => {
                state.next_line_id += 1;
                let invoice_line_id = state.next_line_id;
                state.lines.insert(
                    invoice_line_id,
                    InvoiceLine {
                        invoice_line_id,
                        invoice_id,
                        part_id: line.part_id,
                        quantity: line.quantity,
                        price: line.price,
                        removed_from_view: line.removed_from_view,
                    },
                );
            }
            Mutation::UpdateLine(update) => {
                let line = state
                    .lines
                    .get_mut(&update.invoice_line_id)
                    .filter(|line| line.invoice_id == invoice_id)
                    .ok_or_else(|| {
                        InvoiceError::Conflict(format!(
                            "Invoice line {} no longer exists",
                            update.invoice_line_id
                        ))
                    })?;
                line.quantity = update.quantity;
                line.removed_from_view = update.removed_from_view;
            }
            Mutation::DeleteLine { invoice_line_id } => {
                let owned = state
                    .lines
                    .get(invoice_line_id)
                    .is_some_and(|line| line.invoice_id == invoice_id);
                if !owned {
                    return Err(InvoiceError::Conflict(format!(
                        "Invoice line {} no longer exists",
                        invoice_line_id
                    )));
                }
                state.lines.remove(invoice_line_id);
            }
        }
    }

    for (part_id, delta) in plan.stock_deltas() {
        if delta == 0 {
            continue;
        }
        let part = state
            .parts
            .get_mut(&part_id)
            .ok_or_else(|| InvoiceError::Conflict(format!("Part {} was deleted", part_id)))?;
        let after = i64::from(part.quantity_on_hand) + delta;
        let after = i32::try_from(after)
            .ok()
            .filter(|qoh| *qoh >= 0)
            .ok_or_else(|| {
                InvoiceError::Conflict(format!(
                    "Stock of part {} changed and can no longer cover this invoice",
                    part_id
                ))
            })?;
        part.quantity_on_hand = after;
        part.version += 1;
    }

    Ok(invoice_id)
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    #[instrument(skip(self, draft), fields(invoice_id = ?draft.invoice_id))]
    async fn load_snapshot(&self, draft: &InvoiceDraft) -> Result<Snapshot, AppError> {
        let state = self.state.lock().await;

        let invoice = draft
            .invoice_id
            .and_then(|invoice_id| state.invoices.get(&invoice_id).cloned());
        let lines = invoice
            .as_ref()
            .map(|invoice| state.lines_of(invoice.invoice_id))
            .unwrap_or_default();
        let parts = referenced_part_ids(draft, lines.iter().map(|line| line.part_id))
            .into_iter()
            .filter_map(|part_id| state.parts.get(&part_id).cloned())
            .map(|part| (part.part_id, part))
            .collect::<HashMap<_, _>>();

        Ok(Snapshot {
            invoice,
            lines,
            parts,
            customer_exists: state.customers.contains_key(&draft.customer_id),
            employee_exists: state.employees.contains_key(&draft.employee_id),
        })
    }

    #[instrument(skip(self, plan))]
    async fn apply_plan(&self, plan: &ReconciliationPlan) -> Result<i64, InvoiceError> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let invoice_id = apply(&mut staged, plan)?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!(invoice_id, "Simulated commit failure, discarding staged changes");
            return Err(InvoiceError::Storage(AppError::DatabaseError(
                anyhow::anyhow!("Failed to commit transaction: simulated failure"),
            )));
        }

        *state = staged;
        info!(invoice_id, mutations = plan.mutations().len(), "Invoice plan applied");
        Ok(invoice_id)
    }

    async fn get_invoice(
        &self,
        invoice_id: i64,
    ) -> Result<Option<(Invoice, Vec<InvoiceLineView>)>, AppError> {
        let state = self.state.lock().await;
        let Some(invoice) = state.invoices.get(&invoice_id).cloned() else {
            return Ok(None);
        };
        let lines = state
            .lines_of(invoice_id)
            .into_iter()
            .map(|line| {
                let part = state.parts.get(&line.part_id);
                InvoiceLineView {
                    invoice_line_id: line.invoice_line_id,
                    invoice_id: line.invoice_id,
                    part_id: line.part_id,
                    description: part.map(|p| p.description.clone()).unwrap_or_default(),
                    quantity: line.quantity,
                    price: line.price,
                    taxable: part.is_some_and(|p| p.taxable),
                    removed_from_view: line.removed_from_view,
                }
            })
            .collect();
        Ok(Some((invoice, lines)))
    }

    async fn list_customer_invoices(
        &self,
        customer_id: i64,
    ) -> Result<Vec<InvoiceSummary>, AppError> {
        let state = self.state.lock().await;
        let mut invoices: Vec<InvoiceSummary> = state
            .invoices
            .values()
            .filter(|invoice| invoice.customer_id == customer_id)
            .map(InvoiceSummary::from)
            .collect();
        invoices.sort_by_key(|invoice| (invoice.invoice_date, invoice.invoice_id));
        Ok(invoices)
    }

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn get_employee(&self, employee_id: i64) -> Result<Option<Employee>, AppError> {
        Ok(self.state.lock().await.employees.get(&employee_id).cloned())
    }

    async fn get_part(&self, part_id: i64) -> Result<Option<Part>, AppError> {
        Ok(self.part(part_id).await)
    }

    async fn part_description_taken(
        &self,
        part_category_id: i64,
        description: &str,
        excluding: Option<i64>,
    ) -> Result<bool, AppError> {
        let wanted = normalize_description(description);
        let state = self.state.lock().await;
        Ok(state.parts.values().any(|part| {
            part.part_category_id == part_category_id
                && Some(part.part_id) != excluding
                && normalize_description(&part.description) == wanted
        }))
    }

    #[instrument(skip(self, edit), fields(part_id = ?edit.part_id))]
    async fn save_part(&self, edit: &PartEdit) -> Result<Option<Part>, AppError> {
        let mut state = self.state.lock().await;
        let part_id = match edit.part_id {
            Some(part_id) => part_id,
            None => {
                state.next_part_id += 1;
                state.next_part_id
            }
        };
        let version = match (edit.part_id, state.parts.get(&part_id)) {
            (Some(_), None) => return Ok(None),
            (Some(_), Some(existing)) => existing.version + 1,
            (None, _) => 1,
        };
        let wanted = normalize_description(&edit.description);
        if state.parts.values().any(|part| {
            part.part_id != part_id
                && part.part_category_id == edit.part_category_id
                && normalize_description(&part.description) == wanted
        }) {
            return Err(duplicate_part_error());
        }
        let part = Part {
            part_id,
            part_category_id: edit.part_category_id,
            description: edit.description.trim().to_string(),
            cost: edit.cost,
            price: edit.price,
            reorder_level: edit.reorder_level,
            quantity_on_hand: edit.quantity_on_hand,
            taxable: edit.taxable,
            removed_from_view: edit.removed_from_view,
            version,
        };
        state.parts.insert(part_id, part.clone());
        Ok(Some(part))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
