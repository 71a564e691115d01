//! Invoice reconciliation.
//!
//! Saving an invoice is split in two. [`plan_save`] is a pure function that
//! diffs the submitted invoice against the stored snapshot and produces an
//! ordered list of [`Mutation`]s together with the recomputed totals. A store
//! then applies the whole plan inside a single transaction
//! (see [`crate::services::InvoiceStore::apply_plan`]).
//!
//! Stock rules:
//! - a new line sells its quantity (`QOH -= quantity`);
//! - a changed quantity on a kept line sells the difference
//!   (`QOH -= new - old`, so selling fewer returns stock);
//! - a line missing from the submission is deleted and its quantity returned;
//! - flagging a line `removed_from_view` only drops it from the totals, its
//!   stock stays sold.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{InvoiceError, StockShortfall};
use crate::models::{Invoice, InvoiceDraft, InvoiceLine, Part};

/// Sales tax applied to taxable parts unless configured otherwise (5%).
pub fn default_tax_rate() -> Decimal {
    Decimal::new(5, 2)
}

/// Money columns are `NUMERIC(19, 4)`; every stored amount stays below this.
pub fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000_000, 0)
}

/// Stored state the plan is computed against.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Stored header; `None` for an invoice that does not exist yet.
    pub invoice: Option<Invoice>,
    /// Stored lines of the invoice (the reference state).
    pub lines: Vec<InvoiceLine>,
    /// Every part referenced by the submission or by the stored lines.
    pub parts: HashMap<i64, Part>,
    pub customer_exists: bool,
    pub employee_exists: bool,
}

/// Header values written by a save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceHeader {
    pub invoice_id: Option<i64>,
    /// Version read with the snapshot; the store refuses to commit if it moved.
    pub expected_version: Option<i64>,
    pub invoice_date: NaiveDate,
    pub customer_id: i64,
    pub employee_id: i64,
    pub sub_total: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoiceLine {
    pub part_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub removed_from_view: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLineUpdate {
    pub invoice_line_id: i64,
    pub quantity: i32,
    pub removed_from_view: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    NewLine,
    QuantityChanged,
    LineRemoved,
}

/// Signed change to a part's quantity on hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAdjustment {
    pub part_id: i64,
    pub delta: i64,
    pub reason: StockReason,
}

/// One storage command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    UpsertHeader(InvoiceHeader),
    InsertLine(NewInvoiceLine),
    UpdateLine(InvoiceLineUpdate),
    DeleteLine { invoice_line_id: i64 },
    AdjustStock(StockAdjustment),
}

/// Everything a save has to write, in application order.
///
/// Only [`plan_save`] builds one. The first mutation is always the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    header: InvoiceHeader,
    mutations: Vec<Mutation>,
}

impl ReconciliationPlan {
    pub fn header(&self) -> &InvoiceHeader {
        &self.header
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Net stock change per part, ordered by part ID (the lock order).
    pub fn stock_deltas(&self) -> BTreeMap<i64, i64> {
        let mut deltas = BTreeMap::new();
        for mutation in &self.mutations {
            if let Mutation::AdjustStock(adj) = mutation {
                *deltas.entry(adj.part_id).or_insert(0) += adj.delta;
            }
        }
        deltas
    }

    pub fn inserts(&self) -> impl Iterator<Item = &NewInvoiceLine> {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::InsertLine(line) => Some(line),
            _ => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &InvoiceLineUpdate> {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::UpdateLine(update) => Some(update),
            _ => None,
        })
    }

    pub fn deletes(&self) -> impl Iterator<Item = i64> + '_ {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::DeleteLine { invoice_line_id } => Some(*invoice_line_id),
            _ => None,
        })
    }
}

/// Rules that need nothing but the submission itself.
///
/// All violations are returned together.
pub fn validate_draft(draft: &InvoiceDraft) -> Vec<String> {
    let mut violations = Vec::new();

    if draft.lines.is_empty() {
        violations.push("Invoice must have invoice lines".to_string());
    }
    if draft.customer_id == 0 {
        violations.push("No customer was provided".to_string());
    }
    if draft.employee_id == 0 {
        violations.push("No employee was provided".to_string());
    }
    for line in &draft.lines {
        if line.quantity < 1 {
            violations.push(format!(
                "Invoice line {} has a quantity less than 1",
                line.label()
            ));
        }
        if line.invoice_line_id.is_none() {
            if line.price < Decimal::ZERO {
                violations.push(format!(
                    "Invoice line {} has a price less than zero",
                    line.label()
                ));
            } else if line.price >= max_amount() {
                violations.push(format!(
                    "Invoice line {} has a price that is too large",
                    line.label()
                ));
            }
        }
    }

    violations
}

/// Diff `draft` against `snapshot` and stage every write a save needs.
///
/// Nothing is written here; an `Err` means the save must not happen at all.
pub fn plan_save(
    draft: &InvoiceDraft,
    snapshot: &Snapshot,
    tax_rate: Decimal,
) -> Result<ReconciliationPlan, InvoiceError> {
    let mut violations = validate_draft(draft);
    if draft.customer_id != 0 && !snapshot.customer_exists {
        violations.push(format!("Customer {} does not exist", draft.customer_id));
    }
    if draft.employee_id != 0 && !snapshot.employee_exists {
        violations.push(format!("Employee {} does not exist", draft.employee_id));
    }

    let mut problems = Vec::new();
    if let (Some(invoice_id), None) = (draft.invoice_id, &snapshot.invoice) {
        problems.push(format!("Invoice {} does not exist", invoice_id));
    }

    let reference: HashMap<i64, &InvoiceLine> = snapshot
        .lines
        .iter()
        .map(|line| (line.invoice_line_id, line))
        .collect();

    let mut line_mutations = Vec::new();
    let mut quantity_changes = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut sub_total = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for line in &draft.lines {
        let (part_id, price) = match line.invoice_line_id {
            Some(line_id) => {
                if !seen_ids.insert(line_id) {
                    problems.push(format!(
                        "Invoice line {} is listed more than once",
                        line_id
                    ));
                    continue;
                }
                let Some(stored) = reference.get(&line_id) else {
                    problems.push(format!(
                        "Invoice line {} ({}) cannot be found in the existing invoice lines",
                        line_id,
                        line.label()
                    ));
                    continue;
                };
                if stored.part_id != line.part_id {
                    problems.push(format!(
                        "Invoice line {} cannot change its part from {} to {}",
                        line_id, stored.part_id, line.part_id
                    ));
                    continue;
                }
                if stored.quantity != line.quantity
                    || stored.removed_from_view != line.removed_from_view
                {
                    line_mutations.push(Mutation::UpdateLine(InvoiceLineUpdate {
                        invoice_line_id: line_id,
                        quantity: line.quantity,
                        removed_from_view: line.removed_from_view,
                    }));
                }
                if stored.quantity != line.quantity {
                    quantity_changes.push(StockAdjustment {
                        part_id: stored.part_id,
                        delta: i64::from(stored.quantity) - i64::from(line.quantity),
                        reason: StockReason::QuantityChanged,
                    });
                }
                (stored.part_id, stored.price)
            }
            None => {
                match snapshot.parts.get(&line.part_id) {
                    None => {
                        problems.push(format!("Part {} does not exist", line.part_id));
                        continue;
                    }
                    Some(part) if part.removed_from_view => {
                        violations.push(format!(
                            "Part {} ({}) is no longer sold",
                            part.part_id, part.description
                        ));
                        continue;
                    }
                    Some(_) => {}
                }
                line_mutations.push(Mutation::InsertLine(NewInvoiceLine {
                    part_id: line.part_id,
                    quantity: line.quantity,
                    price: line.price,
                    removed_from_view: line.removed_from_view,
                }));
                line_mutations.push(Mutation::AdjustStock(StockAdjustment {
                    part_id: line.part_id,
                    delta: -i64::from(line.quantity),
                    reason: StockReason::NewLine,
                }));
                (line.part_id, line.price)
            }
        };

        if !line.removed_from_view {
            let taxable = snapshot
                .parts
                .get(&part_id)
                .map(|part| part.taxable)
                .unwrap_or(false);
            match add_line_amount(sub_total, tax, line.quantity, price, taxable, tax_rate) {
                Some((new_sub_total, new_tax)) => {
                    sub_total = new_sub_total;
                    tax = new_tax;
                }
                None => violations.push(format!(
                    "Invoice line {} amount is too large",
                    line.label()
                )),
            }
        }
    }

    let kept_ids: HashSet<i64> = draft
        .lines
        .iter()
        .filter_map(|line| line.invoice_line_id)
        .collect();
    let mut removals = Vec::new();
    for stored in &snapshot.lines {
        if !kept_ids.contains(&stored.invoice_line_id) {
            removals.push(Mutation::AdjustStock(StockAdjustment {
                part_id: stored.part_id,
                delta: i64::from(stored.quantity),
                reason: StockReason::LineRemoved,
            }));
            removals.push(Mutation::DeleteLine {
                invoice_line_id: stored.invoice_line_id,
            });
        }
    }

    if !problems.is_empty() {
        return Err(InvoiceError::Consistency(problems));
    }
    if !violations.is_empty() {
        return Err(InvoiceError::Validation(violations));
    }

    let header = InvoiceHeader {
        invoice_id: draft.invoice_id,
        expected_version: snapshot.invoice.as_ref().map(|invoice| invoice.version),
        invoice_date: draft.invoice_date,
        customer_id: draft.customer_id,
        employee_id: draft.employee_id,
        sub_total,
        tax,
    };

    let mut mutations = Vec::with_capacity(1 + line_mutations.len() + quantity_changes.len());
    mutations.push(Mutation::UpsertHeader(header.clone()));
    mutations.extend(line_mutations);
    mutations.extend(quantity_changes.into_iter().map(Mutation::AdjustStock));
    mutations.extend(removals);

    let plan = ReconciliationPlan { header, mutations };

    let shortfalls = stock_shortfalls(&plan, &snapshot.parts);
    if !shortfalls.is_empty() {
        return Err(InvoiceError::InsufficientStock(shortfalls));
    }

    Ok(plan)
}

/// Running totals with one more line added, or `None` once any amount leaves
/// the storable range.
fn add_line_amount(
    sub_total: Decimal,
    tax: Decimal,
    quantity: i32,
    price: Decimal,
    taxable: bool,
    tax_rate: Decimal,
) -> Option<(Decimal, Decimal)> {
    let amount = Decimal::from(quantity).checked_mul(price)?;
    let line_tax = if taxable {
        amount.checked_mul(tax_rate)?
    } else {
        Decimal::ZERO
    };
    let sub_total = sub_total.checked_add(amount)?;
    let tax = tax.checked_add(line_tax)?;
    (sub_total.checked_add(tax)? < max_amount()).then_some((sub_total, tax))
}

/// Parts whose stock would go negative if the plan were applied to `parts`.
pub fn stock_shortfalls(plan: &ReconciliationPlan, parts: &HashMap<i64, Part>) -> Vec<StockShortfall> {
    plan.stock_deltas()
        .into_iter()
        .filter(|(_, delta)| *delta < 0)
        .filter_map(|(part_id, delta)| {
            let part = parts.get(&part_id)?;
            let after = i64::from(part.quantity_on_hand) + delta;
            (after < 0).then(|| StockShortfall {
                part_id,
                description: part.description.clone(),
                quantity_on_hand: part.quantity_on_hand,
                requested: -after,
            })
        })
        .collect()
}
