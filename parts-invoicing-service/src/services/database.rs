//! PostgreSQL store for parts-invoicing-service.

use crate::error::InvoiceError;
use crate::models::{
    Customer, Employee, Invoice, InvoiceDraft, InvoiceLine, InvoiceLineView, InvoiceSummary, Part,
    PartEdit,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::reconciler::{Mutation, ReconciliationPlan, Snapshot};
use crate::services::store::{
    duplicate_part_error, normalize_description, referenced_part_ids, InvoiceStore,
};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

const PART_COLUMNS: &str = "part_id, part_category_id, description, cost, price, reorder_level, \
     quantity_on_hand, taxable, removed_from_view, version";

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "parts-invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn exists(&self, sql: &'static str, id: i64) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to check existence"))
    }
}

#[async_trait]
impl InvoiceStore for Database {
    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, draft), fields(invoice_id = ?draft.invoice_id))]
    async fn load_snapshot(&self, draft: &InvoiceDraft) -> Result<Snapshot, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_snapshot"])
            .start_timer();

        let invoice = match draft.invoice_id {
            Some(invoice_id) => sqlx::query_as::<_, Invoice>(
                r#"
                SELECT invoice_id, invoice_date, customer_id, employee_id, sub_total, tax, version
                FROM invoices
                WHERE invoice_id = $1
                "#,
            )
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get invoice"))?,
            None => None,
        };

        let lines = match &invoice {
            Some(invoice) => sqlx::query_as::<_, InvoiceLine>(
                r#"
                SELECT invoice_line_id, invoice_id, part_id, quantity, price, removed_from_view
                FROM invoice_lines
                WHERE invoice_id = $1
                ORDER BY invoice_line_id
                "#,
            )
            .bind(invoice.invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to get invoice lines"))?,
            None => Vec::new(),
        };

        let part_ids = referenced_part_ids(draft, lines.iter().map(|line| line.part_id));
        let parts = sqlx::query_as::<_, Part>(&format!(
            "SELECT {} FROM parts WHERE part_id = ANY($1)",
            PART_COLUMNS
        ))
        .bind(&part_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to get parts"))?
        .into_iter()
        .map(|part| (part.part_id, part))
        .collect::<HashMap<_, _>>();

        let customer_exists = self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM customers WHERE customer_id = $1)",
                draft.customer_id,
            )
            .await?;
        let employee_exists = self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM employees WHERE employee_id = $1)",
                draft.employee_id,
            )
            .await?;

        timer.observe_duration();

        Ok(Snapshot {
            invoice,
            lines,
            parts,
            customer_exists,
            employee_exists,
        })
    }

    /// Applies the plan in one transaction.
    ///
    /// Locks are taken in a fixed order: the invoice row, then the parts in
    /// ascending ID order. Stock is changed by relative deltas so sales on
    /// other invoices in between are kept.
    #[instrument(skip(self, plan), fields(invoice_id = ?plan.header().invoice_id))]
    async fn apply_plan(&self, plan: &ReconciliationPlan) -> Result<i64, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_plan"])
            .start_timer();

        let header = plan.header();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let invoice_id = match header.invoice_id {
            Some(invoice_id) => {
                let version = sqlx::query_scalar::<_, i64>(
                    "SELECT version FROM invoices WHERE invoice_id = $1 FOR UPDATE",
                )
                .bind(invoice_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to lock invoice"))?;

                if version != header.expected_version {
                    tx.rollback().await.ok();
                    warn!(invoice_id, ?version, expected = ?header.expected_version, "Stale invoice");
                    return Err(InvoiceError::Conflict(match version {
                        Some(_) => format!("Invoice {} was modified by another user", invoice_id),
                        None => format!("Invoice {} was deleted", invoice_id),
                    }));
                }

                sqlx::query(
                    r#"
                    UPDATE invoices
                    SET invoice_date = $2,
                        customer_id = $3,
                        employee_id = $4,
                        sub_total = $5,
                        tax = $6,
                        version = version + 1
                    WHERE invoice_id = $1
                    "#,
                )
                .bind(invoice_id)
                .bind(header.invoice_date)
                .bind(header.customer_id)
                .bind(header.employee_id)
                .bind(header.sub_total)
                .bind(header.tax)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to update invoice"))?;

                invoice_id
            }
            None => sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO invoices (invoice_date, customer_id, employee_id, sub_total, tax)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING invoice_id
                "#,
            )
            .bind(header.invoice_date)
            .bind(header.customer_id)
            .bind(header.employee_id)
            .bind(header.sub_total)
            .bind(header.tax)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to create invoice"))?,
        };

        let deltas = plan.stock_deltas();
        let part_ids: Vec<i64> = deltas.keys().copied().collect();
        let stock: HashMap<i64, i32> = sqlx::query_as::<_, (i64, i32)>(
            r#"
            SELECT part_id, quantity_on_hand
            FROM parts
            WHERE part_id = ANY($1)
            ORDER BY part_id
            FOR UPDATE
            "#,
        )
        .bind(&part_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to lock parts"))?
        .into_iter()
        .collect();

        for mutation in plan.mutations() {
            match mutation {
                Mutation::UpsertHeader(_) | Mutation::AdjustStock(_) => {}
                Mutation::InsertLine(line) => {
                    sqlx::query(
                        r#"
                        INSERT INTO invoice_lines (invoice_id, part_id, quantity, price, removed_from_view)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(invoice_id)
                    .bind(line.part_id)
                    .bind(line.quantity)
                    .bind(line.price)
                    .bind(line.removed_from_view)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to add invoice line"))?;
                }
                Mutation::UpdateLine(update) => {
                    let result = sqlx::query(
                        r#"
                        UPDATE invoice_lines
                        SET quantity = $3, removed_from_view = $4
                        WHERE invoice_line_id = $1 AND invoice_id = $2
                        "#,
                    )
                    .bind(update.invoice_line_id)
                    .bind(invoice_id)
                    .bind(update.quantity)
                    .bind(update.removed_from_view)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to update invoice line"))?;

                    if result.rows_affected() == 0 {
                        tx.rollback().await.ok();
                        return Err(InvoiceError::Conflict(format!(
                            "Invoice line {} no longer exists",
                            update.invoice_line_id
                        )));
                    }
                }
                Mutation::DeleteLine { invoice_line_id } => {
                    let result = sqlx::query(
                        "DELETE FROM invoice_lines WHERE invoice_line_id = $1 AND invoice_id = $2",
                    )
                    .bind(invoice_line_id)
                    .bind(invoice_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to remove invoice line"))?;

                    if result.rows_affected() == 0 {
                        tx.rollback().await.ok();
                        return Err(InvoiceError::Conflict(format!(
                            "Invoice line {} no longer exists",
                            invoice_line_id
                        )));
                    }
                }
            }
        }

        for (part_id, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let covered = stock
                .get(&part_id)
                .is_some_and(|qoh| i64::from(*qoh) + delta >= 0);
            if !covered {
                tx.rollback().await.ok();
                return Err(InvoiceError::Conflict(format!(
                    "Stock of part {} changed and can no longer cover this invoice",
                    part_id
                )));
            }

            sqlx::query(
                r#"
                UPDATE parts
                SET quantity_on_hand = quantity_on_hand + $2,
                    version = version + 1
                WHERE part_id = $1
                "#,
            )
            .bind(part_id)
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to adjust stock"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(invoice_id, mutations = plan.mutations().len(), "Invoice plan applied");

        Ok(invoice_id)
    }

    #[instrument(skip(self))]
    async fn get_invoice(
        &self,
        invoice_id: i64,
    ) -> Result<Option<(Invoice, Vec<InvoiceLineView>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_date, customer_id, employee_id, sub_total, tax, version
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get invoice"))?;

        let Some(invoice) = invoice else {
            timer.observe_duration();
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, InvoiceLineView>(
            r#"
            SELECT l.invoice_line_id, l.invoice_id, l.part_id, p.description, l.quantity,
                l.price, p.taxable, l.removed_from_view
            FROM invoice_lines l
            JOIN parts p ON p.part_id = l.part_id
            WHERE l.invoice_id = $1
            ORDER BY l.invoice_line_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to get invoice lines"))?;

        timer.observe_duration();

        Ok(Some((invoice, lines)))
    }

    #[instrument(skip(self))]
    async fn list_customer_invoices(
        &self,
        customer_id: i64,
    ) -> Result<Vec<InvoiceSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customer_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, InvoiceSummary>(
            r#"
            SELECT invoice_id, invoice_date, sub_total, tax
            FROM invoices
            WHERE customer_id = $1
            ORDER BY invoice_date, invoice_id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list invoices"))?;

        timer.observe_duration();

        Ok(invoices)
    }

    // -------------------------------------------------------------------------
    // People
    // -------------------------------------------------------------------------

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError> {
        sqlx::query_as::<_, Customer>(
            "SELECT customer_id, first_name, last_name FROM customers WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get customer"))
    }

    async fn get_employee(&self, employee_id: i64) -> Result<Option<Employee>, AppError> {
        sqlx::query_as::<_, Employee>(
            "SELECT employee_id, first_name, last_name FROM employees WHERE employee_id = $1",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get employee"))
    }

    // -------------------------------------------------------------------------
    // Part Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn get_part(&self, part_id: i64) -> Result<Option<Part>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_part"])
            .start_timer();

        let part = sqlx::query_as::<_, Part>(&format!(
            "SELECT {} FROM parts WHERE part_id = $1",
            PART_COLUMNS
        ))
        .bind(part_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get part"))?;

        timer.observe_duration();

        Ok(part)
    }

    async fn part_description_taken(
        &self,
        part_category_id: i64,
        description: &str,
        excluding: Option<i64>,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM parts
                WHERE part_category_id = $1
                  AND LOWER(TRIM(description)) = $2
                  AND ($3::BIGINT IS NULL OR part_id <> $3)
            )
            "#,
        )
        .bind(part_category_id)
        .bind(normalize_description(description))
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to check part description"))
    }

    #[instrument(skip(self, edit), fields(part_id = ?edit.part_id))]
    async fn save_part(&self, edit: &PartEdit) -> Result<Option<Part>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_part"])
            .start_timer();

        let query = match edit.part_id {
            Some(_) => format!(
                r#"
                UPDATE parts
                SET part_category_id = $2, description = $3, cost = $4, price = $5,
                    reorder_level = $6, quantity_on_hand = $7, taxable = $8,
                    removed_from_view = $9, version = version + 1
                WHERE part_id = $1
                RETURNING {}
                "#,
                PART_COLUMNS
            ),
            None => format!(
                r#"
                INSERT INTO parts (part_category_id, description, cost, price, reorder_level,
                    quantity_on_hand, taxable, removed_from_view)
                SELECT $2, $3, $4, $5, $6, $7, $8, $9
                WHERE $1::BIGINT IS NULL
                RETURNING {}
                "#,
                PART_COLUMNS
            ),
        };

        let part = sqlx::query_as::<_, Part>(&query)
            .bind(edit.part_id)
            .bind(edit.part_category_id)
            .bind(edit.description.trim())
            .bind(edit.cost)
            .bind(edit.price)
            .bind(edit.reorder_level)
            .bind(edit.quantity_on_hand)
            .bind(edit.taxable)
            .bind(edit.removed_from_view)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    duplicate_part_error()
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to save part: {}", e)),
            })?;

        timer.observe_duration();

        if let Some(part) = &part {
            info!(part_id = part.part_id, version = part.version, "Part saved");
        }

        Ok(part)
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}
