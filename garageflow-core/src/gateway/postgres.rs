use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{GatewayResult, PersistenceGateway};
use crate::error::PersistenceError;
use crate::models::{
    Estimate, EstimateItem, EstimateTotals, Invoice, InvoiceLine, InvoiceStatus, Job, JobStatus,
    Payment, PaymentMethod,
};

/// Row shape of the `estimates` table.
#[derive(Debug, FromRow)]
struct EstimateRow {
    id: Uuid,
    tenant_id: Uuid,
    job_id: Uuid,
    tax_rate: Decimal,
    parts_total: Decimal,
    labor_total: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    locked: bool,
    updated_at: DateTime<Utc>,
}

impl EstimateRow {
    fn into_estimate(self, items: Vec<EstimateItem>) -> Estimate {
        Estimate {
            id: self.id,
            tenant_id: self.tenant_id,
            job_id: self.job_id,
            items,
            tax_rate: self.tax_rate,
            totals: EstimateTotals {
                parts_total: self.parts_total,
                labor_total: self.labor_total,
                tax_amount: self.tax_amount,
                total_amount: self.total_amount,
            },
            locked: self.locked,
            updated_at: self.updated_at,
        }
    }
}

/// Row shape of the `invoices` table.
#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    tenant_id: Uuid,
    job_id: Uuid,
    estimate_id: Uuid,
    items: Json<Vec<InvoiceLine>>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    paid_amount: Decimal,
    balance: Decimal,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Invoice {
            id: row.id,
            tenant_id: row.tenant_id,
            job_id: row.job_id,
            estimate_id: row.estimate_id,
            items: row.items.0,
            subtotal: row.subtotal,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            balance: row.balance,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, tenant_id, customer_id, vehicle_id, mechanic_id, status, \
     complaint, notes, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, tenant_id, job_id, estimate_id, items, subtotal, tax_rate, \
     tax_amount, total_amount, paid_amount, balance, status, created_at, updated_at";

/// PostgreSQL persistence gateway.
///
/// Schema lives in `migrations/0001_init.sql`.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, estimate_id: Uuid) -> GatewayResult<Vec<EstimateItem>> {
        let items = sqlx::query_as::<_, EstimateItem>(
            r#"
            SELECT id, estimate_id, name, part_number, quantity, unit_price, labor_cost
            FROM estimate_items
            WHERE estimate_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(estimate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    #[instrument(skip(self))]
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> GatewayResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE id = $1 AND tenant_id = $2",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    #[instrument(skip(self))]
    async fn list_jobs(&self, tenant_id: Uuid) -> GatewayResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE tenant_id = $1 ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn save_job_status(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        status: JobStatus,
    ) -> GatewayResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(tenant_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Conflict(format!(
                "job {} is missing or already completed",
                job_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_estimate(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Estimate>> {
        let row = sqlx::query_as::<_, EstimateRow>(
            r#"
            SELECT id, tenant_id, job_id, tax_rate, parts_total, labor_total,
                tax_amount, total_amount, locked, updated_at
            FROM estimates
            WHERE job_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_estimate(items)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, items, totals), fields(item_count = items.len()))]
    async fn save_estimate_items(
        &self,
        tenant_id: Uuid,
        estimate_id: Uuid,
        items: &[EstimateItem],
        totals: &EstimateTotals,
    ) -> GatewayResult<()> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken here also serialises concurrent writers.
        let updated = sqlx::query(
            r#"
            UPDATE estimates
            SET parts_total = $3, labor_total = $4, tax_amount = $5, total_amount = $6,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND locked = false
            "#,
        )
        .bind(estimate_id)
        .bind(tenant_id)
        .bind(totals.parts_total)
        .bind(totals.labor_total)
        .bind(totals.tax_amount)
        .bind(totals.total_amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(PersistenceError::Conflict(format!(
                "estimate {} is missing or locked",
                estimate_id
            )));
        }

        sqlx::query("DELETE FROM estimate_items WHERE estimate_id = $1")
            .bind(estimate_id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO estimate_items (
                    id, estimate_id, position, name, part_number, quantity, unit_price, labor_cost
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(estimate_id)
            .bind(position as i32)
            .bind(&item.name)
            .bind(&item.part_number)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.labor_cost)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn lock_estimate(&self, tenant_id: Uuid, estimate_id: Uuid) -> GatewayResult<()> {
        sqlx::query(
            r#"
            UPDATE estimates
            SET locked = true, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(estimate_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_invoice_by_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE job_id = $1 AND tenant_id = $2",
            INVOICE_COLUMNS
        ))
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Invoice::from))
    }

    #[instrument(skip(self))]
    async fn load_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1 AND tenant_id = $2",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Invoice::from))
    }

    #[instrument(skip(self, invoice), fields(job_id = %invoice.job_id))]
    async fn save_invoice(&self, tenant_id: Uuid, invoice: &Invoice) -> GatewayResult<Invoice> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO invoices (
                id, tenant_id, job_id, estimate_id, items, subtotal, tax_rate, tax_amount,
                total_amount, paid_amount, balance, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(invoice.id)
        .bind(tenant_id)
        .bind(invoice.job_id)
        .bind(invoice.estimate_id)
        .bind(Json(&invoice.items))
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.balance)
        .bind(invoice.status)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            info!(job_id = %invoice.job_id, "Invoice already exists for job, keeping stored row");
        }

        self.load_invoice_by_job(tenant_id, invoice.job_id)
            .await?
            .ok_or_else(|| {
                PersistenceError::Conflict(format!(
                    "invoice for job {} vanished after upsert",
                    invoice.job_id
                ))
            })
    }

    #[instrument(skip(self))]
    async fn update_invoice_balance(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> GatewayResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET paid_amount = $3, balance = $4, status = $5, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(tenant_id)
        .bind(paid_amount)
        .bind(balance)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Database(format!(
                "invoice {} does not exist",
                invoice_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> GatewayResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, tenant_id, invoice_id, amount, method, recorded_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, tenant_id, invoice_id, amount, method, recorded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(amount)
        .bind(method)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn list_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> GatewayResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, tenant_id, invoice_id, amount, method, recorded_at
            FROM payments
            WHERE invoice_id = $1 AND tenant_id = $2
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(invoice_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn list_drifted_invoices(&self, limit: i64) -> GatewayResult<Vec<(Uuid, Uuid)>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT i.tenant_id, i.id
            FROM invoices i
            WHERE i.paid_amount <> COALESCE(
                (SELECT SUM(p.amount) FROM payments p WHERE p.invoice_id = i.id),
                0
            )
            ORDER BY i.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
