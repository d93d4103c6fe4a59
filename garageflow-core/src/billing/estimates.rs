use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::billing::totals::{compute_totals, validate_item};
use crate::error::{GarageError, Result};
use crate::gateway::{with_deadline, PersistenceGateway};
use crate::models::{Estimate, EstimateItem, EstimateItemInput};
use crate::sequencer::Sequencer;

/// Line item edit applied to an estimate.
enum ItemEdit {
    Add(EstimateItemInput),
    Update(Uuid, EstimateItemInput),
    Remove(Uuid),
}

/// Edits estimate line items.
///
/// Every edit of a job's estimate goes through the job's turn on the shared
/// sequencer, so edits land in submission order and never interleave with
/// invoice generation. Totals are recomputed and persisted with every edit.
pub struct EstimateEditor {
    gateway: Arc<dyn PersistenceGateway>,
    jobs: Arc<Sequencer>,
    persistence_timeout: Duration,
}

impl EstimateEditor {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        jobs: Arc<Sequencer>,
        persistence_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            jobs,
            persistence_timeout,
        }
    }

    /// Appends a line item to the job's estimate.
    #[instrument(skip(self, input), fields(item = %input.name))]
    pub async fn add_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        input: EstimateItemInput,
    ) -> Result<Estimate> {
        validate_item(&input)?;
        self.edit(tenant_id, job_id, ItemEdit::Add(input)).await
    }

    /// Replaces the fields of an existing line item.
    #[instrument(skip(self, input))]
    pub async fn update_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        item_id: Uuid,
        input: EstimateItemInput,
    ) -> Result<Estimate> {
        validate_item(&input)?;
        self.edit(tenant_id, job_id, ItemEdit::Update(item_id, input))
            .await
    }

    /// Removes a line item.
    #[instrument(skip(self))]
    pub async fn remove_estimate_item(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
        item_id: Uuid,
    ) -> Result<Estimate> {
        self.edit(tenant_id, job_id, ItemEdit::Remove(item_id)).await
    }

    async fn edit(&self, tenant_id: Uuid, job_id: Uuid, edit: ItemEdit) -> Result<Estimate> {
        let _turn = self.jobs.acquire(job_id).await;

        let mut estimate = with_deadline(
            self.persistence_timeout,
            self.gateway.load_estimate(tenant_id, job_id),
        )
        .await?
        .ok_or(GarageError::EstimateNotFound(job_id))?;

        self.ensure_unlocked(tenant_id, &estimate).await?;

        // Work on a copy; the stored estimate only changes if the save does.
        let mut items = estimate.items.clone();
        match edit {
            ItemEdit::Add(input) => {
                items.push(EstimateItem::from_input(estimate.id, input));
            }
            ItemEdit::Update(item_id, input) => {
                items
                    .iter_mut()
                    .find(|item| item.id == item_id)
                    .ok_or(GarageError::ItemNotFound(item_id))?
                    .apply(input);
            }
            ItemEdit::Remove(item_id) => {
                let before = items.len();
                items.retain(|item| item.id != item_id);
                if items.len() == before {
                    return Err(GarageError::ItemNotFound(item_id));
                }
            }
        }

        let totals = compute_totals(&items, estimate.tax_rate)?.rounded();

        with_deadline(
            self.persistence_timeout,
            self.gateway
                .save_estimate_items(tenant_id, estimate.id, &items, &totals),
        )
        .await?;

        info!(
            estimate_id = %estimate.id,
            items = items.len(),
            total = %totals.total_amount,
            "Estimate updated"
        );

        estimate.items = items;
        estimate.totals = totals;
        Ok(estimate)
    }

    /// An estimate is read-only once it carries the lock flag or an invoice
    /// exists for its job. Completed jobs always have an invoice.
    async fn ensure_unlocked(&self, tenant_id: Uuid, estimate: &Estimate) -> Result<()> {
        if estimate.locked {
            return Err(GarageError::EstimateLocked {
                estimate_id: estimate.id,
            });
        }

        let invoice = with_deadline(
            self.persistence_timeout,
            self.gateway.load_invoice_by_job(tenant_id, estimate.job_id),
        )
        .await?;
        if invoice.is_some() {
            return Err(GarageError::EstimateLocked {
                estimate_id: estimate.id,
            });
        }
        Ok(())
    }
}
