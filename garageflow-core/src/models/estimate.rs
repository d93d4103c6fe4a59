use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Number of decimal places money is persisted with.
pub const MONEY_SCALE: u32 = 2;

/// Rounds a money value half-up to two decimal places, always keeping a
/// scale of two so `500` renders as `500.00`.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// A single parts/labor line on an estimate.
///
/// Maps to the `estimate_items` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EstimateItem {
    /// Unique identifier for the item
    pub id: Uuid,

    /// Estimate that owns this item
    pub estimate_id: Uuid,

    /// Part or service name
    pub name: String,

    /// Manufacturer part number
    pub part_number: Option<String>,

    /// Number of parts, always at least one
    pub quantity: i32,

    /// Price per part
    pub unit_price: Decimal,

    /// Labor charged for this line
    pub labor_cost: Decimal,
}

/// Item payload for adding or replacing an estimate line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateItemInput {
    pub name: String,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub labor_cost: Decimal,
}

impl EstimateItem {
    pub fn from_input(estimate_id: Uuid, input: EstimateItemInput) -> Self {
        EstimateItem {
            id: Uuid::new_v4(),
            estimate_id,
            name: input.name,
            part_number: input.part_number,
            quantity: input.quantity,
            unit_price: input.unit_price,
            labor_cost: input.labor_cost,
        }
    }

    /// Replaces the editable fields, keeping identity.
    pub fn apply(&mut self, input: EstimateItemInput) {
        self.name = input.name;
        self.part_number = input.part_number;
        self.quantity = input.quantity;
        self.unit_price = input.unit_price;
        self.labor_cost = input.labor_cost;
    }
}

/// Aggregated money figures of an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EstimateTotals {
    pub parts_total: Decimal,
    pub labor_total: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl EstimateTotals {
    /// Totals as persisted: each figure rounded half-up to two places.
    ///
    /// The total is re-derived from the rounded parts so the stored figures
    /// always add up.
    pub fn rounded(&self) -> EstimateTotals {
        let parts_total = round_money(self.parts_total);
        let labor_total = round_money(self.labor_total);
        let tax_amount = round_money(self.tax_amount);
        EstimateTotals {
            parts_total,
            labor_total,
            tax_amount,
            total_amount: parts_total + labor_total + tax_amount,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.parts_total + self.labor_total
    }
}

/// Estimate model: the mutable, pre-invoice costing document of a job.
///
/// Totals are derived from `items` and never edited by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    /// Unique identifier for the estimate
    pub id: Uuid,

    /// Garage (tenant) that owns this estimate
    pub tenant_id: Uuid,

    /// Job this estimate prices (one estimate per job)
    pub job_id: Uuid,

    /// Line items in submission order
    pub items: Vec<EstimateItem>,

    /// Tax rate the stored totals were computed with
    pub tax_rate: Decimal,

    /// Stored (rounded) totals
    #[serde(flatten)]
    pub totals: EstimateTotals,

    /// Set once an invoice has been generated or the job completed
    pub locked: bool,

    /// Timestamp when the estimate was last updated
    pub updated_at: DateTime<Utc>,
}

impl Estimate {
    /// Creates the empty estimate that accompanies a new job.
    pub fn empty(tenant_id: Uuid, job_id: Uuid, tax_rate: Decimal) -> Self {
        Estimate {
            id: Uuid::new_v4(),
            tenant_id,
            job_id,
            items: Vec::new(),
            tax_rate,
            totals: EstimateTotals::default(),
            locked: false,
            updated_at: Utc::now(),
        }
    }

    pub fn item(&self, item_id: Uuid) -> Option<&EstimateItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}
