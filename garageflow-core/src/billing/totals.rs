use rust_decimal::Decimal;

use crate::error::{GarageError, Result};
use crate::models::{EstimateItem, EstimateItemInput, EstimateTotals};

/// Standard GST rate applied when a tenant has not configured its own.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Checks a line item against the estimate input contract.
pub fn validate_item(item: &EstimateItemInput) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(GarageError::InvalidItem("item name is empty".to_string()));
    }
    if item.quantity < 1 {
        return Err(GarageError::InvalidItem(format!(
            "quantity must be at least 1, got {}",
            item.quantity
        )));
    }
    if item.unit_price < Decimal::ZERO {
        return Err(GarageError::InvalidItem(format!(
            "unit price must not be negative, got {}",
            item.unit_price
        )));
    }
    if item.labor_cost < Decimal::ZERO {
        return Err(GarageError::InvalidItem(format!(
            "labor cost must not be negative, got {}",
            item.labor_cost
        )));
    }
    Ok(())
}

fn validate_rate(tax_rate: Decimal) -> Result<()> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
        return Err(GarageError::InvalidTaxRate(tax_rate));
    }
    Ok(())
}

/// Aggregates estimate lines into parts, labor, tax and total.
///
/// Pure: nothing is rounded here. Callers round once, via
/// [`EstimateTotals::rounded`], when the figures are persisted.
pub fn compute_totals(items: &[EstimateItem], tax_rate: Decimal) -> Result<EstimateTotals> {
    validate_rate(tax_rate)?;

    let mut parts_total = Decimal::ZERO;
    let mut labor_total = Decimal::ZERO;

    for item in items {
        if item.quantity < 1 {
            return Err(GarageError::InvalidItem(format!(
                "item {} has quantity {}",
                item.id, item.quantity
            )));
        }
        if item.unit_price < Decimal::ZERO || item.labor_cost < Decimal::ZERO {
            return Err(GarageError::InvalidItem(format!(
                "item {} has a negative amount",
                item.id
            )));
        }
        parts_total += Decimal::from(item.quantity) * item.unit_price;
        labor_total += item.labor_cost;
    }

    let tax_amount = (parts_total + labor_total) * tax_rate;

    Ok(EstimateTotals {
        parts_total,
        labor_total,
        tax_amount,
        total_amount: parts_total + labor_total + tax_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(quantity: i32, unit_price: &str, labor_cost: &str) -> EstimateItem {
        EstimateItem {
            id: Uuid::new_v4(),
            estimate_id: Uuid::nil(),
            name: "Oil filter".to_string(),
            part_number: None,
            quantity,
            unit_price: d(unit_price),
            labor_cost: d(labor_cost),
        }
    }

    #[test]
    fn test_default_tax_rate_is_eighteen_percent() {
        assert_eq!(DEFAULT_TAX_RATE, d("0.18"));
    }

    #[test]
    fn test_single_item_totals() {
        let totals = compute_totals(&[item(2, "100", "50")], DEFAULT_TAX_RATE).unwrap();
        assert_eq!(totals.parts_total, d("200"));
        assert_eq!(totals.labor_total, d("50"));
        assert_eq!(totals.tax_amount, d("45"));
        assert_eq!(totals.total_amount, d("295"));
    }

    #[test]
    fn test_empty_estimate_is_zero() {
        let totals = compute_totals(&[], DEFAULT_TAX_RATE).unwrap();
        assert_eq!(totals, EstimateTotals::default());
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let items = vec![
            item(3, "19.99", "0"),
            item(1, "0.335", "12.5"),
            item(7, "4.01", "3.333"),
        ];
        let first = compute_totals(&items, DEFAULT_TAX_RATE).unwrap();
        let second = compute_totals(&items, DEFAULT_TAX_RATE).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.rounded(), second.rounded());
    }

    #[test]
    fn test_rounding_happens_once() {
        // Rounding each line to 2dp would give 0.34 * 3 = 1.02.
        let totals = compute_totals(&[item(3, "0.335", "0")], Decimal::ZERO).unwrap();
        assert_eq!(totals.parts_total, d("1.005"));
        assert_eq!(totals.rounded().parts_total, d("1.01"));
    }

    #[test]
    fn test_custom_tax_rate() {
        let totals = compute_totals(&[item(1, "1000", "0")], d("0.05")).unwrap();
        assert_eq!(totals.tax_amount, d("50"));
        assert_eq!(totals.total_amount, d("1050"));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let err = compute_totals(&[item(0, "10", "0")], DEFAULT_TAX_RATE).unwrap_err();
        assert!(matches!(err, GarageError::InvalidItem(_)));
    }

    #[test]
    fn test_negative_quantity_is_not_coerced() {
        let err = compute_totals(&[item(-2, "10", "0")], DEFAULT_TAX_RATE).unwrap_err();
        assert!(matches!(err, GarageError::InvalidItem(_)));
    }

    #[test]
    fn test_out_of_range_rate_is_rejected() {
        for rate in ["-0.1", "1.5"] {
            let err = compute_totals(&[], d(rate)).unwrap_err();
            assert!(matches!(err, GarageError::InvalidTaxRate(r) if r == d(rate)));
        }
        assert!(compute_totals(&[], Decimal::ONE).is_ok());
    }

    #[test]
    fn test_validate_item_input() {
        let mut input = EstimateItemInput {
            name: "Spark plug".to_string(),
            part_number: Some("SP-9".to_string()),
            quantity: 4,
            unit_price: d("120"),
            labor_cost: d("0"),
        };
        assert!(validate_item(&input).is_ok());

        input.labor_cost = d("-1");
        assert!(validate_item(&input).is_err());

        input.labor_cost = d("0");
        input.name = "  ".to_string();
        assert!(validate_item(&input).is_err());
    }
}
