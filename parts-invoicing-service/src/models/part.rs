//! Part catalog model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// A catalog part with its stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Part {
    pub part_id: i64,
    pub part_category_id: i64,
    pub description: String,
    pub cost: Decimal,
    pub price: Decimal,
    pub reorder_level: i32,
    pub quantity_on_hand: i32,
    pub taxable: bool,
    pub removed_from_view: bool,
    pub version: i64,
}

impl Part {
    /// True when stock has fallen to or below the reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.quantity_on_hand <= self.reorder_level
    }
}

/// Input for adding or editing a catalog part.
///
/// `part_id` of `None` adds a new part.
#[derive(Debug, Clone, Validate)]
pub struct PartEdit {
    pub part_id: Option<i64>,
    #[validate(range(min = 1, message = "Part category is required"))]
    pub part_category_id: i64,
    #[validate(custom(function = "not_blank", message = "Description is required"))]
    pub description: String,
    #[validate(custom(function = "non_negative", message = "Cost cannot be less than zero"))]
    pub cost: Decimal,
    #[validate(custom(function = "non_negative", message = "Price cannot be less than zero"))]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Reorder level cannot be less than zero"))]
    pub reorder_level: i32,
    #[validate(range(min = 0, message = "Quantity on hand cannot be less than zero"))]
    pub quantity_on_hand: i32,
    pub taxable: bool,
    pub removed_from_view: bool,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_edit() -> PartEdit {
        PartEdit {
            part_id: None,
            part_category_id: 3,
            description: "Brake pads".to_string(),
            cost: Decimal::new(1250, 2),
            price: Decimal::new(2499, 2),
            reorder_level: 5,
            quantity_on_hand: 12,
            taxable: true,
            removed_from_view: false,
        }
    }

    #[test]
    fn valid_edit_passes() {
        assert!(valid_edit().validate().is_ok());
    }

    #[test]
    fn every_field_rule_is_reported() {
        let edit = PartEdit {
            part_category_id: 0,
            description: "   ".to_string(),
            cost: Decimal::new(-1, 0),
            price: Decimal::new(-5, 1),
            reorder_level: -1,
            quantity_on_hand: -2,
            ..valid_edit()
        };

        let errors = edit.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn needs_reorder_at_threshold() {
        let part = Part {
            part_id: 1,
            part_category_id: 1,
            description: "Chain".to_string(),
            cost: Decimal::ONE,
            price: Decimal::TWO,
            reorder_level: 4,
            quantity_on_hand: 4,
            taxable: false,
            removed_from_view: false,
            version: 1,
        };
        assert!(part.needs_reorder());
    }
}
