//! Part lookup and catalog maintenance.

use std::sync::Arc;

use service_core::error::AppError;
use tracing::{info, instrument};
use validator::Validate;

use crate::models::{Part, PartEdit};
use crate::services::store::{duplicate_part, InvoiceStore};

#[derive(Clone)]
pub struct PartCatalog {
    store: Arc<dyn InvoiceStore>,
}

impl PartCatalog {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// A part that is still offered for sale.
    #[instrument(skip(self))]
    pub async fn get_part(&self, part_id: i64) -> Result<Part, AppError> {
        if part_id == 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!("Please provide a part")));
        }
        self.store
            .get_part(part_id)
            .await?
            .filter(|part| !part.removed_from_view)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Part {} not found", part_id)))
    }

    /// Add a part, or overwrite every editable field of an existing one.
    ///
    /// Field rules and the duplicate check are reported together. An edit may
    /// keep its own description but not take another part's.
    #[instrument(skip(self, edit), fields(part_id = ?edit.part_id))]
    pub async fn save_part(&self, edit: PartEdit) -> Result<Part, AppError> {
        let mut errors = match edit.validate() {
            Ok(()) => validator::ValidationErrors::new(),
            Err(errors) => errors,
        };

        if !edit.description.trim().is_empty()
            && self
                .store
                .part_description_taken(edit.part_category_id, &edit.description, edit.part_id)
                .await?
        {
            errors.add("description", duplicate_part());
        }

        if !errors.is_empty() {
            return Err(AppError::ValidationError(errors));
        }

        let part = self.store.save_part(&edit).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Part {} not found",
                edit.part_id.unwrap_or_default()
            ))
        })?;

        info!(part_id = part.part_id, needs_reorder = part.needs_reorder(), "Part saved");

        Ok(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use rust_decimal::Decimal;

    fn edit(description: &str) -> PartEdit {
        PartEdit {
            part_id: None,
            part_category_id: 2,
            description: description.to_string(),
            cost: Decimal::new(500, 2),
            price: Decimal::new(900, 2),
            reorder_level: 3,
            quantity_on_hand: 10,
            taxable: true,
            removed_from_view: false,
        }
    }

    fn catalog() -> PartCatalog {
        PartCatalog::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn part_zero_is_a_bad_request() {
        let err = catalog().get_part(0).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn save_then_get() {
        let catalog = catalog();
        let saved = catalog.save_part(edit("Chain lube")).await.unwrap();
        let fetched = catalog.get_part(saved.part_id).await.unwrap();
        assert_eq!(fetched.description, "Chain lube");
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn removed_part_is_hidden() {
        let catalog = catalog();
        let saved = catalog.save_part(edit("Old filter")).await.unwrap();
        let mut retire = edit("Old filter");
        retire.part_id = Some(saved.part_id);
        retire.removed_from_view = true;
        let retired = catalog.save_part(retire).await.unwrap();
        assert_eq!(retired.version, 2);

        let err = catalog.get_part(saved.part_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn every_violation_is_reported_at_once() {
        let catalog = catalog();
        catalog.save_part(edit("Brake pads")).await.unwrap();

        let bad = PartEdit {
            cost: Decimal::new(-1, 0),
            reorder_level: -4,
            ..edit("  brake PADS ")
        };
        let err = catalog.save_part(bad).await.unwrap_err();
        let AppError::ValidationError(errors) = err else {
            panic!("expected validation errors");
        };
        let messages = AppError::validation_messages(&errors);
        assert_eq!(
            messages,
            vec![
                "Cost cannot be less than zero".to_string(),
                "Part already exists in the catalog and cannot be entered again".to_string(),
                "Reorder level cannot be less than zero".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn edit_cannot_take_another_parts_description() {
        let catalog = catalog();
        catalog.save_part(edit("Brake pads")).await.unwrap();
        let chain = catalog.save_part(edit("Chain")).await.unwrap();

        let mut rename = edit("Brake Pads");
        rename.part_id = Some(chain.part_id);
        let err = catalog.save_part(rename).await.unwrap_err();
        let AppError::ValidationError(errors) = err else {
            panic!("expected validation errors");
        };
        assert_eq!(
            AppError::validation_messages(&errors),
            vec!["Part already exists in the catalog and cannot be entered again".to_string()]
        );
        assert_eq!(catalog.get_part(chain.part_id).await.unwrap().description, "Chain");

        let mut keep_name = edit("Chain");
        keep_name.part_id = Some(chain.part_id);
        keep_name.price = Decimal::new(1100, 2);
        let repriced = catalog.save_part(keep_name).await.unwrap();
        assert_eq!(repriced.version, 2);
    }

    #[tokio::test]
    async fn store_rejects_a_duplicate_that_slips_past_the_check() {
        let store = MemoryStore::new();
        store.save_part(&edit("Brake pads")).await.unwrap();
        let err = store.save_part(&edit(" brake pads")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn editing_unknown_part_is_not_found() {
        let mut missing = edit("Ghost");
        missing.part_id = Some(404);
        let err = catalog().save_part(missing).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
