//! Services module for parts-invoicing-service.

pub mod database;
pub mod invoice_service;
pub mod memory_store;
pub mod metrics;
pub mod part_catalog;
pub mod reconciler;
pub mod store;

pub use database::Database;
pub use invoice_service::InvoiceService;
pub use memory_store::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use part_catalog::PartCatalog;
pub use store::InvoiceStore;
