//! Domain models for parts-invoicing-service.

mod invoice;
mod invoice_line;
mod part;
mod people;

pub use invoice::{Invoice, InvoiceDraft, InvoiceSummary, InvoiceView};
pub use invoice_line::{InvoiceLine, InvoiceLineDraft, InvoiceLineView};
pub use part::{Part, PartEdit};
pub use people::{Customer, Employee};
