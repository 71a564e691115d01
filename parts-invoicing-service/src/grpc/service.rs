//! InvoicingService gRPC implementation.

use crate::grpc::proto::{
    invoicing_service_server::InvoicingService, GetInvoiceRequest, GetInvoiceResponse,
    GetPartRequest, GetPartResponse, Invoice as ProtoInvoice, InvoiceLine as ProtoInvoiceLine,
    InvoiceSummary as ProtoInvoiceSummary, ListCustomerInvoicesRequest,
    ListCustomerInvoicesResponse, Part as ProtoPart, SaveInvoiceRequest, SaveInvoiceResponse,
    SavePartRequest, SavePartResponse,
};
use crate::models::{
    InvoiceDraft, InvoiceLineDraft, InvoiceLineView, InvoiceSummary, InvoiceView, Part, PartEdit,
};
use crate::services::metrics::{ERRORS_TOTAL, GRPC_REQUESTS_TOTAL, GRPC_REQUEST_DURATION};
use crate::services::{InvoiceService, PartCatalog};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::grpc::IntoStatus;
use std::str::FromStr;
use std::sync::Arc;
use tonic::{Code, Request, Response, Status};
use tracing::{info, instrument, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a Decimal as a normalized string.
fn format_decimal(d: &Decimal) -> String {
    let s = d.to_string();
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Parse a money field; an empty string is zero.
fn parse_decimal(field: &str, value: &str) -> Result<Decimal, Status> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(value)
        .map_err(|_| Status::invalid_argument(format!("Invalid {} '{}'", field, value)))
}

/// Parse a `YYYY-MM-DD` date; an empty string is today.
fn parse_date(value: &str) -> Result<NaiveDate, Status> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Utc::now().date_naive());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| Status::invalid_argument(format!("Invalid invoice_date '{}'", value)))
}

fn optional_id(id: i64) -> Option<i64> {
    (id != 0).then_some(id)
}

/// Metric label for a failed call.
fn status_label(status: &Status) -> &'static str {
    match status.code() {
        Code::InvalidArgument => "invalid_argument",
        Code::NotFound => "not_found",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::AlreadyExists => "already_exists",
        _ => "error",
    }
}

fn draft_from_proto(invoice: ProtoInvoice) -> Result<InvoiceDraft, Status> {
    let lines = invoice
        .lines
        .into_iter()
        .map(|line| {
            Ok(InvoiceLineDraft {
                invoice_line_id: optional_id(line.invoice_line_id),
                part_id: line.part_id,
                description: line.description,
                quantity: line.quantity,
                price: parse_decimal("price", &line.price)?,
                removed_from_view: line.removed_from_view,
            })
        })
        .collect::<Result<Vec<_>, Status>>()?;

    Ok(InvoiceDraft {
        invoice_id: optional_id(invoice.invoice_id),
        invoice_date: parse_date(&invoice.invoice_date)?,
        customer_id: invoice.customer_id,
        employee_id: invoice.employee_id,
        lines,
    })
}

fn line_to_proto(line: &InvoiceLineView) -> ProtoInvoiceLine {
    ProtoInvoiceLine {
        invoice_line_id: line.invoice_line_id,
        invoice_id: line.invoice_id,
        part_id: line.part_id,
        description: line.description.clone(),
        quantity: line.quantity,
        price: format_decimal(&line.price),
        taxable: line.taxable,
        extended_price: format_decimal(&line.extended_price()),
        removed_from_view: line.removed_from_view,
    }
}

fn invoice_to_proto(view: &InvoiceView) -> ProtoInvoice {
    ProtoInvoice {
        invoice_id: view.invoice_id.unwrap_or(0),
        invoice_date: view.invoice_date.format(DATE_FORMAT).to_string(),
        customer_id: view.customer_id,
        customer_name: view.customer_name.clone(),
        employee_id: view.employee_id,
        employee_name: view.employee_name.clone(),
        sub_total: format_decimal(&view.sub_total),
        tax: format_decimal(&view.tax),
        total: format_decimal(&view.total()),
        lines: view.lines.iter().map(line_to_proto).collect(),
    }
}

fn summary_to_proto(summary: &InvoiceSummary) -> ProtoInvoiceSummary {
    ProtoInvoiceSummary {
        invoice_id: summary.invoice_id,
        invoice_date: summary.invoice_date.format(DATE_FORMAT).to_string(),
        sub_total: format_decimal(&summary.sub_total),
        tax: format_decimal(&summary.tax),
        total: format_decimal(&summary.total()),
    }
}

fn part_to_proto(part: &Part) -> ProtoPart {
    ProtoPart {
        part_id: part.part_id,
        part_category_id: part.part_category_id,
        description: part.description.clone(),
        cost: format_decimal(&part.cost),
        price: format_decimal(&part.price),
        reorder_level: part.reorder_level,
        quantity_on_hand: part.quantity_on_hand,
        taxable: part.taxable,
        removed_from_view: part.removed_from_view,
    }
}

fn part_edit_from_proto(part: ProtoPart) -> Result<PartEdit, Status> {
    Ok(PartEdit {
        part_id: optional_id(part.part_id),
        part_category_id: part.part_category_id,
        description: part.description,
        cost: parse_decimal("cost", &part.cost)?,
        price: parse_decimal("price", &part.price)?,
        reorder_level: part.reorder_level,
        quantity_on_hand: part.quantity_on_hand,
        taxable: part.taxable,
        removed_from_view: part.removed_from_view,
    })
}

/// InvoicingService implementation.
pub struct InvoicingServiceImpl {
    invoices: Arc<InvoiceService>,
    catalog: Arc<PartCatalog>,
}

impl InvoicingServiceImpl {
    /// Create a new InvoicingService instance.
    pub fn new(invoices: Arc<InvoiceService>, catalog: Arc<PartCatalog>) -> Self {
        Self { invoices, catalog }
    }

    fn fail(method: &str, status: Status) -> Status {
        GRPC_REQUESTS_TOTAL
            .with_label_values(&[method, status_label(&status)])
            .inc();
        status
    }

    fn ok(method: &str) {
        GRPC_REQUESTS_TOTAL.with_label_values(&[method, "ok"]).inc();
    }
}

#[tonic::async_trait]
impl InvoicingService for InvoicingServiceImpl {
    #[instrument(skip(self, request))]
    async fn save_invoice(
        &self,
        request: Request<SaveInvoiceRequest>,
    ) -> Result<Response<SaveInvoiceResponse>, Status> {
        let timer = GRPC_REQUEST_DURATION
            .with_label_values(&["SaveInvoice"])
            .start_timer();
        let req = request.into_inner();

        let draft = req
            .invoice
            .map(draft_from_proto)
            .transpose()
            .map_err(|status| Self::fail("SaveInvoice", status))?;

        let invoice_id = self
            .invoices
            .save_invoice(draft)
            .await
            .map_err(|e| Self::fail("SaveInvoice", e.into()))?;

        timer.observe_duration();
        Self::ok("SaveInvoice");

        Ok(Response::new(SaveInvoiceResponse { invoice_id }))
    }

    #[instrument(skip(self, request))]
    async fn get_invoice(
        &self,
        request: Request<GetInvoiceRequest>,
    ) -> Result<Response<GetInvoiceResponse>, Status> {
        let timer = GRPC_REQUEST_DURATION
            .with_label_values(&["GetInvoice"])
            .start_timer();
        let req = request.into_inner();

        let view = self
            .invoices
            .open_invoice(
                optional_id(req.invoice_id),
                optional_id(req.customer_id),
                optional_id(req.employee_id),
            )
            .await
            .map_err(|e| Self::fail("GetInvoice", e.into_status()))?;

        timer.observe_duration();
        Self::ok("GetInvoice");

        Ok(Response::new(GetInvoiceResponse {
            invoice: Some(invoice_to_proto(&view)),
        }))
    }

    #[instrument(skip(self, request))]
    async fn list_customer_invoices(
        &self,
        request: Request<ListCustomerInvoicesRequest>,
    ) -> Result<Response<ListCustomerInvoicesResponse>, Status> {
        let timer = GRPC_REQUEST_DURATION
            .with_label_values(&["ListCustomerInvoices"])
            .start_timer();
        let req = request.into_inner();

        let invoices = self
            .invoices
            .customer_invoices(req.customer_id)
            .await
            .map_err(|e| Self::fail("ListCustomerInvoices", e.into_status()))?;

        timer.observe_duration();
        Self::ok("ListCustomerInvoices");

        Ok(Response::new(ListCustomerInvoicesResponse {
            invoices: invoices.iter().map(summary_to_proto).collect(),
        }))
    }

    #[instrument(skip(self, request))]
    async fn get_part(
        &self,
        request: Request<GetPartRequest>,
    ) -> Result<Response<GetPartResponse>, Status> {
        let timer = GRPC_REQUEST_DURATION
            .with_label_values(&["GetPart"])
            .start_timer();
        let req = request.into_inner();

        let part = self
            .catalog
            .get_part(req.part_id)
            .await
            .map_err(|e| Self::fail("GetPart", e.into_status()))?;

        timer.observe_duration();
        Self::ok("GetPart");

        Ok(Response::new(GetPartResponse {
            part: Some(part_to_proto(&part)),
        }))
    }

    #[instrument(skip(self, request))]
    async fn save_part(
        &self,
        request: Request<SavePartRequest>,
    ) -> Result<Response<SavePartResponse>, Status> {
        let timer = GRPC_REQUEST_DURATION
            .with_label_values(&["SavePart"])
            .start_timer();
        let req = request.into_inner();

        let edit = req
            .part
            .ok_or_else(|| Status::invalid_argument("No part was supplied"))
            .and_then(part_edit_from_proto)
            .map_err(|status| Self::fail("SavePart", status))?;

        let part = self.catalog.save_part(edit).await.map_err(|e| {
            warn!(error = %e, "Failed to save part");
            ERRORS_TOTAL.with_label_values(&["save_part"]).inc();
            Self::fail("SavePart", e.into_status())
        })?;

        timer.observe_duration();
        Self::ok("SavePart");
        info!(part_id = part.part_id, "Part saved via gRPC");

        Ok(Response::new(SavePartResponse {
            part: Some(part_to_proto(&part)),
        }))
    }
}
