//! Invoice save/open integration tests for parts-invoicing-service.

mod common;

use common::{part, spawn_app, CUSTOMER_ID, EMPLOYEE_ID};
use parts_invoicing_service::grpc::proto::{
    GetInvoiceRequest, Invoice, InvoiceLine, ListCustomerInvoicesRequest, SaveInvoiceRequest,
};

fn new_line(part_id: i64, quantity: i32, price: &str) -> InvoiceLine {
    InvoiceLine {
        part_id,
        quantity,
        price: price.to_string(),
        ..Default::default()
    }
}

fn new_invoice(lines: Vec<InvoiceLine>) -> Invoice {
    Invoice {
        invoice_date: "2026-05-01".to_string(),
        customer_id: CUSTOMER_ID,
        employee_id: EMPLOYEE_ID,
        lines,
        ..Default::default()
    }
}

#[tokio::test]
async fn save_new_invoice_sells_stock() {
    let (mut app, store) = spawn_app(vec![part(10, "Spark plug", 20, false)]).await;

    let invoice_id = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(new_invoice(vec![new_line(10, 3, "2.00")])),
        })
        .await
        .expect("Failed to save invoice")
        .into_inner()
        .invoice_id;

    let invoice = app
        .grpc_client
        .get_invoice(GetInvoiceRequest {
            invoice_id,
            ..Default::default()
        })
        .await
        .expect("Failed to get invoice")
        .into_inner()
        .invoice
        .expect("Missing invoice");

    assert_eq!(invoice.sub_total, "6");
    assert_eq!(invoice.tax, "0");
    assert_eq!(invoice.total, "6");
    assert_eq!(invoice.customer_name, "Ada Lovelace");
    assert_eq!(invoice.lines.len(), 1);
    assert_eq!(invoice.lines[0].description, "Spark plug");
    assert_eq!(invoice.lines[0].extended_price, "6");
    assert_eq!(store.part(10).await.unwrap().quantity_on_hand, 17);
}

#[tokio::test]
async fn edit_round_trip_reconciles_stock() {
    let (mut app, store) = spawn_app(vec![
        part(10, "Spark plug", 20, true),
        part(11, "Oil filter", 6, false),
    ])
    .await;

    let invoice_id = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(new_invoice(vec![
                new_line(10, 3, "2.00"),
                new_line(11, 4, "1.50"),
            ])),
        })
        .await
        .expect("Failed to save invoice")
        .into_inner()
        .invoice_id;

    let mut invoice = app
        .grpc_client
        .get_invoice(GetInvoiceRequest {
            invoice_id,
            ..Default::default()
        })
        .await
        .expect("Failed to get invoice")
        .into_inner()
        .invoice
        .expect("Missing invoice");

    // 3 -> 5 spark plugs, oil filter line dropped
    invoice.lines.retain(|line| line.part_id == 10);
    invoice.lines[0].quantity = 5;
    app.grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(invoice),
        })
        .await
        .expect("Failed to save edit");

    assert_eq!(store.part(10).await.unwrap().quantity_on_hand, 15);
    assert_eq!(store.part(11).await.unwrap().quantity_on_hand, 6);

    let reopened = app
        .grpc_client
        .get_invoice(GetInvoiceRequest {
            invoice_id,
            ..Default::default()
        })
        .await
        .expect("Failed to get invoice")
        .into_inner()
        .invoice
        .expect("Missing invoice");
    assert_eq!(reopened.sub_total, "10");
    assert_eq!(reopened.tax, "0.5");
    assert_eq!(reopened.lines.len(), 1);
}

#[tokio::test]
async fn missing_invoice_is_invalid_argument() {
    let (mut app, _) = spawn_app(vec![]).await;

    let status = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest { invoice: None })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("No invoice was supplied"));
}

#[tokio::test]
async fn every_violation_is_returned() {
    let (mut app, store) = spawn_app(vec![part(10, "Spark plug", 20, false)]).await;

    let mut invoice = new_invoice(vec![new_line(10, 0, "2.00"), new_line(10, -1, "2.00")]);
    invoice.employee_id = 0;

    let status = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(invoice),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("No employee was provided"));
    assert_eq!(status.message().matches("quantity less than 1").count(), 2);
    assert_eq!(store.part(10).await.unwrap().quantity_on_hand, 20);
}

#[tokio::test]
async fn unknown_line_is_failed_precondition() {
    let (mut app, store) = spawn_app(vec![part(10, "Spark plug", 20, false)]).await;

    let invoice_id = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(new_invoice(vec![new_line(10, 2, "2.00")])),
        })
        .await
        .expect("Failed to save invoice")
        .into_inner()
        .invoice_id;

    let mut ghost = new_line(10, 1, "2.00");
    ghost.invoice_line_id = 999;
    let mut invoice = new_invoice(vec![ghost]);
    invoice.invoice_id = invoice_id;

    let status = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(invoice),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    assert_eq!(store.part(10).await.unwrap().quantity_on_hand, 18);
    assert_eq!(store.lines(invoice_id).await.len(), 1);
}

#[tokio::test]
async fn overselling_is_failed_precondition() {
    let (mut app, store) = spawn_app(vec![part(10, "Spark plug", 2, false)]).await;

    let status = app
        .grpc_client
        .save_invoice(SaveInvoiceRequest {
            invoice: Some(new_invoice(vec![new_line(10, 3, "2.00")])),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    assert!(status.message().contains("Spark plug"));
    assert_eq!(store.part(10).await.unwrap().quantity_on_hand, 2);
}

#[tokio::test]
async fn blank_invoice_for_customer() {
    let (mut app, _) = spawn_app(vec![]).await;

    let invoice = app
        .grpc_client
        .get_invoice(GetInvoiceRequest {
            invoice_id: 0,
            customer_id: CUSTOMER_ID,
            employee_id: EMPLOYEE_ID,
        })
        .await
        .expect("Failed to open invoice")
        .into_inner()
        .invoice
        .expect("Missing invoice");

    assert_eq!(invoice.invoice_id, 0);
    assert_eq!(invoice.customer_name, "Ada Lovelace");
    assert_eq!(invoice.employee_name, "Charles Babbage");
    assert!(invoice.lines.is_empty());
    assert!(!invoice.invoice_date.is_empty());
}

#[tokio::test]
async fn unknown_invoice_is_not_found() {
    let (mut app, _) = spawn_app(vec![]).await;

    let status = app
        .grpc_client
        .get_invoice(GetInvoiceRequest {
            invoice_id: 404,
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn customer_history_lists_saved_invoices() {
    let (mut app, _) = spawn_app(vec![part(10, "Spark plug", 20, true)]).await;

    for quantity in [1, 2] {
        app.grpc_client
            .save_invoice(SaveInvoiceRequest {
                invoice: Some(new_invoice(vec![new_line(10, quantity, "10.00")])),
            })
            .await
            .expect("Failed to save invoice");
    }

    let invoices = app
        .grpc_client
        .list_customer_invoices(ListCustomerInvoicesRequest {
            customer_id: CUSTOMER_ID,
        })
        .await
        .expect("Failed to list invoices")
        .into_inner()
        .invoices;

    assert_eq!(invoices.len(), 2);
    assert_eq!(invoices[0].total, "10.5");
    assert_eq!(invoices[1].total, "21");
    assert!(invoices[0].invoice_id < invoices[1].invoice_id);
}
