//! Part catalog integration tests for parts-invoicing-service.

mod common;

use common::{part, spawn_app};
use parts_invoicing_service::grpc::proto::{GetPartRequest, Part, SavePartRequest};

fn part_input(description: &str) -> Part {
    Part {
        part_category_id: 3,
        description: description.to_string(),
        cost: "12.50".to_string(),
        price: "24.99".to_string(),
        reorder_level: 5,
        quantity_on_hand: 12,
        taxable: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn save_and_get_part() {
    let (mut app, _) = spawn_app(vec![]).await;

    let saved = app
        .grpc_client
        .save_part(SavePartRequest {
            part: Some(part_input("Brake pads")),
        })
        .await
        .expect("Failed to save part")
        .into_inner()
        .part
        .expect("Missing part");
    assert!(saved.part_id > 0);

    let fetched = app
        .grpc_client
        .get_part(GetPartRequest {
            part_id: saved.part_id,
        })
        .await
        .expect("Failed to get part")
        .into_inner()
        .part
        .expect("Missing part");

    assert_eq!(fetched.description, "Brake pads");
    assert_eq!(fetched.price, "24.99");
    assert_eq!(fetched.cost, "12.5");
}

#[tokio::test]
async fn part_zero_is_invalid_argument() {
    let (mut app, _) = spawn_app(vec![]).await;

    let status = app
        .grpc_client
        .get_part(GetPartRequest { part_id: 0 })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn removed_part_is_not_found() {
    let mut retired = part(10, "Carburetor", 3, false);
    retired.removed_from_view = true;
    let (mut app, _) = spawn_app(vec![retired]).await;

    let status = app
        .grpc_client
        .get_part(GetPartRequest { part_id: 10 })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn invalid_part_reports_all_rules() {
    let (mut app, _) = spawn_app(vec![]).await;

    let status = app
        .grpc_client
        .save_part(SavePartRequest {
            part: Some(Part {
                part_category_id: 0,
                description: " ".to_string(),
                cost: "-1".to_string(),
                quantity_on_hand: -3,
                ..part_input("")
            }),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    for expected in [
        "Part category is required",
        "Description is required",
        "Cost cannot be less than zero",
        "Quantity on hand cannot be less than zero",
    ] {
        assert!(
            status.message().contains(expected),
            "missing '{}' in '{}'",
            expected,
            status.message()
        );
    }
}
