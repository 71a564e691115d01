//! Common test utilities for parts-invoicing-service integration tests.

#![allow(dead_code)]

use parts_invoicing_service::config::{DatabaseConfig, InvoicingConfig, StoreBackend};
use parts_invoicing_service::grpc::proto::invoicing_service_client::InvoicingServiceClient;
use parts_invoicing_service::models::{Customer, Employee, Part};
use parts_invoicing_service::services::{Database, InvoiceStore, MemoryStore};
use parts_invoicing_service::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use tonic::transport::Channel;

static INIT: Once = Once::new();

pub const CUSTOMER_ID: i64 = 5;
pub const EMPLOYEE_ID: i64 = 1;

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,parts_invoicing_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(store_backend: StoreBackend, database: Option<DatabaseConfig>) -> InvoicingConfig {
    InvoicingConfig {
        common: CommonConfig { port: 0 },
        service_name: "parts-invoicing-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store_backend,
        database,
        tax_rate: Decimal::new(5, 2),
    }
}

pub fn part(part_id: i64, description: &str, quantity_on_hand: i32, taxable: bool) -> Part {
    Part {
        part_id,
        part_category_id: 1,
        description: description.to_string(),
        cost: Decimal::new(100, 2),
        price: Decimal::new(200, 2),
        reorder_level: 2,
        quantity_on_hand,
        taxable,
        removed_from_view: false,
        version: 1,
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub grpc_client: InvoicingServiceClient<Channel>,
    pub http_port: u16,
    pub grpc_port: u16,
}

async fn spawn(config: InvoicingConfig, store: Arc<dyn InvoiceStore>) -> TestApp {
    let app = Application::build_with_store(config, store)
        .await
        .expect("Failed to build application");

    let http_port = app.http_port();
    let grpc_port = app.grpc_port();
    let grpc_addr = format!("http://127.0.0.1:{}", grpc_port);

    // Start the application in the background
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    // Wait for server to be ready with retry
    let grpc_client = {
        let mut attempts = 0;
        loop {
            match InvoicingServiceClient::connect(grpc_addr.clone()).await {
                Ok(client) => break client,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
                Err(e) => panic!("Failed to connect gRPC client after 20 attempts: {}", e),
            }
        }
    };

    TestApp {
        grpc_client,
        http_port,
        grpc_port,
    }
}

/// Spawn against an in-memory store seeded with one customer, one employee
/// and the given parts.
pub async fn spawn_app(parts: Vec<Part>) -> (TestApp, Arc<MemoryStore>) {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    store
        .insert_customer(Customer {
            customer_id: CUSTOMER_ID,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        })
        .await;
    store
        .insert_employee(Employee {
            employee_id: EMPLOYEE_ID,
            first_name: "Charles".to_string(),
            last_name: "Babbage".to_string(),
        })
        .await;
    for part in parts {
        store.insert_part(part).await;
    }

    let app = spawn(test_config(StoreBackend::Memory, None), store.clone()).await;
    (app, store)
}

/// IDs seeded into PostgreSQL for one test.
pub struct Seeded {
    pub customer_id: i64,
    pub employee_id: i64,
    pub part_ids: Vec<i64>,
}

/// Spawn against PostgreSQL at `TEST_DATABASE_URL`, seeding fresh rows.
///
/// `parts` are `(quantity_on_hand, taxable)` pairs.
pub async fn spawn_pg_app(parts: &[(i32, bool)]) -> (TestApp, Arc<Database>, Seeded) {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");
    let database = DatabaseConfig {
        url: database_url,
        max_connections: 4,
        min_connections: 1,
    };

    let db = Database::new(&database.url, database.max_connections, database.min_connections)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    let customer_id: i64 = sqlx::query_scalar(
        "INSERT INTO customers (first_name, last_name) VALUES ('Ada', 'Lovelace') RETURNING customer_id",
    )
    .fetch_one(db.pool())
    .await
    .expect("Failed to seed customer");
    let employee_id: i64 = sqlx::query_scalar(
        "INSERT INTO employees (first_name, last_name) VALUES ('Charles', 'Babbage') RETURNING employee_id",
    )
    .fetch_one(db.pool())
    .await
    .expect("Failed to seed employee");

    let mut part_ids = Vec::new();
    for &(quantity_on_hand, taxable) in parts {
        let part_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO parts (part_category_id, description, cost, price, reorder_level, quantity_on_hand, taxable)
            VALUES (1, $1, 1.00, 2.00, 2, $2, $3)
            RETURNING part_id
            "#,
        )
        .bind(format!("Test part {}", uuid::Uuid::new_v4()))
        .bind(quantity_on_hand)
        .bind(taxable)
        .fetch_one(db.pool())
        .await
        .expect("Failed to seed part");
        part_ids.push(part_id);
    }

    let db = Arc::new(db);
    let app = spawn(
        test_config(StoreBackend::Postgres, Some(database)),
        db.clone(),
    )
    .await;

    (
        app,
        db,
        Seeded {
            customer_id,
            employee_id,
            part_ids,
        },
    )
}
