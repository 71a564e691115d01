//! Parts Invoicing Service - Invoices for a parts counter with stock reconciliation.

pub mod config;
pub mod error;
pub mod grpc;
pub mod models;
pub mod services;
pub mod startup;
