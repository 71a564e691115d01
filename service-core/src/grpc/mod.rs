//! gRPC utilities shared by the service crates.
//!
//! - Error conversion between `AppError` and `tonic::Status`
//! - Interceptors for inbound trace context

pub mod error;
pub mod interceptors;

pub use error::{GrpcResult, IntoStatus};
pub use interceptors::{
    REQUEST_ID_KEY, TRACEPARENT_KEY, extract_request_id, extract_traceparent,
    trace_context_interceptor,
};

// Re-export commonly used tonic types
pub use tonic::{Code, Request, Response, Status};
