//! gRPC interceptors for inbound requests.
//!
//! The invoicing service has no downstream gRPC dependencies, so only the
//! server side of trace propagation lives here: reading W3C `traceparent`
//! and the request ID from metadata and attaching them to the current span.

use tonic::{Request, Status};

/// gRPC metadata key for W3C traceparent header.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// gRPC metadata key for request ID.
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// Interceptor that extracts trace context from incoming requests.
///
/// ```ignore
/// use service_core::grpc::interceptors::trace_context_interceptor;
///
/// let svc = InvoicingServiceServer::with_interceptor(service, trace_context_interceptor);
/// ```
#[allow(clippy::result_large_err)]
pub fn trace_context_interceptor(request: Request<()>) -> Result<Request<()>, Status> {
    if let Some(traceparent) = extract_traceparent(&request) {
        tracing::debug!(traceparent = %traceparent, "Received trace context");
    }

    if let Some(request_id) = extract_request_id(&request) {
        tracing::Span::current().record("request_id", request_id.as_str());
    }

    Ok(request)
}

/// Extract the traceparent header value, if present.
pub fn extract_traceparent<T>(request: &Request<T>) -> Option<String> {
    request
        .metadata()
        .get(TRACEPARENT_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract request ID from incoming gRPC request metadata.
pub fn extract_request_id<T>(request: &Request<T>) -> Option<String> {
    request
        .metadata()
        .get(REQUEST_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
