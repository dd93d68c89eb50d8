//! Email adapters.

mod tracing_service;

pub use tracing_service::TracingEmailService;
