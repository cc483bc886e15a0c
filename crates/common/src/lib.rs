//! Shared configuration, error taxonomy and audit plumbing for Gatehouse.

pub mod audit;
pub mod config;
pub mod error;

pub use audit::{AuditEvent, AuditLog, AuditOutcome, AuditSink};
pub use config::*;
pub use error::{GatewayError, GatewayResult};
