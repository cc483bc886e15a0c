//! The Gatehouse API gateway: a Pingora reverse proxy that rate-limits,
//! routes by path prefix, discovers and balances endpoints, and enforces
//! bearer-token policies before forwarding.

pub mod config;
pub mod context;
pub mod forward;
pub mod gateway;
pub mod service;
pub mod upstream;

pub use gateway::{Gateway, InboundRequest, ProxyTarget, GATEWAY_SERVICE};
pub use service::GatewayProxy;
pub use upstream::LoadBalancer;
