//! Pulseboard Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait all Pulseboard services implement
//! - The snapshot data model (summaries, time series, windows)
//! - The WebSocket wire protocol shared by server and SDK
//! - Error handling utilities and the cooperative shutdown signal

pub mod domain;
pub mod error;
pub mod service;
pub mod shutdown;
pub mod wire;

pub use domain::*;
pub use error::{PulseboardError, Result};
pub use service::{DependencyStatus, HealthStatus, PulseboardService, ReadinessStatus, ServiceRuntime};
pub use shutdown::ShutdownSignal;
pub use wire::{ClientMessage, FeedMessage};
