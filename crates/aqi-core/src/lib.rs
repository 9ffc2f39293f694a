//! Prediction core for the AirSight AQI dashboard
//!
//! This crate provides:
//! - A cascading loader that normalizes several model archive layouts
//! - Feature rows rebuilt in the exact column order models were trained on
//! - Model invocation with a calendar-feature retry and simulation fallback
//! - A deterministic, per-call seeded simulation engine
//! - AQI breakpoint interpolation and category classification
//! - Prometheus metrics and structured logging

pub mod breakpoints;
pub mod error;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod service;
pub mod simulation;

pub use breakpoints::{aqi_from_concentration, concentration_from_aqi, sub_index, AqiCategory};
pub use error::{CoreError, ModelError, Result};
pub use models::*;
pub use observability::{CoreMetrics, StructuredLogger};
pub use registry::{ArchiveLayout, ModelRegistry, RegistryLoader};
pub use service::{AqiSystem, ModelSummary};
pub use simulation::series::Granularity;
pub use simulation::SimulationEngine;
