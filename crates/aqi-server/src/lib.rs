//! AirSight AQI server
//!
//! Loads the model archive once and serves the prediction core to the
//! dashboard over HTTP, together with a Prometheus scrape endpoint.

pub mod api;
pub mod config;
