//! Watches an object store prefix for USDZ uploads, converts each one to GLB
//! with an external engine and publishes the result next to the source.
//!
//! Two front ends share one [`modules::pipeline::Pipeline`]: the polling
//! [`workers::discovery::DiscoveryWorker`] and the single-shot
//! [`modules::events::EventHandler`].

pub mod app;
pub mod common;
pub mod config;
pub mod infrastructure;
pub mod modules;
pub mod state;
pub mod telemetry;
pub mod workers;
