//! SLIPWORKS: Monte Carlo parlay simulation and ticket construction
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod strategy;
pub mod engine;
pub mod tickets;
pub mod render;
