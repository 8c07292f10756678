//! # Fluid Droplet Gateway Library
//!
//! This library provides the core functionality for the Fluid droplet
//! gateway: webhook ingestion, tenant-scoped processing, and the HTTP
//! surface the dashboard and the Fluid platform talk to.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod events;
pub mod fluid;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod processing;
pub mod repositories;
pub mod retry;
pub mod server;
pub mod signature;
pub mod telemetry;
pub use migration;
