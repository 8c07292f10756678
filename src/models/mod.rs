//! # Data Models
//!
//! This module contains all the data models used throughout the droplet gateway.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod activity_log;
pub mod custom_data;
pub mod installation;
pub mod webhook_event;

pub use activity_log::Entity as ActivityLog;
pub use custom_data::Entity as CustomData;
pub use installation::Entity as Installation;
pub use webhook_event::Entity as WebhookEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "fluid-droplet".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
