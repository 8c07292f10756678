//! # Repositories
//!
//! Data access layer for the droplet gateway. Every query is scoped to an
//! installation so one tenant can never observe another tenant's rows.

pub mod activity_log;
pub mod custom_data;
pub mod installation;
pub mod webhook_event;

pub use activity_log::ActivityLogRepository;
pub use custom_data::CustomDataRepository;
pub use installation::InstallationRepository;
pub use webhook_event::WebhookEventRepository;
