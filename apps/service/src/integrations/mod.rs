/// Notification integrations
///
/// Configured channel instances, the repository resolving which of them a
/// monitor notifies, and the per-family senders.
pub mod models;
pub mod repository;
pub mod senders;

pub use models::{IntegrationConfig, IntegrationId, IntegrationType};
pub use repository::{IntegrationConfigError, IntegrationRepository};
