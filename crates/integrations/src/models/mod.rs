//! Domain models for the synchronization engine

mod tenant;
mod work_item;

pub use tenant::{AtsConfig, IntegrationConfig, Mappings, PortalConfig};
pub use work_item::WorkItem;
