//! Harvesting of regional open-data services into a package catalogue.
//!
//! - [`harvest`]: the gather/fetch/import cycle and the source integrations
//! - [`profile`]: contact points of the linked-data dataset graph
//! - [`pages`]: the fixed informational pages

pub mod client;
pub mod config;
pub mod decode;
pub mod executor;
pub mod harvest;
pub mod lookups;
pub mod model;
pub mod pages;
pub mod profile;
pub mod traits;

// Re-export common types for convenience
pub use executor::HarvesterExecutor;
pub use harvest::{HarvestError, HarvestJob, HarvestPipeline, HarvestReport, HarvestSource};
pub use model::*;
pub use traits::*;
