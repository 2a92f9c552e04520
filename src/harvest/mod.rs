//! Harvest module - the three-stage reconciliation cycle.
//!
//! - **Traits**: [`HarvestSource`] capabilities and the [`HarvestError`] taxonomy
//! - **Pipeline**: gather, fetch and import via [`pipeline::HarvestPipeline`]
//! - **Sources**: OpenCity and StatWeb integrations in [`sources`]
//! - **Memory**: in-process stores for dry runs and tests

pub mod memory;
pub mod pipeline;
pub mod sources;
pub mod traits;

// Re-export commonly used types
pub use traits::{HarvestError, HarvestJob, HarvestSource, ItemOutcome, MappingContext, SourceInfo};

pub use pipeline::{HarvestPipeline, HarvestReport, HarvestStats, ItemFailure, Stage};
