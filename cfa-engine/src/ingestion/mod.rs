//! Ingestion: cycle coordinator and interval scheduler

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{
    CoordinatorSettings, CycleError, CycleOutcome, CycleReport, IngestionCoordinator,
};
pub use scheduler::run_scheduler;
