//! Irrigation synchronizer and task planner.
//!
//! Materializes exactly 300 executable tasks by routing the 300 questions
//! to the 60 (policy area, dimension) chunks under strict equality and
//! immutability contracts. Each question runs through an explicit state
//! machine: extraction, ordering, chunk routing, pattern filtering, signal
//! resolution, schema compatibility, task construction.

pub mod routing;
pub mod schema_check;
pub mod synchronizer;
pub mod task;

pub use routing::ChunkRoutingResult;
pub use schema_check::check_schema_compatibility;
pub use synchronizer::{IrrigationSynchronizer, SYNCHRONIZER_VERSION};
pub use task::{ExecutableTask, ExecutionPlan, TaskMetadata};
