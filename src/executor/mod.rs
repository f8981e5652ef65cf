//! Executor dispatch and the analysis method library.
//!
//! For each of the 30 base slots a fixed, declarative method sequence is
//! recorded. The dispatcher iterates a task's sequence, resolving each
//! method's arguments from an evolving [`ArgumentContext`] via the
//! compile-time alias table, applying memory-safety caps before every
//! invocation, and recording success or failure in an execution log.

pub mod context;
pub mod dispatch;
pub mod memory;
pub mod methods;
pub mod sequences;

pub use context::{Arg, ArgumentContext, CausalGraph, resolve_alias};
pub use dispatch::{ExecutionLog, InvocationRecord, execute_task};
pub use memory::MemoryClass;
pub use sequences::{MethodRef, sequence_for};
