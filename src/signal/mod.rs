//! Signal system.
//!
//! A content-addressed registry of per-policy-area pattern packs built
//! from the question monolith. Access discipline: the monolith provider
//! in this module is the only component permitted to read the monolith
//! file; a static scan in the test suite counts violations elsewhere
//! (expected: zero).

pub mod monolith;
pub mod pack;
pub mod registry;

#[cfg(feature = "signal-http")]
pub mod http;

pub use monolith::{MonolithProvider, QuestionMonolith, QuestionSpec};
pub use pack::{
    ChunkContext, FilterStats, MatchMode, ResolvedSignal, SignalPack, SignalPattern,
    required_payload_fields,
};
pub use registry::{RegistryStats, SignalRegistry};
