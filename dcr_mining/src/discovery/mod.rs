//! Process Discovery
//!
//! Discovery of DCR graphs from event data and structural post-processing of discovered graphs.
/// Contradiction mining
pub mod contradiction;
/// Nesting of activities with shared relations
pub mod nesting;

#[doc(inline)]
pub use contradiction::{
    discover_dcr_graph, ContradictionMiner, ContradictionMinerOptions, MiningResult,
    MiningStatistics, ViolationThreshold,
};
#[doc(inline)]
pub use nesting::{create_nests, NestingReport};
