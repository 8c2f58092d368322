//! Dynamic Condition Response (DCR) graphs
pub(crate) mod dcr_graph_struct;
pub use dcr_graph_struct::*;
/// Execution semantics (enabledness, execution, acceptance, replay)
pub mod execution;
#[doc(inline)]
pub use execution::{ReplayResult, ReplayStep};
pub mod io;
pub mod xml;
