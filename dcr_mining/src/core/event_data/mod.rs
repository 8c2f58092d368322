//! Event logs to mine from and to replay on DCR graphs
mod io;
mod log_struct;
/// XES import and export
pub mod xes;

#[doc(inline)]
pub use log_struct::{Event, Log, Trace};
