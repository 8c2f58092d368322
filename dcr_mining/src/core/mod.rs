//! Core data structures (event logs and DCR graphs) and their IO
pub mod event_data;
pub mod io;
pub mod process_models;

#[doc(inline)]
pub use event_data::{Event, Log, Trace};
#[doc(inline)]
pub use process_models::dcr::DcrGraph;
