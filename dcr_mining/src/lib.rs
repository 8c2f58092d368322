#![warn(
    clippy::doc_markdown,
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs
)]

#![doc = include_str!("../README.md")]

/// Errors of the DCR core
pub mod error;

///
/// Core data structures: event logs, DCR graphs, their execution semantics and IO
///
pub mod core;

///
/// Behavior-preserving simplification of DCR graphs
///
pub mod reduction;

///
/// Discovery of DCR graphs from event logs
///
pub mod discovery;

///
/// Quality measures and behavioral comparison
///
pub mod conformance;

/// XML in, XML out entry points
pub mod api;

/// Util module with smaller helper functions, structs or enums
pub mod utils;

#[doc(inline)]
pub use error::DcrError;

#[doc(inline)]
pub use crate::core::io::{DcrIOError, Exportable, Importable};

#[doc(inline)]
pub use crate::core::{DcrGraph, Event, Log, Trace};

#[doc(inline)]
pub use crate::core::process_models::dcr::{Activity, Relation, RelationKind};

#[doc(inline)]
pub use discovery::{create_nests, discover_dcr_graph, ContradictionMinerOptions, ViolationThreshold};

#[doc(inline)]
pub use reduction::{remove_redundancy, RedundancyOptions};

#[doc(inline)]
pub use conformance::{compare_behavior, verify_reduction, QualityMeasures};

#[doc(inline)]
pub use api::{mine_graph, remove_redundancy_xml};
