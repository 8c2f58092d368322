//! String-in, string-out entry points wiring XML/XES around the core
use crate::conformance::quality::QualityMeasures;
use crate::core::event_data::xes::import_xes;
use crate::core::io::DcrIOError;
use crate::core::process_models::dcr::xml::{export_dcr_result_xml, import_dcr_graph_xml_str};
use crate::core::process_models::dcr::DcrGraph;
use crate::discovery::{create_nests, discover_dcr_graph, ContradictionMinerOptions, ViolationThreshold};
use crate::reduction::{remove_redundancy, RedundancyOptions};

fn result_xml(graph: &DcrGraph, measures: &QualityMeasures) -> Result<String, DcrIOError> {
    let mut bytes = Vec::new();
    export_dcr_result_xml(graph, measures, &mut bytes)?;
    String::from_utf8(bytes).map_err(|e| DcrIOError::malformed(e.to_string()))
}

///
/// Mine a graph from a XES log and return it as result XML
///
/// The mined graph is reduced (see [`remove_redundancy`]) and nested (see [`create_nests`])
/// before all quality measures are computed on the input log.
///
pub fn mine_graph(
    log_xes: &str,
    threshold: ViolationThreshold,
    minimum_nest_size: usize,
) -> Result<String, DcrIOError> {
    let log = import_xes(log_xes.as_bytes())?;
    let mined = discover_dcr_graph(&log, &ContradictionMinerOptions::with_threshold(threshold))?;
    let (reduced, _) = remove_redundancy(&mined.graph, &RedundancyOptions::default())?;
    let (nested, _) = create_nests(&reduced, minimum_nest_size)?;
    let measures = QualityMeasures::compute(&nested, &log);
    result_xml(&nested, &measures)
}

///
/// Remove redundancy from a graph given as DCR XML and return the result XML
///
/// Only simplicity is computed; fitness and precision are reported as
/// [`NOT_COMPUTED`](crate::conformance::NOT_COMPUTED).
///
pub fn remove_redundancy_xml(graph_xml: &str) -> Result<String, DcrIOError> {
    let graph = import_dcr_graph_xml_str(graph_xml)?;
    let (reduced, _) = remove_redundancy(&graph, &RedundancyOptions::default())?;
    result_xml(&reduced, &QualityMeasures::simplicity_only(&reduced))
}
