use std::io::Write;

use quick_xml::Writer;

use crate::conformance::quality::QualityMeasures;
use crate::core::io::DcrIOError;
use crate::core::process_models::dcr::{DcrGraph, Relation};
use crate::utils::xml_utils::{
    write_empty, write_end, write_start, write_text_element, XMLWriterWrapper,
};

use super::RELATION_TAGS;

fn write_events<W: Write>(writer: &mut Writer<W>, graph: &DcrGraph) -> Result<(), DcrIOError> {
    for activity in graph.activities() {
        match activity.nested() {
            Some(nested) => {
                write_start(
                    writer,
                    "event",
                    &[("id", activity.id().as_str()), ("type", "nesting")],
                )?;
                write_events(writer, nested)?;
                write_end(writer, "event")?;
            }
            None => write_empty(writer, "event", &[("id", activity.id().as_str())])?,
        }
    }
    Ok(())
}

fn collect_relations(graph: &DcrGraph, relations: &mut Vec<Relation>) {
    relations.extend(graph.relations());
    for nested in graph.activities().filter_map(|a| a.nested()) {
        collect_relations(nested, relations);
    }
}

fn write_id_list<'b, W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    ids: impl Iterator<Item = &'b String>,
) -> Result<(), DcrIOError> {
    write_start(writer, tag, &[])?;
    for id in ids {
        write_empty(writer, "event", &[("id", id.as_str())])?;
    }
    write_end(writer, tag)
}

fn write_dcr_graph<W: Write>(writer: &mut Writer<W>, graph: &DcrGraph) -> Result<(), DcrIOError> {
    let mut all_activities: Vec<(&String, &String)> = Vec::new();
    let mut stack = vec![graph];
    while let Some(level) = stack.pop() {
        for activity in level.activities() {
            all_activities.push((activity.id(), &activity.name));
            if let Some(nested) = activity.nested() {
                stack.push(nested);
            }
        }
    }
    all_activities.sort();

    write_start(writer, "dcrgraph", &[])?;
    write_start(writer, "specification", &[])?;
    write_start(writer, "resources", &[])?;

    write_start(writer, "events", &[])?;
    write_events(writer, graph)?;
    write_end(writer, "events")?;

    write_start(writer, "labels", &[])?;
    let mut labels: Vec<&String> = all_activities.iter().map(|(_, name)| *name).collect();
    labels.sort();
    labels.dedup();
    for label in labels {
        write_empty(writer, "label", &[("id", label.as_str())])?;
    }
    write_end(writer, "labels")?;

    write_start(writer, "labelMappings", &[])?;
    for (id, name) in &all_activities {
        write_empty(
            writer,
            "labelMapping",
            &[("eventId", id.as_str()), ("labelId", name.as_str())],
        )?;
    }
    write_end(writer, "labelMappings")?;
    write_end(writer, "resources")?;

    let mut relations = Vec::new();
    collect_relations(graph, &mut relations);
    write_start(writer, "constraints", &[])?;
    for (kind, group_tag, tag) in RELATION_TAGS {
        write_start(writer, group_tag, &[])?;
        for relation in relations.iter().filter(|r| r.kind == *kind) {
            write_empty(
                writer,
                tag,
                &[
                    ("sourceId", relation.source.as_str()),
                    ("targetId", relation.target.as_str()),
                ],
            )?;
        }
        write_end(writer, group_tag)?;
    }
    write_end(writer, "constraints")?;
    write_end(writer, "specification")?;

    let marking = graph.marking();
    write_start(writer, "runtime", &[])?;
    write_start(writer, "marking", &[])?;
    write_id_list(writer, "executed", marking.executed.iter())?;
    write_id_list(writer, "included", marking.included.iter())?;
    write_id_list(writer, "pendingResponses", marking.pending.iter())?;
    write_end(writer, "marking")?;
    write_end(writer, "runtime")?;
    write_end(writer, "dcrgraph")
}

///
/// Export a [`DcrGraph`] to the DCR XML format
///
/// Nests are written as `<event type="nesting">` elements containing their members; relations
/// of all levels are listed in one `<constraints>` block.
///
pub fn export_dcr_graph_xml<'a, W>(
    graph: &DcrGraph,
    into_writer: impl Into<XMLWriterWrapper<'a, W>>,
) -> Result<(), DcrIOError>
where
    W: Write + 'a,
{
    let mut xml_writer: XMLWriterWrapper<'_, W> = into_writer.into();
    let writer = xml_writer.to_xml_writer();
    write_dcr_graph(writer, graph)
}

///
/// Export a result document: a `<measures>` block followed by the graph
///
pub fn export_dcr_result_xml<'a, W>(
    graph: &DcrGraph,
    measures: &QualityMeasures,
    into_writer: impl Into<XMLWriterWrapper<'a, W>>,
) -> Result<(), DcrIOError>
where
    W: Write + 'a,
{
    let mut xml_writer: XMLWriterWrapper<'_, W> = into_writer.into();
    let writer = xml_writer.to_xml_writer();
    write_start(writer, "result", &[])?;
    write_start(writer, "measures", &[])?;
    write_text_element(writer, "fitness", &measures.fitness.to_string())?;
    write_text_element(writer, "precision", &measures.precision.to_string())?;
    write_text_element(writer, "simplicity", &measures.simplicity.to_string())?;
    write_end(writer, "measures")?;
    write_dcr_graph(writer, graph)?;
    write_end(writer, "result")
}

/// Export a [`DcrGraph`] to a DCR XML string
pub fn export_dcr_graph_xml_string(graph: &DcrGraph) -> Result<String, DcrIOError> {
    let mut bytes = Vec::new();
    export_dcr_graph_xml(graph, &mut bytes)?;
    String::from_utf8(bytes).map_err(|e| DcrIOError::malformed(e.to_string()))
}
