use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;

use quick_xml::{events::Event as XMLEvent, Reader};

use super::RELATION_TAGS;
use crate::conformance::quality::{QualityMeasures, NOT_COMPUTED};
use crate::core::io::DcrIOError;
use crate::core::process_models::dcr::{Activity, DcrGraph, Relation};
use crate::error::DcrError;
use crate::utils::xml_utils::{get_attribute_value, read_to_string, require_attribute_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Events,
    Executed,
    Included,
    Pending,
    Measure(MeasureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeasureKind {
    Fitness,
    Precision,
    Simplicity,
}

#[derive(Debug)]
struct EventNode {
    id: String,
    is_nest: bool,
    children: Vec<EventNode>,
}

#[derive(Debug, Default)]
struct ParsedDocument {
    roots: Vec<EventNode>,
    labels: HashMap<String, String>,
    relations: Vec<Relation>,
    executed: BTreeSet<String>,
    included: BTreeSet<String>,
    pending: BTreeSet<String>,
    measures: Option<QualityMeasures>,
}

fn parse_document<R: BufRead>(reader: R) -> Result<ParsedDocument, DcrIOError> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;
    let mut buf: Vec<u8> = Vec::new();

    let mut doc = ParsedDocument::default();
    let mut encountered_graph_tag = false;
    let mut mode = Mode::None;
    let mut event_stack: Vec<EventNode> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            XMLEvent::Start(t) => match t.name().as_ref() {
                b"dcrgraph" => encountered_graph_tag = true,
                b"events" if mode == Mode::None => mode = Mode::Events,
                b"event" => match mode {
                    Mode::Events => event_stack.push(EventNode {
                        id: require_attribute_value(&t, "id")?,
                        is_nest: get_attribute_value(&t, "type")?.as_deref() == Some("nesting"),
                        children: Vec::new(),
                    }),
                    Mode::Executed => {
                        doc.executed.insert(require_attribute_value(&t, "id")?);
                    }
                    Mode::Included => {
                        doc.included.insert(require_attribute_value(&t, "id")?);
                    }
                    Mode::Pending => {
                        doc.pending.insert(require_attribute_value(&t, "id")?);
                    }
                    _ => {}
                },
                b"labelMapping" => {
                    doc.labels.insert(
                        require_attribute_value(&t, "eventId")?,
                        require_attribute_value(&t, "labelId")?,
                    );
                }
                b"executed" => mode = Mode::Executed,
                b"included" => mode = Mode::Included,
                b"pendingResponses" => mode = Mode::Pending,
                b"measures" => {
                    doc.measures = Some(QualityMeasures {
                        fitness: NOT_COMPUTED,
                        precision: NOT_COMPUTED,
                        simplicity: NOT_COMPUTED,
                    })
                }
                b"fitness" => mode = Mode::Measure(MeasureKind::Fitness),
                b"precision" => mode = Mode::Measure(MeasureKind::Precision),
                b"simplicity" => mode = Mode::Measure(MeasureKind::Simplicity),
                tag => {
                    if let Some((kind, _, _)) = RELATION_TAGS
                        .iter()
                        .find(|(_, _, name)| name.as_bytes() == tag)
                    {
                        doc.relations.push(Relation::new(
                            *kind,
                            require_attribute_value(&t, "sourceId")?,
                            require_attribute_value(&t, "targetId")?,
                        ));
                    }
                }
            },
            XMLEvent::End(t) => match t.name().as_ref() {
                b"events" if mode == Mode::Events => mode = Mode::None,
                b"event" if mode == Mode::Events => {
                    let node = event_stack.pop().ok_or_else(|| {
                        DcrIOError::malformed("Unbalanced <event> elements")
                    })?;
                    match event_stack.last_mut() {
                        Some(parent) if parent.is_nest => parent.children.push(node),
                        Some(parent) => {
                            return Err(DcrIOError::malformed(format!(
                                "Event '{}' is nested in '{}', which is not of type nesting",
                                node.id, parent.id
                            )))
                        }
                        None => doc.roots.push(node),
                    }
                }
                b"executed" | b"included" | b"pendingResponses" | b"fitness" | b"precision"
                | b"simplicity" => mode = Mode::None,
                _ => {}
            },
            XMLEvent::Text(t) => {
                if let Mode::Measure(kind) = mode {
                    let text = read_to_string(&t);
                    let value: f64 = text.trim().parse().map_err(|_| {
                        DcrIOError::malformed(format!("Invalid measure value '{}'", text))
                    })?;
                    if let Some(measures) = doc.measures.as_mut() {
                        match kind {
                            MeasureKind::Fitness => measures.fitness = value,
                            MeasureKind::Precision => measures.precision = value,
                            MeasureKind::Simplicity => measures.simplicity = value,
                        }
                    }
                }
            }
            XMLEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !encountered_graph_tag {
        return Err(DcrIOError::malformed("No <dcrgraph> tag found"));
    }
    Ok(doc)
}

fn build_level(nodes: Vec<EventNode>, doc: &ParsedDocument) -> Result<DcrGraph, DcrError> {
    let mut graph = DcrGraph::new();
    for node in nodes {
        let name = doc.labels.get(&node.id).cloned().unwrap_or_else(|| node.id.clone());
        let activity = if node.is_nest {
            Activity::nest(node.id, name, build_level(node.children, doc)?)
        } else {
            let included = doc.included.contains(&node.id);
            let pending = doc.pending.contains(&node.id);
            let executed = doc.executed.contains(&node.id);
            Activity::new(node.id, name)
                .with_included(included)
                .with_pending(pending)
                .with_executed(executed)
        };
        graph.add_activity(activity)?;
    }
    Ok(graph)
}

fn add_relation(graph: &mut DcrGraph, relation: &Relation) -> Result<(), DcrIOError> {
    let siblings = graph
        .graph_of(&relation.source)
        .is_some_and(|level| level.contains_activity(&relation.target));
    if !siblings {
        for id in [&relation.source, &relation.target] {
            if graph.find_activity(id).is_none() {
                return Err(DcrError::unknown(id.as_str()).into());
            }
        }
        return Err(DcrIOError::malformed(format!(
            "Endpoints of {} are not on the same level",
            relation
        )));
    }
    if let Some(level) = graph.graph_of_mut(&relation.source) {
        level.add_relation(relation.kind, &relation.source, &relation.target)?;
    }
    Ok(())
}

fn build_graph(mut doc: ParsedDocument) -> Result<(DcrGraph, Option<QualityMeasures>), DcrIOError> {
    let roots = std::mem::take(&mut doc.roots);
    let mut graph = build_level(roots, &doc)?;
    for relation in &doc.relations {
        add_relation(&mut graph, relation)?;
    }
    for id in doc.included.iter().chain(&doc.pending).chain(&doc.executed) {
        if graph.find_activity(id).is_none() {
            return Err(DcrError::unknown(id.as_str()).into());
        }
    }
    Ok((graph, doc.measures))
}

///
/// Import a [`DcrGraph`] from the DCR XML format
///
/// Accepts both plain `<dcrgraph>` documents and result documents wrapping one.
/// Activities missing from `<included>` start excluded.
///
pub fn import_dcr_graph_xml<R: BufRead>(reader: R) -> Result<DcrGraph, DcrIOError> {
    Ok(build_graph(parse_document(reader)?)?.0)
}

///
/// Import a result document: the graph together with its measures (if present)
///
pub fn import_dcr_result_xml<R: BufRead>(
    reader: R,
) -> Result<(DcrGraph, Option<QualityMeasures>), DcrIOError> {
    build_graph(parse_document(reader)?)
}

/// Import a [`DcrGraph`] from a DCR XML string
pub fn import_dcr_graph_xml_str(xml: &str) -> Result<DcrGraph, DcrIOError> {
    import_dcr_graph_xml(xml.as_bytes())
}
