//! Minimal XES import/export for [`Log`]s
//!
//! Only the information needed for DCR mining is read: the `concept:name` of traces and events
//! and the `time:timestamp` of events. Other attributes are skipped.
use std::io::{BufRead, Write};

use chrono::DateTime;
use quick_xml::{events::Event as XMLEvent, Reader};

use super::log_struct::{Event, Log, Trace};
use crate::core::io::DcrIOError;
use crate::utils::xml_utils::{
    get_attribute_value, read_to_string, write_empty, write_end, write_start, XMLWriterWrapper,
};

const CONCEPT_NAME: &str = "concept:name";
const TIMESTAMP: &str = "time:timestamp";

const ATTRIBUTE_TAGS: &[&[u8]] = &[
    b"string",
    b"date",
    b"int",
    b"float",
    b"boolean",
    b"id",
    b"list",
    b"container",
];

#[derive(Debug, Default)]
struct EventBuilder {
    activity: Option<String>,
    timestamp: Option<chrono::DateTime<chrono::FixedOffset>>,
}

///
/// Import a [`Log`] from an XES document
///
/// The alphabet of the log consists of all activities that occur in it.
///
pub fn import_xes<R: BufRead>(reader: R) -> Result<Log, DcrIOError> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;
    let mut buf: Vec<u8> = Vec::new();

    let mut encountered_log_tag = false;
    let mut log = Log::new();
    let mut current_trace: Option<Trace> = None;
    let mut current_event: Option<EventBuilder> = None;
    // Attributes nested in other attributes are ignored
    let mut attribute_depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            XMLEvent::Start(t) => {
                let tag = t.name();
                match tag.as_ref() {
                    b"log" => encountered_log_tag = true,
                    b"trace" => {
                        current_trace = Some(Trace {
                            id: log.traces.len().to_string(),
                            events: Vec::new(),
                        })
                    }
                    b"event" => current_event = Some(EventBuilder::default()),
                    name if ATTRIBUTE_TAGS.contains(&name) => {
                        if attribute_depth == 0 {
                            let key = get_attribute_value(&t, "key")?;
                            let value = get_attribute_value(&t, "value")?;
                            if let (Some(key), Some(value)) = (key, value) {
                                match (&mut current_event, &mut current_trace) {
                                    (Some(event), _) if key == CONCEPT_NAME => {
                                        event.activity = Some(value)
                                    }
                                    (Some(event), _) if key == TIMESTAMP => {
                                        match DateTime::parse_from_rfc3339(&value) {
                                            Ok(ts) => event.timestamp = Some(ts),
                                            Err(e) => tracing::warn!(
                                                value = %value,
                                                error = %e,
                                                "Could not parse event timestamp"
                                            ),
                                        }
                                    }
                                    (None, Some(trace)) if key == CONCEPT_NAME => trace.id = value,
                                    _ => {}
                                }
                            }
                        }
                        attribute_depth += 1;
                    }
                    _ => {}
                }
            }
            XMLEvent::End(t) => match t.name().as_ref() {
                b"event" => {
                    if let Some(builder) = current_event.take() {
                        let activity = builder.activity.ok_or_else(|| {
                            DcrIOError::malformed(format!("Event without {}", CONCEPT_NAME))
                        })?;
                        log.alphabet
                            .entry(activity.clone())
                            .or_insert_with(|| activity.clone());
                        let event = Event {
                            name: activity.clone(),
                            activity,
                            timestamp: builder.timestamp,
                        };
                        match current_trace.as_mut() {
                            Some(trace) => trace.events.push(event),
                            None => {
                                return Err(DcrIOError::malformed("Event outside of a trace"));
                            }
                        }
                    }
                }
                b"trace" => {
                    if let Some(trace) = current_trace.take() {
                        log.traces.push(trace);
                    }
                }
                name if ATTRIBUTE_TAGS.contains(&name) => {
                    attribute_depth = attribute_depth.saturating_sub(1);
                }
                _ => {}
            },
            XMLEvent::Eof => break,
            XMLEvent::Text(t) => {
                tracing::trace!(text = %read_to_string(&t), "Ignored XES text content");
            }
            _ => {}
        }
        buf.clear();
    }
    if !encountered_log_tag {
        return Err(DcrIOError::malformed("No <log> tag found"));
    }
    Ok(log)
}

///
/// Export a [`Log`] as XES
///
pub fn export_xes<'a, W>(
    log: &Log,
    into_writer: impl Into<XMLWriterWrapper<'a, W>>,
) -> Result<(), DcrIOError>
where
    W: Write + 'a,
{
    let mut xml_writer: XMLWriterWrapper<'_, W> = into_writer.into();
    let writer = xml_writer.to_xml_writer();
    write_start(
        writer,
        "log",
        &[("xes.version", "1.0"), ("xmlns", "http://www.xes-standard.org/")],
    )?;
    for trace in &log.traces {
        write_start(writer, "trace", &[])?;
        write_empty(
            writer,
            "string",
            &[("key", CONCEPT_NAME), ("value", trace.id.as_str())],
        )?;
        for event in &trace.events {
            write_start(writer, "event", &[])?;
            write_empty(
                writer,
                "string",
                &[("key", CONCEPT_NAME), ("value", event.activity.as_str())],
            )?;
            if let Some(timestamp) = event.timestamp {
                let timestamp = timestamp.to_rfc3339();
                write_empty(
                    writer,
                    "date",
                    &[("key", TIMESTAMP), ("value", timestamp.as_str())],
                )?;
            }
            write_end(writer, "event")?;
        }
        write_end(writer, "trace")?;
    }
    write_end(writer, "log")
}
