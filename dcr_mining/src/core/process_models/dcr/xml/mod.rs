//! DCR XML interchange format
//!
//! ```xml
//! <dcrgraph>
//!   <specification>
//!     <resources>
//!       <events><event id="A"/><event id="N" type="nesting"><event id="B"/></event></events>
//!       <labels><label id="Register"/></labels>
//!       <labelMappings><labelMapping eventId="A" labelId="Register"/></labelMappings>
//!     </resources>
//!     <constraints>
//!       <conditions><condition sourceId="A" targetId="N"/></conditions>
//!       <responses/><excludes/><includes/><milestones/>
//!     </constraints>
//!   </specification>
//!   <runtime>
//!     <marking><executed/><included><event id="A"/></included><pendingResponses/></marking>
//!   </runtime>
//! </dcrgraph>
//! ```
pub(crate) mod export_dcr_xml;
pub(crate) mod import_dcr_xml;

#[doc(inline)]
pub use export_dcr_xml::*;
#[doc(inline)]
pub use import_dcr_xml::*;

use super::RelationKind;

/// (kind, group tag, element tag) in document order
pub(crate) const RELATION_TAGS: &[(RelationKind, &str, &str)] = &[
    (RelationKind::Condition, "conditions", "condition"),
    (RelationKind::Response, "responses", "response"),
    (RelationKind::Exclude, "excludes", "exclude"),
    (RelationKind::Include, "includes", "include"),
    (RelationKind::Milestone, "milestones", "milestone"),
];

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::BufReader;

    use super::*;
    use crate::conformance::quality::{QualityMeasures, NOT_COMPUTED};
    use crate::core::io::DcrIOError;
    use crate::core::process_models::dcr::{Activity, DcrGraph, Relation};
    use crate::error::DcrError;
    use crate::utils::test_utils::get_test_data_path;

    fn nested_graph() -> DcrGraph {
        let inner = DcrGraph::from_parts(
            vec![
                Activity::new("B", "Check"),
                Activity::new("C", "Approve").with_pending(true),
            ],
            vec![Relation::new(RelationKind::Condition, "B", "C")],
        )
        .unwrap();
        DcrGraph::from_parts(
            vec![
                Activity::new("A", "Register"),
                Activity::nest("N", "Review", inner),
                Activity::new("D", "Archive")
                    .with_included(false)
                    .with_executed(true),
            ],
            vec![
                Relation::new(RelationKind::Condition, "A", "N"),
                Relation::new(RelationKind::Include, "N", "D"),
                Relation::new(RelationKind::Exclude, "D", "D"),
                Relation::new(RelationKind::Milestone, "N", "D"),
                Relation::new(RelationKind::Response, "A", "D"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn export_then_import_nested_graph() {
        let graph = nested_graph();
        let xml = export_dcr_graph_xml_string(&graph).unwrap();
        assert!(xml.contains(r#"type="nesting""#));
        let imported = import_dcr_graph_xml_str(&xml).unwrap();
        assert_eq!(imported, graph);
    }

    #[test]
    fn result_document_with_measures() {
        let graph = nested_graph();
        let measures = QualityMeasures {
            fitness: 1.0,
            precision: 0.5,
            simplicity: NOT_COMPUTED,
        };
        let mut bytes = Vec::new();
        export_dcr_result_xml(&graph, &measures, &mut bytes).unwrap();
        let (imported, imported_measures) = import_dcr_result_xml(bytes.as_slice()).unwrap();
        assert_eq!(imported, graph);
        assert_eq!(imported_measures, Some(measures));
        assert_eq!(import_dcr_graph_xml(bytes.as_slice()).unwrap(), graph);
    }

    #[test]
    fn import_fixture() {
        let file = File::open(get_test_data_path().join("dcr").join("order.xml")).unwrap();
        let graph = import_dcr_graph_xml(BufReader::new(file)).unwrap();
        assert_eq!(graph.activity_count(), 4);
        assert_eq!(graph.activity("pay").map(|a| a.name.as_str()), Some("Pay invoice"));
        assert!(!graph.activity("refund").unwrap().included);
        assert!(graph.contains_relation(RelationKind::Condition, "register", "check"));
        assert!(graph.contains_relation(RelationKind::Include, "pay", "refund"));
    }

    #[test]
    fn rejects_relation_across_levels() {
        let xml = r#"<dcrgraph><specification><resources><events>
            <event id="A"/><event id="N" type="nesting"><event id="B"/></event>
            </events></resources><constraints><conditions>
            <condition sourceId="A" targetId="B"/>
            </conditions></constraints></specification></dcrgraph>"#;
        assert!(matches!(
            import_dcr_graph_xml_str(xml),
            Err(DcrIOError::Dcr(DcrError::MalformedInput(_)))
        ));
    }

    #[test]
    fn rejects_unknown_endpoint() {
        let xml = r#"<dcrgraph><specification><resources><events><event id="A"/></events>
            </resources><constraints><responses><response sourceId="A" targetId="Z"/>
            </responses></constraints></specification></dcrgraph>"#;
        assert!(matches!(
            import_dcr_graph_xml_str(xml),
            Err(DcrIOError::Dcr(DcrError::UnknownActivity { activity })) if activity == "Z"
        ));
    }

    #[test]
    fn rejects_non_graph_documents() {
        assert!(import_dcr_graph_xml_str("<pnml></pnml>").is_err());
    }
}
