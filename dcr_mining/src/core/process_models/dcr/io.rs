//! IO implementations for [`DcrGraph`]
use std::io::{BufReader, Read, Write};

use super::xml::{export_dcr_graph_xml, import_dcr_graph_xml};
use super::DcrGraph;
use crate::core::io::{DcrIOError, Exportable, ExtensionWithMime, Importable};

impl Importable for DcrGraph {
    type Error = DcrIOError;
    type ImportOptions = ();

    fn import_from_reader_with_options<R: Read>(
        reader: R,
        format: &str,
        _: Self::ImportOptions,
    ) -> Result<Self, Self::Error> {
        match format {
            "xml" => import_dcr_graph_xml(BufReader::new(reader)),
            "json" => Ok(serde_json::from_reader(reader)?),
            _ => Err(DcrIOError::UnsupportedFormat(format.to_string())),
        }
    }

    fn known_import_formats() -> Vec<ExtensionWithMime> {
        vec![
            ExtensionWithMime::new("xml", "application/xml"),
            ExtensionWithMime::new("json", "application/json"),
        ]
    }
}

impl Exportable for DcrGraph {
    type Error = DcrIOError;

    fn export_to_writer<W: Write>(&self, writer: W, format: &str) -> Result<(), Self::Error> {
        match format {
            "xml" => export_dcr_graph_xml(self, writer),
            "json" => Ok(serde_json::to_writer(writer, self)?),
            _ => Err(DcrIOError::UnsupportedFormat(format.to_string())),
        }
    }

    fn known_export_formats() -> Vec<ExtensionWithMime> {
        Self::known_import_formats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process_models::dcr::{Activity, Relation, RelationKind};

    #[test]
    fn graph_path_io() {
        let graph = DcrGraph::from_parts(
            vec![Activity::new("A", "A"), Activity::new("B", "B").with_included(false)],
            vec![
                Relation::new(RelationKind::Include, "A", "B"),
                Relation::new(RelationKind::Response, "A", "B"),
            ],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        for file_name in ["graph.xml", "graph.json"] {
            let path = dir.path().join(file_name);
            graph.export_to_path(&path).unwrap();
            assert_eq!(DcrGraph::import_from_path(&path).unwrap(), graph);
        }
        assert!(matches!(
            DcrGraph::import_from_bytes(b"", "pnml"),
            Err(DcrIOError::UnsupportedFormat(_))
        ));
    }
}
