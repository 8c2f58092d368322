use std::io::{BufRead, BufReader, Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use super::log_struct::Log;
use super::xes::{export_xes, import_xes};
use crate::core::io::{DcrIOError, Exportable, ExtensionWithMime, Importable};

impl Importable for Log {
    type Error = DcrIOError;
    type ImportOptions = ();

    fn import_from_reader_with_options<R: Read>(
        reader: R,
        format: &str,
        _: Self::ImportOptions,
    ) -> Result<Self, Self::Error> {
        let log = match format {
            "json" => serde_json::from_reader(reader)?,
            "xes" => import_xes(BufReader::new(reader))?,
            "xes.gz" => {
                let gz: Box<dyn BufRead> = Box::new(BufReader::new(GzDecoder::new(reader)));
                import_xes(gz)?
            }
            _ => return Err(DcrIOError::UnsupportedFormat(format.to_string())),
        };
        tracing::debug!(
            format,
            traces = log.traces.len(),
            activities = log.alphabet.len(),
            "Imported event log"
        );
        Ok(log)
    }

    fn known_import_formats() -> Vec<ExtensionWithMime> {
        vec![
            ExtensionWithMime::new("xes", "application/xml"),
            ExtensionWithMime::new("xes.gz", "application/gzip"),
            ExtensionWithMime::new("json", "application/json"),
        ]
    }
}

impl Exportable for Log {
    type Error = DcrIOError;

    fn export_to_writer<W: Write>(&self, writer: W, format: &str) -> Result<(), Self::Error> {
        match format {
            "json" => Ok(serde_json::to_writer(writer, self)?),
            "xes" => export_xes(self, writer),
            "xes.gz" => {
                let mut encoder = GzEncoder::new(writer, Compression::default());
                export_xes(self, &mut encoder)?;
                encoder.finish()?;
                Ok(())
            }
            _ => Err(DcrIOError::UnsupportedFormat(format.to_string())),
        }
    }

    fn known_export_formats() -> Vec<ExtensionWithMime> {
        Self::known_import_formats()
    }
}
