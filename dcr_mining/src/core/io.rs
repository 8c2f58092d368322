//! IO traits for importing and exporting logs and graphs
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::error::DcrError;

/// File extension together with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionWithMime {
    /// File extension (without leading dot, e.g., `xes.gz`)
    pub extension: String,
    /// MIME type
    pub mime_type: String,
}

impl ExtensionWithMime {
    /// Create a new [`ExtensionWithMime`]
    pub fn new<E: Into<String>, M: Into<String>>(extension: E, mime_type: M) -> Self {
        Self {
            extension: extension.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Error type for all IO operations of this crate
#[derive(Error, Debug)]
pub enum DcrIOError {
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// XML Error
    #[error("XML Error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// XML Attribute Error
    #[error("XML Attribute Error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),
    /// JSON Error
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    /// Violated graph or log invariant while importing
    #[error(transparent)]
    Dcr(#[from] DcrError),
    /// Unsupported Format
    #[error("Unsupported Format: {0}")]
    UnsupportedFormat(String),
}

impl DcrIOError {
    pub(crate) fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Dcr(DcrError::MalformedInput(message.into()))
    }
}

/// Infer format from path, treating `.xes.gz` as one extension
fn infer_format_from_path(path: &Path) -> Option<String> {
    let path_str = path.to_string_lossy().to_lowercase();
    if path_str.ends_with(".xes.gz") {
        return Some("xes.gz".to_string());
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// Trait for importing types from a file path or reader
pub trait Importable: Sized {
    /// The error type returned by import operations
    type Error: std::error::Error + Send + Sync + 'static + From<std::io::Error>;
    /// Options for the import
    type ImportOptions: Default;

    /// Import from a reader, specifying the format and options.
    fn import_from_reader_with_options<R: Read>(
        reader: R,
        format: &str,
        options: Self::ImportOptions,
    ) -> Result<Self, Self::Error>;

    /// Formats supported by [`Importable::import_from_reader_with_options`]
    fn known_import_formats() -> Vec<ExtensionWithMime>;

    /// Import from a reader, specifying the format (using default options).
    fn import_from_reader<R: Read>(reader: R, format: &str) -> Result<Self, Self::Error> {
        Self::import_from_reader_with_options(reader, format, Self::ImportOptions::default())
    }

    /// Import from a file path, inferring the format from the file extension.
    fn import_from_path<P: AsRef<Path>>(path: P) -> Result<Self, Self::Error> {
        let path = path.as_ref();
        let format = infer_format_from_path(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Could not infer format from path",
            )
        })?;

        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Self::import_from_reader(reader, &format)
    }

    /// Import from a byte slice, specifying the format.
    fn import_from_bytes(bytes: &[u8], format: &str) -> Result<Self, Self::Error> {
        Self::import_from_reader(std::io::Cursor::new(bytes), format)
    }
}

/// Trait for exporting types to a file path or writer
pub trait Exportable {
    /// The error type returned by export operations
    type Error: std::error::Error + Send + Sync + 'static + From<std::io::Error>;

    /// Export to a writer, specifying the format.
    fn export_to_writer<W: Write>(&self, writer: W, format: &str) -> Result<(), Self::Error>;

    /// Formats supported by [`Exportable::export_to_writer`]
    fn known_export_formats() -> Vec<ExtensionWithMime>;

    /// Export to a file path, inferring the format from the file extension.
    fn export_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), Self::Error> {
        let path = path.as_ref();
        let format = infer_format_from_path(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Could not infer format from path",
            )
        })?;

        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        self.export_to_writer(writer, &format)
    }

    /// Export to a byte array ([`Vec<u8>`])
    fn export_to_bytes(&self, format: &str) -> Result<Vec<u8>, Self::Error> {
        let mut bytes = Vec::new();
        self.export_to_writer(&mut bytes, format)?;
        Ok(bytes)
    }
}
