use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::core::io::DcrIOError;

/// A wrapper for either an owned or mutable reference to a [`quick_xml::Writer`]
#[allow(missing_debug_implementations)]
pub enum XMLWriterWrapper<'a, W> {
    /// Owned [`quick_xml::Writer`]
    Owned(quick_xml::Writer<W>),
    /// Mutable Reference to [`quick_xml::Writer`]
    Ref(&'a mut quick_xml::Writer<W>),
}

impl<'a, W> XMLWriterWrapper<'a, W> {
    /// Return a mutable reference to a [`quick_xml::Writer`]
    pub fn to_xml_writer(&'a mut self) -> &'a mut quick_xml::Writer<W> {
        match self {
            XMLWriterWrapper::Owned(w) => w,
            XMLWriterWrapper::Ref(w) => w,
        }
    }
}

impl<W: std::io::Write> From<W> for XMLWriterWrapper<'_, W> {
    fn from(w: W) -> Self {
        Self::Owned(quick_xml::Writer::new_with_indent(w, b' ', 2))
    }
}

impl<'a, W> From<&'a mut quick_xml::Writer<W>> for XMLWriterWrapper<'a, W> {
    fn from(w: &'a mut quick_xml::Writer<W>) -> Self {
        Self::Ref(w)
    }
}

pub(crate) fn read_to_string(x: &[u8]) -> String {
    if let Ok(x_str) = std::str::from_utf8(x) {
        if let Ok(unescaped) = quick_xml::escape::unescape(x_str) {
            return unescaped.to_string();
        }
        return x_str.to_string();
    }
    String::from_utf8_lossy(x).to_string()
}

pub(crate) fn get_attribute_value(
    t: &BytesStart<'_>,
    key: &str,
) -> Result<Option<String>, DcrIOError> {
    Ok(t
        .try_get_attribute(key)?
        .map(|attr| read_to_string(attr.value.as_ref())))
}

pub(crate) fn require_attribute_value(
    t: &BytesStart<'_>,
    key: &str,
) -> Result<String, DcrIOError> {
    get_attribute_value(t, key)?.ok_or_else(|| {
        DcrIOError::malformed(format!(
            "Missing attribute '{}' on <{}>",
            key,
            read_to_string(t.name().as_ref())
        ))
    })
}

pub(crate) fn write_start<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), DcrIOError> {
    writer.write_event(Event::Start(
        BytesStart::new(name).with_attributes(attributes.iter().copied()),
    ))?;
    Ok(())
}

pub(crate) fn write_end<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    name: &str,
) -> Result<(), DcrIOError> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub(crate) fn write_empty<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), DcrIOError> {
    writer.write_event(Event::Empty(
        BytesStart::new(name).with_attributes(attributes.iter().copied()),
    ))?;
    Ok(())
}

pub(crate) fn write_text_element<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), DcrIOError> {
    write_start(writer, name, &[])?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    write_end(writer, name)
}
