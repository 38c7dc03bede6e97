//! Build and serialise Ignition tag-import XML for UDT instances.
//!
//! The document shape is fixed:
//!
//! ```xml
//! <Tags MinVersion="8.0.0" locale="en_US"><Tag name="Tank1" type="UdtInstance"><Property name="typeId">P_AIn</Property>
//! <Parameters><Property name="PLC" type="String">Line1</Property>
//! </Parameters>
//! </Tag>
//! </Tags>
//! ```

use std::io::Write;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use tracing::debug;

/// Root element name.
pub const ROOT_ELEMENT: &str = "Tags";
/// Element describing one tag.
pub const TAG_ELEMENT: &str = "Tag";
/// Value node element, used for `typeId` and for every parameter.
pub const PROPERTY_ELEMENT: &str = "Property";
/// Container for the parameter properties of a tag.
pub const PARAMETERS_ELEMENT: &str = "Parameters";
/// `type` attribute carried by every tag element.
pub const INSTANCE_TYPE: &str = "UdtInstance";
/// `type` attribute carried by every parameter property.
pub const PARAMETER_TYPE: &str = "String";
/// `name` of the property that holds the UDT type.
pub const TYPE_ID_PROPERTY: &str = "typeId";
/// Oldest Ignition release able to import the document.
pub const DEFAULT_MIN_VERSION: &str = "8.0.0";
/// Locale stamped on the root element.
pub const DEFAULT_LOCALE: &str = "en_US";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error("serialised document is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Owned XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child element named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// One UDT instance to be described in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtInstance {
    /// UDT/AOI type name written to `typeId`.
    pub type_name: String,
    /// Concrete tag path, including array indices.
    pub instance_name: String,
    /// Parameters in the order they should appear.
    pub parameters: Vec<(String, String)>,
}

impl UdtInstance {
    pub fn new(type_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }
}

/// In-memory tag-import document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsDocument {
    root: Element,
}

impl TagsDocument {
    /// The `Tags` root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Tag elements in document order.
    pub fn tags(&self) -> &[Element] {
        &self.root.children
    }

    pub fn into_root(self) -> Element {
        self.root
    }
}

/// Root attributes Ignition expects on an import file.
pub fn default_root_attributes() -> Vec<(String, String)> {
    vec![
        ("MinVersion".to_string(), DEFAULT_MIN_VERSION.to_string()),
        ("locale".to_string(), DEFAULT_LOCALE.to_string()),
    ]
}

/// Assemble the document: one `Tag` per instance, in input order.
pub fn build<K, V>(root_attributes: &[(K, V)], instances: &[UdtInstance]) -> TagsDocument
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = Element::new(ROOT_ELEMENT);
    for (key, value) in root_attributes {
        root = root.with_attribute(key.as_ref(), value.as_ref());
    }
    root.children.reserve(instances.len());
    for instance in instances {
        root.children.push(tag_element(instance));
    }
    debug!(tags = root.children.len(), "built tag document");
    TagsDocument { root }
}

fn tag_element(instance: &UdtInstance) -> Element {
    let type_id = Element::new(PROPERTY_ELEMENT)
        .with_attribute("name", TYPE_ID_PROPERTY)
        .with_text(instance.type_name.as_str());
    let parameters = instance
        .parameters
        .iter()
        .fold(Element::new(PARAMETERS_ELEMENT), |params, (key, value)| {
            params.with_child(
                Element::new(PROPERTY_ELEMENT)
                    .with_attribute("name", key.as_str())
                    .with_attribute("type", PARAMETER_TYPE)
                    .with_text(value.as_str()),
            )
        });
    Element::new(TAG_ELEMENT)
        .with_attribute("name", instance.instance_name.as_str())
        .with_attribute("type", INSTANCE_TYPE)
        .with_child(type_id)
        .with_child(parameters)
}

/// Serialise the document as UTF-8 without an XML declaration.
///
/// Empty elements are written as a start/end pair, never self-closed, and
/// every element below the root is followed by a newline.
pub fn write_document<W: Write>(document: &TagsDocument, out: W) -> Result<W, XmlError> {
    let mut writer = Writer::new(out);
    write_element(&mut writer, &document.root, 0)?;
    Ok(writer.into_inner())
}

/// Serialise the document into a `String`.
pub fn to_string(document: &TagsDocument) -> Result<String, XmlError> {
    let bytes = write_document(document, Vec::new())?;
    Ok(String::from_utf8(bytes)?)
}

fn write_element<W: Write>(
    writer: &mut Writer<W>,
    element: &Element,
    depth: usize,
) -> Result<(), XmlError> {
    let start = BytesStart::new(element.name.as_str()).with_attributes(
        element
            .attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    );
    writer.write_event(Event::Start(start))?;
    if let Some(text) = element.text.as_deref() {
        writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
    }
    for child in &element.children {
        write_element(writer, child, depth + 1)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    if depth > 0 {
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single() -> TagsDocument {
        let instances = [UdtInstance::new("T1", "A[0]").with_parameter("PLC", "Unit1")];
        build(&default_root_attributes(), &instances)
    }

    #[test]
    fn single_instance_tree() {
        let doc = single();
        assert_eq!(doc.root().name, "Tags");
        assert_eq!(doc.root().attribute("MinVersion"), Some("8.0.0"));
        assert_eq!(doc.root().attribute("locale"), Some("en_US"));
        assert_eq!(doc.tags().len(), 1);

        let tag = &doc.tags()[0];
        assert_eq!(tag.attribute("name"), Some("A[0]"));
        assert_eq!(tag.attribute("type"), Some("UdtInstance"));

        let type_id = tag.child("Property").expect("typeId property");
        assert_eq!(type_id.attribute("name"), Some("typeId"));
        assert_eq!(type_id.text.as_deref(), Some("T1"));

        let params = tag.child("Parameters").expect("parameters");
        assert_eq!(params.children.len(), 1);
        assert_eq!(params.children[0].attribute("name"), Some("PLC"));
        assert_eq!(params.children[0].attribute("type"), Some("String"));
        assert_eq!(params.children[0].text.as_deref(), Some("Unit1"));
    }

    #[test]
    fn serialised_layout_is_exact() {
        let xml = to_string(&single()).expect("serialise");
        let expected = concat!(
            r#"<Tags MinVersion="8.0.0" locale="en_US">"#,
            r#"<Tag name="A[0]" type="UdtInstance">"#,
            r#"<Property name="typeId">T1</Property>"#,
            "\n",
            r#"<Parameters><Property name="PLC" type="String">Unit1</Property>"#,
            "\n",
            "</Parameters>\n",
            "</Tag>\n",
            "</Tags>",
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn no_declaration_and_no_self_closing() {
        let instances = [UdtInstance::new("T1", "Lonely")];
        let xml = to_string(&build(&default_root_attributes(), &instances)).expect("serialise");
        assert!(!xml.starts_with("<?xml"));
        assert!(!xml.contains("/>"));
        assert!(xml.contains("<Parameters></Parameters>"));
    }

    #[test]
    fn empty_document_keeps_root_pair() {
        let xml = to_string(&build(&default_root_attributes(), &[])).expect("serialise");
        assert_eq!(xml, r#"<Tags MinVersion="8.0.0" locale="en_US"></Tags>"#);
    }

    #[test]
    fn order_follows_input() {
        let instances = [
            UdtInstance::new("T", "B")
                .with_parameter("Zeta", "1")
                .with_parameter("Alpha", "2"),
            UdtInstance::new("T", "A"),
        ];
        let doc = build(&default_root_attributes(), &instances);
        let names: Vec<_> = doc.tags().iter().filter_map(|t| t.attribute("name")).collect();
        assert_eq!(names, ["B", "A"]);
        let params = doc.tags()[0].child("Parameters").expect("parameters");
        let keys: Vec<_> = params
            .children
            .iter()
            .filter_map(|p| p.attribute("name"))
            .collect();
        assert_eq!(keys, ["Zeta", "Alpha"]);
    }

    #[test]
    fn text_is_escaped() {
        let instances = [UdtInstance::new("T", "X").with_parameter("PLC", "A&B <1>")];
        let xml = to_string(&build(&default_root_attributes(), &instances)).expect("serialise");
        assert!(xml.contains(">A&amp;B &lt;1&gt;</Property>"));
    }

    #[test]
    fn write_document_returns_sink() {
        let buffer = write_document(&single(), Vec::new()).expect("write");
        assert!(buffer.starts_with(b"<Tags "));
        assert!(buffer.ends_with(b"</Tags>"));
    }

    #[derive(Debug)]
    struct FullSink;

    impl Write for FullSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_surfaces_as_xml_error() {
        let err = write_document(&single(), FullSink).expect_err("sink refuses writes");
        assert!(matches!(err, XmlError::Xml(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
