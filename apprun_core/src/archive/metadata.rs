//! Archive metadata decoding.
//!
//! The metadata file is a small XML document whose top-level `package` element
//! describes the application. Decoding never fails the archive load: a
//! malformed document yields no metadata, and malformed descriptor fields are
//! reported as [`DescriptorField::Malformed`] instead of being folded into
//! "absent".

use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use tracing::warn;

/// Name of the package descriptor element.
pub const PACKAGE_ELEMENT: &str = "package";

const MAIN_MODULE_ATTR: &str = "main_module";
const FULL_DISK_ACCESS_ATTR: &str = "full_disk_access";

/// Why a metadata document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Invalid attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("Invalid attribute value: {0}")]
    Value(String),

    #[error("Unbalanced document: {0}")]
    Unbalanced(&'static str),
}

/// One element of the metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<MetadataElement>,
}

impl MetadataElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn first_child_element(&self, name: &str) -> Option<&MetadataElement> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// A parsed metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    elements: Vec<MetadataElement>,
}

impl MetadataDocument {
    /// Parse `text`. Any syntax error, or an element left open at end of input,
    /// makes the whole document malformed.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<MetadataElement> = Vec::new();
        let mut elements = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let element = element_from(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => elements.push(element),
                    }
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(MetadataError::Unbalanced("closing tag without opening tag"));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => elements.push(element),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(MetadataError::Unbalanced("unclosed element at end of document"));
        }
        Ok(Self { elements })
    }

    /// Decode `bytes`, logging and discarding a malformed document.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Ignoring metadata that is not valid UTF-8");
                return None;
            }
        };
        match Self::parse(text) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed metadata document");
                None
            }
        }
    }

    /// First top-level element called `name`.
    pub fn first_child_element(&self, name: &str) -> Option<&MetadataElement> {
        self.elements.iter().find(|element| element.name == name)
    }

    pub fn package_descriptor(&self) -> Option<PackageDescriptor> {
        self.first_child_element(PACKAGE_ELEMENT)
            .map(PackageDescriptor::from_element)
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<MetadataElement, MetadataError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MetadataError::Value(e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(MetadataElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

/// A descriptor attribute after typed decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorField<T> {
    Absent,
    Valid(T),
    Malformed { raw: String, reason: String },
}

impl<T> DescriptorField<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            DescriptorField::Valid(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, DescriptorField::Malformed { .. })
    }
}

/// The typed view of the `package` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Entry module, `None` when absent or empty.
    pub main_module: Option<String>,
    pub full_disk_access: DescriptorField<bool>,
    /// Every attribute as written, including the ones decoded above.
    pub attributes: BTreeMap<String, String>,
}

impl PackageDescriptor {
    pub fn from_element(element: &MetadataElement) -> Self {
        let main_module = element
            .attribute(MAIN_MODULE_ATTR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let full_disk_access = match element.attribute(FULL_DISK_ACCESS_ATTR) {
            None => DescriptorField::Absent,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(value) => DescriptorField::Valid(value != 0),
                Err(e) => DescriptorField::Malformed {
                    raw: raw.to_string(),
                    reason: e.to_string(),
                },
            },
        };

        Self {
            main_module,
            full_disk_access,
            attributes: element.attributes.clone(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.attributes.get("version").map(String::as_str)
    }

    /// The disk-access flag after applying this descriptor to `current`.
    pub fn apply_full_disk_access(&self, current: bool) -> bool {
        match &self.full_disk_access {
            DescriptorField::Valid(value) => *value,
            DescriptorField::Absent => current,
            DescriptorField::Malformed { raw, reason } => {
                warn!(
                    value = %raw,
                    reason = %reason,
                    "Ignoring malformed full_disk_access attribute"
                );
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_top_level_package_element() {
        let doc = MetadataDocument::parse(
            r#"<?xml version="1.0"?>
            <config><package name="inner"/></config>
            <package name="demo" main_module="game.start" full_disk_access="1">
              <requires name="panda3d"/>
            </package>
            <package name="second"/>"#,
        )
        .unwrap();

        let package = doc.package_descriptor().unwrap();
        assert_eq!(package.name(), Some("demo"));
        assert_eq!(package.main_module.as_deref(), Some("game.start"));
        assert_eq!(package.full_disk_access, DescriptorField::Valid(true));
        let element = doc.first_child_element(PACKAGE_ELEMENT).unwrap();
        assert_eq!(element.children.len(), 1);
    }

    #[test]
    fn test_full_disk_access_decoding() {
        let decode = |raw: &str| {
            let doc = MetadataDocument::parse(&format!(
                r#"<package full_disk_access="{raw}"/>"#
            ))
            .unwrap();
            doc.package_descriptor().unwrap().full_disk_access
        };

        assert_eq!(decode("1"), DescriptorField::Valid(true));
        assert_eq!(decode("0"), DescriptorField::Valid(false));
        assert_eq!(decode(" 2 "), DescriptorField::Valid(true));
        assert!(decode("yes").is_malformed());
        assert!(decode("").is_malformed());
    }

    #[test]
    fn test_apply_keeps_previous_value_unless_valid() {
        let absent = PackageDescriptor::from_element(&MetadataElement {
            name: "package".into(),
            ..Default::default()
        });
        assert!(absent.apply_full_disk_access(true));
        assert!(!absent.apply_full_disk_access(false));

        let mut malformed = absent.clone();
        malformed.full_disk_access = DescriptorField::Malformed {
            raw: "x".into(),
            reason: "invalid digit".into(),
        };
        assert!(!malformed.apply_full_disk_access(false));

        let mut off = absent;
        off.full_disk_access = DescriptorField::Valid(false);
        assert!(!off.apply_full_disk_access(true));
    }

    #[test]
    fn test_empty_main_module_is_absent() {
        let doc = MetadataDocument::parse(r#"<package main_module="  "/>"#).unwrap();
        assert_eq!(doc.package_descriptor().unwrap().main_module, None);
    }

    #[test]
    fn test_malformed_document_is_discarded() {
        assert!(MetadataDocument::decode(b"<package name=\"x\">").is_none());
        assert!(MetadataDocument::decode(b"<package></other>").is_none());
        assert!(MetadataDocument::decode(&[0xff, 0xfe]).is_none());
        assert!(MetadataDocument::decode(b"<other/>").unwrap().package_descriptor().is_none());
    }
}
