//! XML ingestion.
//!
//! Filters arrive as XML text. Parsing is done with `roxmltree` with DTD support
//! switched off, so entity declarations (and with them entity expansion and
//! external entities) are rejected before any element is looked at. This is not
//! configurable.

use std::collections::BTreeMap;
use std::fmt;

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::{FesError, Result};

pub const FES20: &str = "http://www.opengis.net/fes/2.0";
pub const GML21: &str = "http://www.opengis.net/gml";
pub const GML32: &str = "http://www.opengis.net/gml/3.2";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";

/// A namespace-qualified name, displayed in Clark notation (`{ns}local`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            local: local.to_string(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

fn parsing_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: false,
        ..ParsingOptions::default()
    }
}

/// Parse XML text into a document tree.
pub fn parse_document(text: &str) -> Result<Document<'_>> {
    Ok(Document::parse_with_options(text, parsing_options())?)
}

/// Decode a raw request body. Only UTF-8 is accepted.
pub fn decode(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| FesError::MalformedXml(format!("input is not valid UTF-8: {e}")))
}

/// Add the FES and GML namespace bindings to a filter that declares none.
///
/// Plenty of clients send `<Filter><PropertyIsEqualTo>...` without any `xmlns`.
/// When the root start tag already declares a namespace the text is returned
/// untouched.
pub fn inject_default_namespaces(text: &str) -> String {
    let Some(name_end) = root_tag_name_end(text) else {
        return text.to_string();
    };
    let tag_end = text[name_end..].find('>').map_or(text.len(), |i| name_end + i);
    if text[name_end..tag_end].contains("xmlns") {
        return text.to_string();
    }

    let bindings = format!(
        r#" xmlns="{FES20}" xmlns:fes="{FES20}" xmlns:gml="{GML32}" xmlns:xs="{XSD}""#
    );
    let mut patched = String::with_capacity(text.len() + bindings.len());
    patched.push_str(&text[..name_end]);
    patched.push_str(&bindings);
    patched.push_str(&text[name_end..]);
    patched
}

/// Byte offset right after the root element's tag name.
fn root_tag_name_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('<') {
        let start = pos + offset + 1;
        match bytes.get(start) {
            Some(b'?') | Some(b'!') => pos = start,
            Some(_) => {
                let len = text[start..]
                    .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                    .unwrap_or(text.len() - start);
                return Some(start + len);
            }
            None => return None,
        }
    }
    None
}

/// Convenience accessors for the elements the productions read.
pub trait ElementExt<'a, 'input: 'a> {
    fn qname(&self) -> QName;
    /// Short form for error messages, e.g. `<PropertyIsEqualTo>`.
    fn describe(&self) -> String;
    fn child_elements(&self) -> Vec<Node<'a, 'input>>;
    fn attr(&self, name: &str) -> Option<&'a str>;
    fn required_attr(&self, name: &str) -> Result<&'a str>;
    /// All descendant text, trimmed.
    fn text_value(&self) -> String;
    /// Namespace prefixes in scope for this element (`""` is the default namespace).
    fn ns_aliases(&self) -> BTreeMap<String, String>;
    /// Resolve a prefixed name found in text or attribute content.
    fn resolve_prefixed(&self, value: &str) -> Result<QName>;
}

impl<'a, 'input: 'a> ElementExt<'a, 'input> for Node<'a, 'input> {
    fn qname(&self) -> QName {
        let tag = self.tag_name();
        QName::new(tag.namespace().unwrap_or(""), tag.name())
    }

    fn describe(&self) -> String {
        format!("<{}>", self.tag_name().name())
    }

    fn child_elements(&self) -> Vec<Node<'a, 'input>> {
        self.children().filter(|n| n.is_element()).collect()
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attribute(name)
    }

    fn required_attr(&self, name: &str) -> Result<&'a str> {
        self.attribute(name).ok_or_else(|| {
            FesError::parsing(format!(
                "{} is missing the required '{}' attribute",
                self.describe(),
                name
            ))
        })
    }

    fn text_value(&self) -> String {
        let text: String = self
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        text.trim().to_string()
    }

    fn ns_aliases(&self) -> BTreeMap<String, String> {
        self.namespaces()
            .map(|ns| (ns.name().unwrap_or("").to_string(), ns.uri().to_string()))
            .collect()
    }

    fn resolve_prefixed(&self, value: &str) -> Result<QName> {
        let value = value.trim();
        match value.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                    FesError::parsing(format!(
                        "{} uses undeclared namespace prefix '{}' in '{}'",
                        self.describe(),
                        prefix,
                        value
                    ))
                })?;
                Ok(QName::new(uri, local))
            }
            None => Ok(QName::new(
                self.lookup_namespace_uri(None).unwrap_or(""),
                value,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display() {
        assert_eq!(
            QName::new(FES20, "Filter").to_string(),
            "{http://www.opengis.net/fes/2.0}Filter"
        );
        assert_eq!(QName::new("", "Filter").to_string(), "Filter");
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let err = parse_document("<Filter><Unclosed></Filter>").unwrap_err();
        assert!(matches!(err, FesError::MalformedXml(_)));
    }

    #[test]
    fn test_rejects_dtd_and_entities() {
        let text = r#"<?xml version="1.0"?>
<!DOCTYPE lolz [<!ENTITY lol "lol"><!ENTITY lol2 "&lol;&lol;&lol;">]>
<Filter>&lol2;</Filter>"#;
        assert!(matches!(
            parse_document(text),
            Err(FesError::MalformedXml(_))
        ));

        let external = r#"<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><Filter>&xxe;</Filter>"#;
        assert!(parse_document(external).is_err());
    }

    #[test]
    fn test_inject_default_namespaces() {
        let patched = inject_default_namespaces("<Filter><ResourceId rid=\"a.1\"/></Filter>");
        let doc = parse_document(&patched).unwrap();
        let root = doc.root_element();
        assert_eq!(root.qname(), QName::new(FES20, "Filter"));
        let child = root.child_elements()[0];
        assert_eq!(child.qname(), QName::new(FES20, "ResourceId"));
    }

    #[test]
    fn test_xmlns_in_content_still_gets_namespaces() {
        let text = "<Filter><PropertyIsEqualTo><ValueReference>note</ValueReference>\
                    <Literal>see xmlns docs</Literal></PropertyIsEqualTo></Filter>";
        let patched = inject_default_namespaces(text);
        assert_ne!(patched, text);
        let doc = parse_document(&patched).unwrap();
        assert_eq!(doc.root_element().qname(), QName::new(FES20, "Filter"));

        let declared = format!(r#"<Filter xmlns="{FES20}"><ResourceId rid="a.1"/></Filter>"#);
        assert_eq!(inject_default_namespaces(&declared), declared);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode(b"<Filter/>").unwrap(), "<Filter/>");
        assert!(matches!(decode(&[b'<', 0xff, b'>']), Err(FesError::MalformedXml(_))));
    }

    #[test]
    fn test_inject_skips_prolog_and_keeps_declared() {
        let patched = inject_default_namespaces("<?xml version=\"1.0\"?>\n<fes:Filter/>");
        assert!(patched.contains("<fes:Filter xmlns="));

        let declared = format!("<Filter xmlns=\"{FES20}\"/>");
        assert_eq!(inject_default_namespaces(&declared), declared);
    }

    #[test]
    fn test_namespace_aliases_and_prefixed_text() {
        let text = format!(
            r#"<fes:Literal xmlns:fes="{FES20}" xmlns:xs="{XSD}" type="xs:integer">5</fes:Literal>"#
        );
        let doc = parse_document(&text).unwrap();
        let root = doc.root_element();
        let aliases = root.ns_aliases();
        assert_eq!(aliases.get("xs").map(String::as_str), Some(XSD));
        assert_eq!(
            root.resolve_prefixed(root.attr("type").unwrap()).unwrap(),
            QName::new(XSD, "integer")
        );
        assert!(root.resolve_prefixed("nope:integer").is_err());
        assert_eq!(root.text_value(), "5");
    }

    #[test]
    fn test_required_attr_message() {
        let doc = parse_document("<Distance>10</Distance>").unwrap();
        let err = doc.root_element().required_attr("uom").unwrap_err();
        assert_eq!(
            err.to_string(),
            "<Distance> is missing the required 'uom' attribute"
        );
    }
}
