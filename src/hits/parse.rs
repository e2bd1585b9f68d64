//! Parsing and validation of the HIT definition XML. A `<hits>` document
//! contains `<hit>` elements; each `<hit>` carries batch-level attributes
//! and one `<seg>` child per ranking item with a `<source>`, an optional
//! `<reference>` and an ordered list of `<translation>` elements whose
//! `system` attribute names the contributing system (comma-joined when
//! several systems produced the same output).

use indexmap::IndexMap;
use thiserror::Error;

pub type AttributeMap = IndexMap<String, String>;

pub const HIT_REQUIRED_ATTRIBUTES: &[&str] =
    &["block-id", "source-language", "target-language"];

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("syntax error: {0}")]
    Syntax(#[from] roxmltree::Error),
    #[error("invalid XML: {0}")]
    Invalid(String),
}

/// Derived fields of one ranking item. All fields are recomputed from the
/// stored XML on every call to [`item_fields`]; a malformed document yields
/// the (empty) default so that callers can detect an invalid record without
/// crashing.
#[derive(Clone, Debug, Default)]
pub struct ItemFields {
    pub attributes: AttributeMap,
    pub source: Option<(String, AttributeMap)>,
    pub reference: Option<(String, AttributeMap)>,
    pub translations: Vec<(String, AttributeMap)>,
}

impl ItemFields {
    /// The `id` attribute of the source segment, or "-1" when absent. This
    /// is the 1-indexed source index used throughout the CSV exports.
    pub fn source_index(&self) -> String {
        self.source
            .as_ref()
            .and_then(|(_, attrs)| attrs.get("id").cloned())
            .unwrap_or_else(|| "-1".to_string())
    }

    /// Comma-joined system names per translation slot, in document order.
    pub fn systems(&self) -> Vec<String> {
        self.translations
            .iter()
            .map(|(_, attrs)| attrs.get("system").cloned().unwrap_or_default())
            .collect()
    }
}

fn attribute_map(node: roxmltree::Node) -> AttributeMap {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

/// Batch-level attribute map of a HIT. Parse failures are reported in-band
/// through a synthetic `error` attribute holding the parser message, so
/// that downstream code can surface the problem without panicking.
pub fn hit_attributes(hit_xml: &str) -> AttributeMap {
    match roxmltree::Document::parse(hit_xml) {
        Ok(doc) => attribute_map(doc.root_element()),
        Err(err) => {
            let mut attributes = AttributeMap::new();
            attributes.insert("error".to_string(), err.to_string());
            attributes
        }
    }
}

/// Derived fields of an item, recomputed from scratch. Never fails; a
/// malformed document produces empty fields.
pub fn item_fields(item_xml: &str) -> ItemFields {
    let doc = match roxmltree::Document::parse(item_xml) {
        Ok(doc) => doc,
        Err(_) => return ItemFields::default(),
    };
    let root = doc.root_element();

    let text_and_attrs = |node: roxmltree::Node| {
        (
            node.text().unwrap_or_default().to_string(),
            attribute_map(node),
        )
    };

    ItemFields {
        attributes: attribute_map(root),
        source: root
            .children()
            .find(|c| c.has_tag_name("source"))
            .map(text_and_attrs),
        reference: root
            .children()
            .find(|c| c.has_tag_name("reference"))
            .map(text_and_attrs),
        translations: root
            .children()
            .filter(|c| c.has_tag_name("translation"))
            .map(text_and_attrs)
            .collect(),
    }
}

/// Splits a `<hit>` document into the serialized XML of its `<seg>`
/// children, in document order. Used when synthesizing the per-item rows
/// at HIT creation time.
pub fn split_hit(hit_xml: &str) -> Result<Vec<String>, XmlError> {
    let doc = roxmltree::Document::parse(hit_xml)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|c| c.is_element())
        .map(serialize_node)
        .collect())
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}

fn serialize_node(node: roxmltree::Node) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: roxmltree::Node, out: &mut String) {
    out.push('<');
    out.push_str(node.tag_name().name());
    for attr in node.attributes() {
        out.push(' ');
        out.push_str(attr.name());
        out.push_str("=\"");
        out.push_str(&escape_attr(attr.value()));
        out.push('"');
    }
    let children: Vec<_> = node
        .children()
        .filter(|c| c.is_element() || c.is_text())
        .collect();
    if children.is_empty() {
        out.push_str(" />");
        return;
    }
    out.push('>');
    for child in children {
        if child.is_element() {
            write_node(child, out);
        } else if let Some(text) = child.text() {
            out.push_str(&escape_text(text));
        }
    }
    out.push_str("</");
    out.push_str(node.tag_name().name());
    out.push('>');
}

/// Validates a full `<hits>` import document.
pub fn validate_hits_document(xml: &str) -> Result<(), XmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if !root.has_tag_name("hits") {
        return Err(XmlError::Invalid(format!(
            "expected <hits> on top-level, found <{}>",
            root.tag_name().name()
        )));
    }
    for child in root.children().filter(|c| c.is_element()) {
        validate_hit_node(child)?;
    }
    Ok(())
}

/// Validates a single `<hit>` document.
pub fn validate_hit(xml: &str) -> Result<(), XmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    validate_hit_node(doc.root_element())
}

fn validate_hit_node(node: roxmltree::Node) -> Result<(), XmlError> {
    if !node.has_tag_name("hit") {
        return Err(XmlError::Invalid(format!(
            "expected <hit>, found <{}>",
            node.tag_name().name()
        )));
    }
    for attr in HIT_REQUIRED_ATTRIBUTES {
        if node.attribute(*attr).is_none() {
            return Err(XmlError::Invalid(format!(
                "missing required <hit> attribute {attr}"
            )));
        }
    }
    let block_id = node.attribute("block-id").unwrap();
    if block_id.parse::<i64>().is_err() {
        return Err(XmlError::Invalid(format!(
            "invalid block-id: \"{block_id}\""
        )));
    }
    let mut segments = 0;
    for seg in node.children().filter(|c| c.is_element()) {
        validate_segment_node(seg)?;
        segments += 1;
    }
    if segments == 0 {
        return Err(XmlError::Invalid(
            "expected at least one <seg> child".to_string(),
        ));
    }
    Ok(())
}

/// Validates a single `<seg>` document.
pub fn validate_segment(xml: &str) -> Result<(), XmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    validate_segment_node(doc.root_element())
}

fn validate_segment_node(node: roxmltree::Node) -> Result<(), XmlError> {
    if !node.has_tag_name("seg") {
        return Err(XmlError::Invalid(format!(
            "illegal tag: \"{}\"",
            node.tag_name().name()
        )));
    }

    let elements = |name: &'static str| {
        node.children()
            .filter(move |c| c.has_tag_name(name))
            .collect::<Vec<_>>()
    };

    let sources = elements("source");
    if sources.len() != 1 {
        return Err(XmlError::Invalid(
            "exactly one <source> element expected".to_string(),
        ));
    }
    if sources[0].text().unwrap_or("").is_empty() {
        return Err(XmlError::Invalid(
            "missing required <source> text value".to_string(),
        ));
    }

    if elements("reference").len() > 1 {
        return Err(XmlError::Invalid(
            "at most one <reference> element expected".to_string(),
        ));
    }

    let translations = elements("translation");
    if translations.is_empty() {
        return Err(XmlError::Invalid(
            "one or more <translation> elements expected".to_string(),
        ));
    }
    for translation in translations {
        if translation.text().unwrap_or("").is_empty() {
            return Err(XmlError::Invalid(
                "missing required <translation> text value".to_string(),
            ));
        }
        if translation.attribute("system").is_none() {
            return Err(XmlError::Invalid(
                "missing \"system\" attribute on <translation>".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures;

    #[test]
    fn hit_attributes_are_parsed_in_document_order() {
        let attributes = hit_attributes(fixtures::HIT_XML);
        assert_eq!(attributes["block-id"], "17");
        assert_eq!(attributes["source-language"], "ces");
        assert_eq!(attributes["target-language"], "eng");
        assert!(!attributes.contains_key("error"));
    }

    #[test]
    fn malformed_hit_xml_yields_error_attribute() {
        let attributes = hit_attributes("<hit block-id=17>");
        assert_eq!(attributes.len(), 1);
        assert!(attributes.contains_key("error"));
    }

    #[test]
    fn split_yields_one_item_per_seg() {
        let items = split_hit(fixtures::HIT_XML).unwrap();
        assert_eq!(items.len(), 3);
        for item in &items {
            assert!(item.starts_with("<seg"));
            assert!(item_fields(item).source.is_some());
        }
    }

    #[test]
    fn item_fields_carry_source_reference_and_translations() {
        let items = split_hit(fixtures::HIT_XML).unwrap();
        let fields = item_fields(&items[0]);
        assert_eq!(fields.source_index(), "3");
        assert!(fields.reference.is_some());
        assert_eq!(fields.translations.len(), 5);
        assert_eq!(
            fields.systems(),
            vec!["sysA", "sysB", "sysC", "sysD", "sysE"]
        );
    }

    #[test]
    fn malformed_item_xml_yields_empty_fields() {
        let fields = item_fields("<seg><source>");
        assert!(fields.source.is_none());
        assert!(fields.reference.is_none());
        assert!(fields.translations.is_empty());
    }

    #[test]
    fn item_reparse_is_idempotent() {
        let items = split_hit(fixtures::HIT_XML).unwrap();
        let once = item_fields(&items[1]);
        let twice = item_fields(&items[1]);
        assert_eq!(once.source, twice.source);
        assert_eq!(once.translations, twice.translations);
    }

    #[test]
    fn validators_accept_the_fixture() {
        assert!(validate_hit(fixtures::HIT_XML).is_ok());
        assert!(validate_hits_document(&format!(
            "<hits>{}</hits>",
            fixtures::HIT_XML
        ))
        .is_ok());
    }

    #[test]
    fn validators_reject_missing_attributes() {
        let err = validate_hit(
            "<hit block-id=\"1\"><seg>\
             <source id=\"1\">x</source>\
             <translation system=\"a\">y</translation></seg></hit>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("source-language"));
    }

    #[test]
    fn validators_reject_bad_block_id() {
        let err = validate_hit(
            "<hit block-id=\"abc\" source-language=\"ces\" \
             target-language=\"eng\"><seg>\
             <source id=\"1\">x</source>\
             <translation system=\"a\">y</translation></seg></hit>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("block-id"));
    }

    #[test]
    fn validators_reject_translation_without_system() {
        let err = validate_segment(
            "<seg><source id=\"1\">x</source>\
             <translation>y</translation></seg>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("system"));
    }
}
