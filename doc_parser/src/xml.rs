//! Small helpers over `roxmltree` shared by the extractors.
//!
//! Elements are matched by local name so transitional and strict OOXML
//! namespaces are handled alike.

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::DocumentError;

pub const DEFAULT_NODES_LIMIT: u32 = 2_000_000;

/// Parses a part with DTDs disabled and a node ceiling.
pub fn parse<'a>(part: &str, text: &'a str, nodes_limit: u32) -> Result<Document<'a>, DocumentError> {
    let mut opt = ParsingOptions::default();
    opt.allow_dtd = false;
    opt.nodes_limit = nodes_limit;

    Document::parse_with_options(text, opt).map_err(|e| match e {
        roxmltree::Error::NodesLimitReached => DocumentError::QuotaExceeded(format!(
            "part '{part}' has more than {nodes_limit} XML nodes"
        )),
        other => DocumentError::malformed(part, other),
    })
}

/// Decodes raw part bytes, honouring a UTF-8 or UTF-16 byte order mark.
pub fn decode(part: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => utf8(part, rest),
        [0xFF, 0xFE, rest @ ..] => utf16(part, rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(part, rest, u16::from_be_bytes),
        _ => utf8(part, bytes),
    }
}

fn utf8(part: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| DocumentError::malformed(part, e))
}

fn utf16(part: &str, bytes: &[u8], conv: fn([u8; 2]) -> u16) -> Result<String, DocumentError> {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| conv([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|e| DocumentError::malformed(part, e))
}

pub fn is(node: Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local
}

pub fn child<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| is(*n, local))
}

pub fn children<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |n| is(*n, local))
}

pub fn descendant<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|n| is(*n, local))
}

pub fn count_descendants(node: Node, local: &str) -> usize {
    node.descendants().filter(|n| is(*n, local)).count()
}

/// Attribute lookup by local name, ignoring its namespace.
pub fn attr<'a>(node: Node<'a, '_>, local: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == local)
        .map(|a| a.value())
}

/// Relationship-id attribute (`r:id`, `r:embed`, ...), which always lives in a
/// relationships namespace.
pub fn rel_attr<'a>(node: Node<'a, '_>, local: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| {
            a.name() == local
                && a.namespace()
                    .is_some_and(|ns| ns.contains("relationships"))
        })
        .map(|a| a.value())
}

/// Concatenated text of every `<local>` descendant, e.g. `a:t` or `w:t`.
pub fn text_of(node: Node, local: &str) -> String {
    node.descendants()
        .filter(|n| is(*n, local))
        .filter_map(|n| n.text())
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_limit_is_quota_error() {
        let xml = format!("<r>{}</r>", "<a/>".repeat(50));
        let err = parse("big.xml", &xml, 10).unwrap_err();
        assert!(matches!(err, DocumentError::QuotaExceeded(_)));
    }

    #[test]
    fn dtd_is_rejected() {
        let xml = r#"<!DOCTYPE r [<!ENTITY x "boom">]><r>&x;</r>"#;
        assert!(matches!(
            parse("dtd.xml", xml, DEFAULT_NODES_LIMIT),
            Err(DocumentError::Malformed { .. })
        ));
    }

    #[test]
    fn decode_strips_bom_and_reads_utf16() {
        assert_eq!(decode("p", b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
        let utf16: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("<a/>".encode_utf16().flat_map(|u| u.to_le_bytes()))
            .collect();
        assert_eq!(decode("p", &utf16).unwrap(), "<a/>");
    }

    #[test]
    fn local_name_helpers() {
        let xml = r#"<w:body xmlns:w="urn:w" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p r:id="rId3"/>
        </w:body>"#;
        let doc = parse("doc", xml, DEFAULT_NODES_LIMIT).unwrap();
        let root = doc.root_element();
        assert_eq!(children(root, "p").count(), 2);
        assert_eq!(text_of(root, "t"), "Hello world");
        let second = children(root, "p").nth(1).unwrap();
        assert_eq!(rel_attr(second, "id"), Some("rId3"));
        assert_eq!(word_count("Hello  world\tagain"), 3);
    }
}
