//! Namespace-agnostic element lookups over a `roxmltree` document.
//!
//! KML in the wild mixes default namespaces, `kml:` prefixes and `gx:` extensions, so every
//! lookup here compares local names only.
use crate::error::Result;
use roxmltree::{Document, Node, ParsingOptions};

pub(crate) fn parse_document(text: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

pub(crate) fn is(node: Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

pub(crate) fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| is(*n, name))
}

pub(crate) fn children<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |n| is(*n, name))
}

/// Descendants named `name`, excluding `node` itself, in document order.
pub(crate) fn descendants<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.descendants().skip(1).filter(move |n| is(*n, name))
}

/// First descendant matching a child-combinator path, like the selector `Icon > href`.
pub(crate) fn select<'a, 'i>(node: Node<'a, 'i>, path: &[&str]) -> Option<Node<'a, 'i>> {
    let (last, parents) = path.split_last()?;
    node.descendants()
        .skip(1)
        .find(|n| is(*n, last) && parents_match(*n, parents))
}

fn parents_match(node: Node, parents: &[&str]) -> bool {
    let mut current = node;
    for name in parents.iter().rev() {
        match current.parent_element() {
            Some(parent) if is(parent, name) => current = parent,
            _ => return false,
        }
    }
    true
}

/// All text below `node`, CDATA included.
pub(crate) fn text_content(node: Node) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

/// Trimmed text of the first match of `path`, if non-empty.
pub(crate) fn select_text(node: Node, path: &[&str]) -> Option<String> {
    let text = text_content(select(node, path)?);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Trimmed text of a direct child, if non-empty.
pub(crate) fn child_text(node: Node, name: &str) -> Option<String> {
    let text = text_content(child(node, name)?);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parses a leading float the way lenient readers do: `" 12.5deg"` gives 12.5.
pub(crate) fn parse_leading_f64(text: &str) -> Option<f64> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit()
                || c == '.'
                || ((c == '-' || c == '+') && i == 0)
                || ((c == 'e' || c == 'E') && i > 0))
        })
        .map_or(text.len(), |(i, _)| i);
    (0..=end)
        .rev()
        .find_map(|cut| text[..cut].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
  <Document>
    <Placemark>
      <name>One</name>
      <description><![CDATA[<b>bold</b> text]]></description>
      <Style><IconStyle><heading>45</heading></IconStyle></Style>
      <Point><coordinates>1,2</coordinates></Point>
    </Placemark>
    <gx:PhotoOverlay><Icon><href>files/a.jpg</href></Icon></gx:PhotoOverlay>
  </Document>
</kml>"#;

    #[test]
    fn test_select_child_paths() {
        let doc = parse_document(DOC).unwrap();
        let root = doc.root_element();
        let placemark = descendants(root, "Placemark").next().unwrap();

        assert_eq!(
            select_text(placemark, &["Style", "IconStyle", "heading"]).as_deref(),
            Some("45")
        );
        assert_eq!(
            select_text(placemark, &["Point", "coordinates"]).as_deref(),
            Some("1,2")
        );
        assert!(select(placemark, &["Camera", "heading"]).is_none());
        assert!(
            select(placemark, &["Style", "heading"]).is_none(),
            "Child paths must not skip levels"
        );
    }

    #[test]
    fn test_prefixed_elements_match_by_local_name() {
        let doc = parse_document(DOC).unwrap();
        let overlay = descendants(doc.root_element(), "PhotoOverlay").next();
        assert!(overlay.is_some());
        assert_eq!(
            select_text(overlay.unwrap(), &["Icon", "href"]).as_deref(),
            Some("files/a.jpg")
        );
    }

    #[test]
    fn test_cdata_text() {
        let doc = parse_document(DOC).unwrap();
        let placemark = descendants(doc.root_element(), "Placemark").next().unwrap();
        assert_eq!(
            child_text(placemark, "description").as_deref(),
            Some("<b>bold</b> text")
        );
    }

    #[test]
    fn test_parse_leading_f64() {
        assert_eq!(parse_leading_f64(" 12.5 "), Some(12.5));
        assert_eq!(parse_leading_f64("-3deg"), Some(-3.0));
        assert_eq!(parse_leading_f64("1e2"), Some(100.0));
        assert_eq!(parse_leading_f64("abc"), None);
        assert_eq!(parse_leading_f64(""), None);
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(parse_document("<kml><unclosed></kml>").is_err());
    }
}
