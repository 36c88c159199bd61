//! XML bytes → [`TreeNode`].

use encoding_rs::{Encoding, WINDOWS_1252};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::bytes::Regex;

use fieldaudit_recon::TreeNode;

use crate::error::IoError;

/// How far into the file the XML declaration is looked for.
const DECLARATION_WINDOW: usize = 1024;

static DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#)
        .expect("valid declaration regex")
});

/// Decode and parse a whole document.
pub fn parse_document(bytes: &[u8]) -> Result<TreeNode, IoError> {
    let text = decode_document(bytes)?;
    parse_tree(&text)
}

/// Decode document bytes to UTF-8.
///
/// A byte order mark wins, then the `encoding` of the XML declaration.
/// Undeclared input that is not valid UTF-8 is read as Windows-1252.
pub fn decode_document(bytes: &[u8]) -> Result<String, IoError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(IoError::Encoding(format!("invalid {} byte sequence", encoding.name())));
        }
        return Ok(text.into_owned());
    }

    match declared_encoding(bytes)? {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                return Err(IoError::Encoding(format!(
                    "content is not valid {} as declared",
                    encoding.name()
                )));
            }
            Ok(text.into_owned())
        }
        None => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => {
                log::debug!("undeclared non-UTF-8 document, decoding as windows-1252");
                let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
                Ok(decoded.into_owned())
            }
        },
    }
}

fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>, IoError> {
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    let Some(label) = DECLARED_ENCODING.captures(head).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    match Encoding::for_label(label.as_bytes()) {
        // An ASCII-readable declaration cannot be UTF-16 content.
        Some(encoding) => Ok(Some(encoding.output_encoding())),
        None => Err(IoError::Encoding(format!(
            "unknown encoding '{}'",
            String::from_utf8_lossy(label.as_bytes())
        ))),
    }
}

/// An element whose end tag has not been seen yet.
struct OpenElement {
    node: TreeNode,
    /// A child element closed since the last text piece.
    after_child: bool,
}

impl OpenElement {
    fn new(node: TreeNode) -> Self {
        Self { node, after_child: false }
    }

    /// Append a text piece to the direct text. Pieces on either side of a
    /// child element are kept apart by one space; character data split by
    /// entity references is joined as written.
    fn append_text(&mut self, piece: &str) {
        let text = self.node.text.get_or_insert_with(String::new);
        let touching = text.ends_with(|c: char| !c.is_whitespace())
            && piece.starts_with(|c: char| !c.is_whitespace());
        if self.after_child && touching {
            text.push(' ');
        }
        text.push_str(piece);
        self.after_child = false;
    }
}

/// Build the element tree with an explicit stack of open elements.
///
/// Text and CDATA pieces that are direct children of an element make up its
/// `text`. Entity references are expanded.
pub fn parse_tree(xml: &str) -> Result<TreeNode, IoError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut open: Vec<OpenElement> = Vec::new();
    let mut root: Option<TreeNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if root.is_some() && open.is_empty() {
                    return Err(IoError::Xml("more than one root element".into()));
                }
                open.push(OpenElement::new(element(e)));
            }
            Ok(Event::Empty(ref e)) => {
                let node = element(e);
                match open.last_mut() {
                    Some(parent) => add_child(parent, node),
                    None if root.is_none() => root = Some(node),
                    None => return Err(IoError::Xml("more than one root element".into())),
                }
            }
            Ok(Event::End(_)) => {
                let Some(closed) = open.pop() else {
                    return Err(IoError::Xml("unexpected closing tag".into()));
                };
                match open.last_mut() {
                    Some(parent) => add_child(parent, closed.node),
                    None => root = Some(closed.node),
                }
            }
            Ok(Event::Text(ref e)) => {
                append_text(&mut open, &String::from_utf8_lossy(e));
            }
            Ok(Event::CData(ref e)) => {
                append_text(&mut open, &String::from_utf8_lossy(e));
            }
            Ok(Event::GeneralRef(ref e)) => {
                let expanded = match e.resolve_char_ref() {
                    Ok(Some(c)) => c.to_string(),
                    _ => {
                        let name = String::from_utf8_lossy(e);
                        predefined_entity(&name)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("&{name};"))
                    }
                };
                append_text(&mut open, &expanded);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IoError::Xml(format!("{e} at byte {}", reader.error_position())));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(IoError::Xml(format!("unexpected end of input inside <{}>", unclosed.node.name)));
    }
    root.ok_or_else(|| IoError::Xml("document has no root element".into()))
}

fn element(e: &BytesStart<'_>) -> TreeNode {
    let mut node = TreeNode::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = unescape_xml(&String::from_utf8_lossy(&attr.value));
        node.attributes.push((key, value));
    }
    node
}

fn add_child(parent: &mut OpenElement, child: TreeNode) {
    parent.node.children.push(child);
    parent.after_child = true;
}

fn append_text(open: &mut [OpenElement], piece: &str) {
    // Text outside the root element is ignored.
    if let Some(current) = open.last_mut() {
        current.append_text(piece);
    }
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        _ => None,
    }
}

/// Unescape the 5 predefined XML entities: &amp; &lt; &gt; &quot; &apos;
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
