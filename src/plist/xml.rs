/*!
 Logic used to deserialize data from the XML property-list encoding.

 The grammar is the Apple `PLIST 1.0` DTD: a `<plist>` root wrapping a single
 value, where dictionaries alternate `<key>` and value children. The DTD itself
 is never fetched; the structure is enforced here on top of a pull lexer.
*/

use base64::{prelude::BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use maybe_xml::{token::Ty, Reader};

use crate::{
    error::plist::PlistError,
    plist::models::{Dictionary, Node},
};

/// The structural XML events the property-list grammar cares about
#[derive(Debug, Clone, PartialEq, Eq)]
enum XmlEvent {
    /// An opening tag, by element name
    Start(String),
    /// A closing tag, by element name
    End(String),
    /// A self-closing tag, by element name
    Empty(String),
    /// Character or CDATA content, entities already decoded
    Text(String),
}

/// Contains logic and data used to deserialize XML property-list data.
///
/// The input is lexed into [`XmlEvent`]s up front (declarations, comments, and
/// processing instructions are dropped), then consumed by a recursive-descent
/// parser over element names.
#[derive(Debug)]
pub struct XmlPlistReader {
    /// The lexed event stream
    events: Vec<XmlEvent>,
    /// The current index we are at in the event stream
    idx: usize,
}

impl XmlPlistReader {
    /// Given a buffer, construct a reader instance to parse it.
    ///
    /// Fails if the buffer is not valid UTF-8. A leading byte-order mark is
    /// tolerated.
    pub fn from(buf: &[u8]) -> Result<Self, PlistError> {
        let text = std::str::from_utf8(buf)
            .map_err(|_| PlistError::MalformedFormat("document is not valid UTF-8".to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(Self {
            events: lex(text)?,
            idx: 0,
        })
    }

    /// Parse the document into a node tree.
    ///
    /// The root element must be `<plist>` with exactly one value child, and
    /// nothing but whitespace may follow it.
    pub fn parse(&mut self) -> Result<Node, PlistError> {
        match self.next_structural() {
            Some(XmlEvent::Start(name)) if name == "plist" => {}
            _ => {
                return Err(PlistError::MalformedFormat(
                    "expected a <plist> root element".to_string(),
                ))
            }
        }
        let root = self.parse_value()?;
        self.expect_end("plist")?;
        if self.next_structural().is_some() {
            return Err(PlistError::MalformedFormat(
                "content after </plist>".to_string(),
            ));
        }
        Ok(root)
    }

    /// Take the next event verbatim
    fn next_event(&mut self) -> Option<XmlEvent> {
        let event = self.events.get(self.idx).cloned();
        if event.is_some() {
            self.idx += 1;
        }
        event
    }

    /// Take the next event that is not whitespace-only text
    fn next_structural(&mut self) -> Option<XmlEvent> {
        loop {
            match self.next_event() {
                Some(XmlEvent::Text(text)) if text.trim().is_empty() => {}
                other => return other,
            }
        }
    }

    /// Consume the closing tag of `name`
    fn expect_end(&mut self, name: &str) -> Result<(), PlistError> {
        match self.next_structural() {
            Some(XmlEvent::End(found)) if found == name => Ok(()),
            _ => Err(PlistError::MalformedFormat(format!("expected </{name}>"))),
        }
    }

    /// Accumulate text content until the closing tag of `name`
    fn text_until_end(&mut self, name: &str) -> Result<String, PlistError> {
        let mut out = String::new();
        loop {
            match self.next_event() {
                Some(XmlEvent::Text(text)) => out.push_str(&text),
                Some(XmlEvent::End(found)) if found == name => return Ok(out),
                Some(XmlEvent::Start(found)) | Some(XmlEvent::Empty(found)) => {
                    return Err(PlistError::MalformedFormat(format!(
                        "unexpected <{found}> inside <{name}>"
                    )))
                }
                _ => {
                    return Err(PlistError::MalformedFormat(format!(
                        "unterminated <{name}>"
                    )))
                }
            }
        }
    }

    /// Parse the next value element in the stream
    fn parse_value(&mut self) -> Result<Node, PlistError> {
        match self.next_structural() {
            Some(XmlEvent::Start(name)) => self.parse_element(&name),
            Some(XmlEvent::Empty(name)) => empty_element(&name),
            _ => Err(PlistError::MalformedFormat(
                "expected a value element".to_string(),
            )),
        }
    }

    /// Parse an opened element into a node
    fn parse_element(&mut self, name: &str) -> Result<Node, PlistError> {
        match name {
            "dict" => self.parse_dict(),
            "array" => self.parse_array(),
            "string" => Ok(Node::String(self.text_until_end("string")?)),
            "integer" => {
                let text = self.text_until_end("integer")?;
                let value = text.trim().parse::<i128>().map_err(|_| {
                    PlistError::MalformedFormat(format!("invalid integer \"{}\"", text.trim()))
                })?;
                Ok(Node::integer(value))
            }
            "real" => {
                let text = self.text_until_end("real")?;
                let value = text.trim().parse::<f64>().map_err(|_| {
                    PlistError::MalformedFormat(format!("invalid real \"{}\"", text.trim()))
                })?;
                Ok(Node::real(value))
            }
            "date" => {
                let text = self.text_until_end("date")?;
                let instant = DateTime::parse_from_rfc3339(text.trim()).map_err(|_| {
                    PlistError::MalformedFormat(format!("invalid date \"{}\"", text.trim()))
                })?;
                Ok(Node::Date(instant.with_timezone(&Utc)))
            }
            "data" => {
                let text = self.text_until_end("data")?;
                Ok(Node::Data(decode_base64(&text)?))
            }
            "true" => self.parse_literal("true", Node::Boolean(true)),
            "false" => self.parse_literal("false", Node::Boolean(false)),
            "key" => Err(PlistError::MalformedFormat(
                "<key> outside of <dict>".to_string(),
            )),
            other => Err(PlistError::MalformedFormat(format!(
                "unrecognized element <{other}>"
            ))),
        }
    }

    /// `<true>` and `<false>` carry no content
    fn parse_literal(&mut self, name: &str, node: Node) -> Result<Node, PlistError> {
        let text = self.text_until_end(name)?;
        if !text.trim().is_empty() {
            return Err(PlistError::MalformedFormat(format!(
                "unexpected content in <{name}>"
            )));
        }
        Ok(node)
    }

    /// Parse alternating `<key>` and value children until `</dict>`
    fn parse_dict(&mut self) -> Result<Node, PlistError> {
        let mut entries = Dictionary::new();
        loop {
            let key = match self.next_structural() {
                Some(XmlEvent::End(name)) if name == "dict" => {
                    return Ok(Node::Dictionary(entries))
                }
                Some(XmlEvent::Start(name)) if name == "key" => self.text_until_end("key")?,
                Some(XmlEvent::Empty(name)) if name == "key" => String::new(),
                _ => {
                    return Err(PlistError::MalformedFormat(
                        "expected <key> in <dict>".to_string(),
                    ))
                }
            };
            if key.is_empty() {
                return Err(PlistError::MalformedFormat(
                    "empty dictionary key".to_string(),
                ));
            }

            let value = match self.next_structural() {
                Some(XmlEvent::Start(name)) => self.parse_element(&name)?,
                Some(XmlEvent::Empty(name)) => empty_element(&name)?,
                Some(XmlEvent::End(name)) if name == "dict" => {
                    return Err(PlistError::MalformedFormat(format!(
                        "dictionary key \"{key}\" has no value"
                    )))
                }
                _ => {
                    return Err(PlistError::MalformedFormat(
                        "unterminated <dict>".to_string(),
                    ))
                }
            };

            if entries.insert(key.clone(), value).is_some() {
                return Err(PlistError::MalformedFormat(format!(
                    "duplicate dictionary key \"{key}\""
                )));
            }
        }
    }

    /// Parse value children until `</array>`
    fn parse_array(&mut self) -> Result<Node, PlistError> {
        let mut items = vec![];
        loop {
            match self.next_structural() {
                Some(XmlEvent::End(name)) if name == "array" => return Ok(Node::Array(items)),
                Some(XmlEvent::Start(name)) => items.push(self.parse_element(&name)?),
                Some(XmlEvent::Empty(name)) => items.push(empty_element(&name)?),
                _ => {
                    return Err(PlistError::MalformedFormat(
                        "unterminated <array>".to_string(),
                    ))
                }
            }
        }
    }
}

/// Map a self-closing element onto its value
fn empty_element(name: &str) -> Result<Node, PlistError> {
    match name {
        "true" => Ok(Node::Boolean(true)),
        "false" => Ok(Node::Boolean(false)),
        "dict" => Ok(Node::Dictionary(Dictionary::new())),
        "array" => Ok(Node::Array(vec![])),
        "string" => Ok(Node::String(String::new())),
        "data" => Ok(Node::Data(vec![])),
        "integer" | "real" | "date" => {
            Err(PlistError::MalformedFormat(format!("empty <{name}>")))
        }
        "key" => Err(PlistError::MalformedFormat(
            "<key> outside of <dict>".to_string(),
        )),
        other => Err(PlistError::MalformedFormat(format!(
            "unrecognized element <{other}>"
        ))),
    }
}

/// Lex the document into structural events, decoding entities in character data
fn lex(text: &str) -> Result<Vec<XmlEvent>, PlistError> {
    let reader = Reader::from_str(text);
    let mut events = vec![];
    for token in reader.into_iter() {
        match token.ty() {
            Ty::StartTag(tag) => events.push(XmlEvent::Start(tag.name().as_str().to_string())),
            Ty::EmptyElementTag(tag) => {
                events.push(XmlEvent::Empty(tag.name().as_str().to_string()))
            }
            Ty::EndTag(tag) => events.push(XmlEvent::End(tag.name().as_str().to_string())),
            Ty::Characters(characters) => events.push(XmlEvent::Text(decode_entities(
                characters.content().as_str(),
            )?)),
            Ty::Cdata(cdata) => events.push(XmlEvent::Text(cdata.content().as_str().to_string())),
            // Declarations, comments, and processing instructions carry no plist structure
            _ => {}
        }
    }
    Ok(events)
}

/// Decode the five predefined XML entities plus numeric character references
fn decode_entities(text: &str) -> Result<String, PlistError> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find(';').ok_or_else(|| {
            PlistError::MalformedFormat("unterminated entity reference".to_string())
        })?;
        let name = &after[..end];
        match name {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "apos" => out.push('\''),
            "quot" => out.push('"'),
            _ => {
                let code = name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| name.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .ok_or_else(|| {
                        PlistError::MalformedFormat(format!("unknown entity \"&{name};\""))
                    })?
                    .map_err(|_| {
                        PlistError::MalformedFormat(format!("invalid character reference \"&{name};\""))
                    })?;
                let decoded = char::from_u32(code).ok_or_else(|| {
                    PlistError::MalformedFormat(format!("invalid character reference \"&{name};\""))
                })?;
                out.push(decoded);
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Base64 content may contain arbitrary whitespace
fn decode_base64(text: &str) -> Result<Vec<u8>, PlistError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|why| PlistError::MalformedFormat(format!("invalid base64 data: {why}")))
}
