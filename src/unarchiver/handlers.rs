/*!
 Default decoders for archived classes without a built-in mapping.

 Every function here is a [`ClassHandler`](crate::unarchiver::registry::ClassHandler)
 body: pure, infallible, operating on a dictionary whose fields were already
 resolved. Input that does not match the archived shape of the class degrades
 to [`Node::Null`] instead of erroring.
*/

use log::warn;
use url::Url;

use crate::plist::models::{Dictionary, Node};

/// Find the first present field among alternate archived spellings
fn field<'a>(fields: &'a Dictionary, names: &[&str]) -> Option<&'a Node> {
    names.iter().find_map(|name| fields.get(*name))
}

/// NSColor: `NSRGB` holds at least 3 component bytes, scaled out of 255
pub(crate) fn decode_color(fields: &Dictionary) -> Node {
    let components = match fields.get("NSRGB").and_then(|rgb| rgb.as_bytes().ok()) {
        Some(bytes) if bytes.len() >= 3 => bytes,
        _ => return Node::Null,
    };

    let mut out = Dictionary::new();
    out.insert("Red".to_string(), Node::real(f64::from(components[0]) / 255.0));
    out.insert("Green".to_string(), Node::real(f64::from(components[1]) / 255.0));
    out.insert("Blue".to_string(), Node::real(f64::from(components[2]) / 255.0));
    if components.len() >= 4 {
        out.insert("Alpha".to_string(), Node::real(f64::from(components[3]) / 255.0));
    }
    Node::Dictionary(out)
}

/// NSAttributedString: text plus its attribute run, either may be absent
pub(crate) fn decode_attributed_string(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    if let Some(text) = fields.get("NSString") {
        out.insert("string".to_string(), text.clone());
    }
    if let Some(attributes) = fields.get("NSAttributes") {
        out.insert("attributes".to_string(), attributes.clone());
    }
    Node::Dictionary(out)
}

/// NSURLRequest: the interesting request fields, absent ones omitted
pub(crate) fn decode_url_request(fields: &Dictionary) -> Node {
    let mut out = Dictionary::new();
    for key in ["URL", "method", "body"] {
        if let Some(value) = fields.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    Node::Dictionary(out)
}

/// NSURL: a relative string, optionally resolved against a base URL
pub(crate) fn decode_url(fields: &Dictionary) -> Node {
    let base = field(fields, &["NS.base"]).and_then(|node| node.as_string().ok());
    let relative =
        field(fields, &["NS.relative", "NS.string"]).and_then(|node| node.as_string().ok());

    match (base, relative) {
        (Some(base), Some(relative)) => match Url::parse(base).and_then(|base| base.join(relative)) {
            Ok(resolved) => Node::string(resolved.as_str()),
            Err(why) => {
                warn!("unresolvable URL base \"{base}\": {why}");
                Node::string(relative)
            }
        },
        (None, Some(relative)) => Node::string(relative),
        (_, None) => Node::Null,
    }
}

/// NSValue: a tagged wrapper around one of the geometry or range structs
pub(crate) fn decode_value(fields: &Dictionary) -> Node {
    match fields
        .get("NS.special-type")
        .and_then(|tag| tag.as_string().ok())
    {
        Some("CGPoint") => decode_point(fields),
        Some("CGSize") => decode_size(fields),
        Some("CGRect") => decode_rect(fields),
        Some("_NSRange") => decode_range(fields),
        _ => Node::Null,
    }
}

/// NSNumber: the wrapped number passes through
pub(crate) fn decode_number(fields: &Dictionary) -> Node {
    fields.get("NS.number").cloned().unwrap_or(Node::Null)
}

/// NSDecimalNumber: `NS.decimal` is a textual decimal, kept as an integer
/// when it has no fractional part
pub(crate) fn decode_decimal_number(fields: &Dictionary) -> Node {
    let text = match fields.get("NS.decimal").and_then(|node| node.as_string().ok()) {
        Some(text) => text.trim(),
        None => return Node::Null,
    };
    if let Ok(value) = text.parse::<i128>() {
        return Node::integer(value);
    }
    match text.parse::<f64>() {
        Ok(value) => Node::real(value),
        Err(_) => Node::Null,
    }
}

/// NSTimeZone: the zone identifier
pub(crate) fn decode_time_zone(fields: &Dictionary) -> Node {
    fields.get("NS.name").cloned().unwrap_or(Node::Null)
}

/// NSLocale: the locale identifier
pub(crate) fn decode_locale(fields: &Dictionary) -> Node {
    fields.get("NS.identifier").cloned().unwrap_or(Node::Null)
}

/// NSRange: `{location, length}`
pub(crate) fn decode_range(fields: &Dictionary) -> Node {
    let location = field(fields, &["location", "NS.rangeval.location"]);
    let length = field(fields, &["length", "NS.rangeval.length"]);
    match (location, length) {
        (Some(location), Some(length)) => {
            let mut out = Dictionary::new();
            out.insert("location".to_string(), location.clone());
            out.insert("length".to_string(), length.clone());
            Node::Dictionary(out)
        }
        _ => Node::Null,
    }
}

/// NSPoint: `{x, y}`
pub(crate) fn decode_point(fields: &Dictionary) -> Node {
    match (fields.get("x"), fields.get("y")) {
        (Some(x), Some(y)) => {
            let mut out = Dictionary::new();
            out.insert("x".to_string(), x.clone());
            out.insert("y".to_string(), y.clone());
            Node::Dictionary(out)
        }
        _ => Node::Null,
    }
}

/// NSSize: `{width, height}`
pub(crate) fn decode_size(fields: &Dictionary) -> Node {
    match (fields.get("width"), fields.get("height")) {
        (Some(width), Some(height)) => {
            let mut out = Dictionary::new();
            out.insert("width".to_string(), width.clone());
            out.insert("height".to_string(), height.clone());
            Node::Dictionary(out)
        }
        _ => Node::Null,
    }
}

/// NSRect: `{origin: {x, y}, size: {width, height}}`
pub(crate) fn decode_rect(fields: &Dictionary) -> Node {
    let origin = decode_point(fields);
    let size = decode_size(fields);
    match (origin, size) {
        (Node::Dictionary(origin), Node::Dictionary(size)) => {
            let mut out = Dictionary::new();
            out.insert("origin".to_string(), Node::Dictionary(origin));
            out.insert("size".to_string(), Node::Dictionary(size));
            Node::Dictionary(out)
        }
        _ => Node::Null,
    }
}
