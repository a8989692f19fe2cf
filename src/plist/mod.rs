/*!
 Contains logic and data structures used to parse property-list data into native Rust data structures.

 ## Overview

 Apple property lists ship in two on-disk encodings: the tagged-binary
 `bplist00` format and an XML dialect. [`read_plist`] sniffs the head of the
 input, dispatches to the matching reader, and returns the same
 [`Node`](models::Node) tree from either one.

 ## Features

 - Pure Rust implementation with no dependency on Apple frameworks
 - Dictionary key order from the file is preserved
 - Robust error handling for malformed or truncated input
*/

pub mod binary;
pub mod models;
pub mod xml;
mod tests;

use std::{fs, path::Path};

use log::debug;

use crate::{
    error::plist::PlistError,
    plist::{binary::BinaryPlistReader, models::Node, xml::XmlPlistReader},
};

/// Number of bytes inspected to determine the on-disk encoding
const SNIFF_LEN: usize = 8;

/// The on-disk encodings recognised by [`detect_format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistFormat {
    /// The tagged-binary `bplist00` encoding
    Binary,
    /// The XML encoding
    Xml,
}

/// Determine the encoding of a property list from at most its first 8 bytes.
///
/// The binary magic must match exactly; an XML document is recognised by a
/// case-insensitive `<?xml` or `<!DOC` prefix. Anything else is
/// [`PlistError::UnknownFormat`], never a parse attempt.
pub fn detect_format(bytes: &[u8]) -> Result<PlistFormat, PlistError> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head == b"bplist00" {
        return Ok(PlistFormat::Binary);
    }
    if head.len() >= 5
        && (head[..5].eq_ignore_ascii_case(b"<?xml") || head[..5].eq_ignore_ascii_case(b"<!DOC"))
    {
        return Ok(PlistFormat::Xml);
    }
    Err(PlistError::UnknownFormat)
}

/// Parse a property list from a byte buffer.
///
/// # Example:
///
/// ```
/// use keyed_archive::plist::read_plist;
///
/// let bytes = br#"<?xml version="1.0"?><plist version="1.0"><integer>7</integer></plist>"#;
/// let node = read_plist(bytes).unwrap();
/// assert_eq!(node.as_number_i64().unwrap(), 7);
/// ```
pub fn read_plist(bytes: &[u8]) -> Result<Node, PlistError> {
    match detect_format(bytes)? {
        PlistFormat::Binary => {
            debug!("detected binary property list of {} bytes", bytes.len());
            BinaryPlistReader::from(bytes).parse()
        }
        PlistFormat::Xml => {
            debug!("detected XML property list of {} bytes", bytes.len());
            XmlPlistReader::from(bytes)?.parse()
        }
    }
}

/// Read and parse a property list from a file on disk
pub fn read_plist_from_path<P: AsRef<Path>>(path: P) -> Result<Node, PlistError> {
    let bytes = fs::read(path).map_err(PlistError::Io)?;
    read_plist(&bytes)
}
