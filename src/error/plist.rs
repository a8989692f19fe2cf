/*!
 Errors that can happen when detecting and parsing property-list data.
*/

use std::{
    fmt::{Display, Formatter, Result},
    io::Error as IoError,
};

/// Errors that can happen when detecting and parsing property-list data
#[derive(Debug)]
pub enum PlistError {
    /// The underlying read failed
    Io(IoError),
    /// The head of the input matched neither the binary magic nor an XML prolog
    UnknownFormat,
    /// A well-formed-ness violation in either encoding
    MalformedFormat(String),
    /// A typed accessor was called on the wrong [`Node`](crate::plist::models::Node) variant,
    /// carrying the expected and actual variant names
    TypeMismatch(&'static str, &'static str),
    /// A typed numeric accessor could not represent the stored value
    NumericOverflow(String),
}

impl Display for PlistError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            PlistError::Io(why) => write!(fmt, "{why}"),
            PlistError::UnknownFormat => write!(fmt, "Unknown property list format!"),
            PlistError::MalformedFormat(why) => write!(fmt, "Malformed property list: {why}"),
            PlistError::TypeMismatch(expected, actual) => {
                write!(fmt, "Expected {expected} node, found {actual}!")
            }
            PlistError::NumericOverflow(value) => {
                write!(fmt, "Number {value} cannot be represented by the requested type!")
            }
        }
    }
}
