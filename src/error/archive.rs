/*!
 Errors that can happen when reconstructing an object tree from `NSKeyedArchiver` data.
*/

use std::fmt::{Display, Formatter, Result};

use crate::{error::plist::PlistError, plist::models::Node};

/// Errors that can happen when reconstructing an object tree from `NSKeyedArchiver` data
#[derive(Debug)]
pub enum ArchiveError {
    /// An envelope key was missing or of the wrong type
    InvalidArchive(String),
    /// A node inside the archive violated the expected archive shape,
    /// carrying the offending key and node
    MalformedNode(String, Node),
    /// The dereference chain exceeded the recursion limit, carrying the
    /// depth reached and the partial node produced so far
    RecursionLimit(usize, Node),
    /// A property-list level failure surfaced during resolution
    Plist(PlistError),
}

impl Display for ArchiveError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            ArchiveError::InvalidArchive(why) => write!(fmt, "Invalid keyed archive: {why}"),
            ArchiveError::MalformedNode(key, node) => {
                write!(fmt, "Malformed archive node at {key}: {node:?}")
            }
            ArchiveError::RecursionLimit(depth, _) => {
                write!(fmt, "Recursion limit exceeded at depth {depth}")
            }
            ArchiveError::Plist(why) => write!(fmt, "{why}"),
        }
    }
}
