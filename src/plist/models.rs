/*!
 Data structures representing the in-memory property-list value tree.

 Both the binary and the XML reader produce the same [`Node`] tree, and the
 unarchiver consumes and produces it as well. A tree is built once by its
 producer, handed to the caller, and never mutated afterwards.
*/

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::plist::PlistError;

/// A property-list dictionary; insertion order is preserved
pub type Dictionary = IndexMap<String, Node>;

/// A numeric property-list value.
///
/// The binary format distinguishes integers from reals at the marker level and
/// the XML format at the element level; that discrimination is preserved here.
/// Sixteen-byte integers from the binary format are kept in full width, so the
/// container is wider than [`i64`]; narrowing happens only through the checked
/// accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// A signed integer, wide enough for the 16-byte binary encoding
    Integer(i128),
    /// A double-precision floating point value
    Real(f64),
}

impl Number {
    /// Checked narrowing conversion into an [`i64`].
    ///
    /// Integers outside the `i64` range and reals with a fractional part fail
    /// with [`PlistError::NumericOverflow`].
    pub fn as_i64(&self) -> Result<i64, PlistError> {
        match self {
            Number::Integer(value) => {
                i64::try_from(*value).map_err(|_| PlistError::NumericOverflow(value.to_string()))
            }
            Number::Real(value) => {
                if value.fract() == 0.0
                    && *value >= -(2f64.powi(63))
                    && *value < 2f64.powi(63)
                {
                    return Ok(*value as i64);
                }
                Err(PlistError::NumericOverflow(value.to_string()))
            }
        }
    }

    /// Conversion into an [`f64`]; integers wider than the 53-bit mantissa lose precision
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(value) => *value as f64,
            Number::Real(value) => *value,
        }
    }
}

/// A single node in a property-list value tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// UTF-8 text
    String(String),
    /// An integer or real number
    Number(Number),
    /// A boolean
    Boolean(bool),
    /// An instant, stored UTC
    Date(DateTime<Utc>),
    /// An opaque byte sequence
    Data(Vec<u8>),
    /// An ordered sequence of nodes
    Array(Vec<Node>),
    /// A mapping from strings to nodes, insertion order preserved
    Dictionary(Dictionary),
    /// A distinguished absent value
    Null,
}

impl Node {
    /// Build a [`Node::Number`] holding an integer
    pub fn integer(value: i128) -> Self {
        Node::Number(Number::Integer(value))
    }

    /// Build a [`Node::Number`] holding a real
    pub fn real(value: f64) -> Self {
        Node::Number(Number::Real(value))
    }

    /// Build a [`Node::String`]
    pub fn string(value: impl Into<String>) -> Self {
        Node::String(value.into())
    }

    /// The name of the variant, used in [`PlistError::TypeMismatch`] diagnostics
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Node::String(_) => "string",
            Node::Number(_) => "number",
            Node::Boolean(_) => "boolean",
            Node::Date(_) => "date",
            Node::Data(_) => "data",
            Node::Array(_) => "array",
            Node::Dictionary(_) => "dictionary",
            Node::Null => "null",
        }
    }

    /// Borrow the text of a [`Node::String`]
    pub fn as_string(&self) -> Result<&str, PlistError> {
        match self {
            Node::String(value) => Ok(value),
            other => Err(PlistError::TypeMismatch("string", other.variant_name())),
        }
    }

    /// Borrow the number of a [`Node::Number`]
    pub fn as_number(&self) -> Result<&Number, PlistError> {
        match self {
            Node::Number(value) => Ok(value),
            other => Err(PlistError::TypeMismatch("number", other.variant_name())),
        }
    }

    /// Narrow a [`Node::Number`] into an [`i64`], failing with
    /// [`PlistError::NumericOverflow`] when the stored value does not fit
    pub fn as_number_i64(&self) -> Result<i64, PlistError> {
        self.as_number()?.as_i64()
    }

    /// Read a [`Node::Number`] as an [`f64`]
    pub fn as_number_f64(&self) -> Result<f64, PlistError> {
        Ok(self.as_number()?.as_f64())
    }

    /// Read the value of a [`Node::Boolean`]
    pub fn as_bool(&self) -> Result<bool, PlistError> {
        match self {
            Node::Boolean(value) => Ok(*value),
            other => Err(PlistError::TypeMismatch("boolean", other.variant_name())),
        }
    }

    /// Read the instant of a [`Node::Date`]
    pub fn as_date(&self) -> Result<DateTime<Utc>, PlistError> {
        match self {
            Node::Date(value) => Ok(*value),
            other => Err(PlistError::TypeMismatch("date", other.variant_name())),
        }
    }

    /// Borrow the bytes of a [`Node::Data`]
    pub fn as_bytes(&self) -> Result<&[u8], PlistError> {
        match self {
            Node::Data(value) => Ok(value),
            other => Err(PlistError::TypeMismatch("data", other.variant_name())),
        }
    }

    /// Borrow the elements of a [`Node::Array`]
    pub fn as_array(&self) -> Result<&[Node], PlistError> {
        match self {
            Node::Array(value) => Ok(value),
            other => Err(PlistError::TypeMismatch("array", other.variant_name())),
        }
    }

    /// Borrow the entries of a [`Node::Dictionary`]
    pub fn as_dict(&self) -> Result<&Dictionary, PlistError> {
        match self {
            Node::Dictionary(value) => Ok(value),
            other => Err(PlistError::TypeMismatch("dictionary", other.variant_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::plist::PlistError,
        plist::models::{Dictionary, Node, Number},
    };

    #[test]
    fn can_access_matching_variants() {
        assert_eq!(Node::string("hi").as_string().unwrap(), "hi");
        assert_eq!(Node::Boolean(true).as_bool().unwrap(), true);
        assert_eq!(Node::Data(vec![1, 2]).as_bytes().unwrap(), &[1, 2]);
        assert_eq!(
            Node::Array(vec![Node::Null]).as_array().unwrap(),
            &[Node::Null]
        );
        assert!(Node::Dictionary(Dictionary::new()).as_dict().unwrap().is_empty());
    }

    #[test]
    fn doesnt_access_mismatched_variants() {
        assert!(matches!(
            Node::Boolean(true).as_string(),
            Err(PlistError::TypeMismatch("string", "boolean"))
        ));
        assert!(matches!(
            Node::Null.as_array(),
            Err(PlistError::TypeMismatch("array", "null"))
        ));
    }

    #[test]
    fn can_narrow_integer_to_i64() {
        assert_eq!(Node::integer(42).as_number_i64().unwrap(), 42);
        assert_eq!(
            Node::integer(i64::MIN as i128).as_number_i64().unwrap(),
            i64::MIN
        );
    }

    #[test]
    fn doesnt_narrow_wide_integer() {
        let wide = Node::integer(i64::MAX as i128 + 1);
        assert!(matches!(
            wide.as_number_i64(),
            Err(PlistError::NumericOverflow(_))
        ));
    }

    #[test]
    fn can_narrow_integral_real() {
        assert_eq!(Node::real(42.0).as_number_i64().unwrap(), 42);
    }

    #[test]
    fn doesnt_narrow_fractional_real() {
        assert!(matches!(
            Node::real(1.5).as_number_i64(),
            Err(PlistError::NumericOverflow(_))
        ));
    }

    #[test]
    fn can_widen_integer_to_f64() {
        assert_eq!(Node::integer(7).as_number_f64().unwrap(), 7.0);
        assert_eq!(Node::real(1.5).as_number_f64().unwrap(), 1.5);
    }

    #[test]
    fn number_discriminates_integer_from_real() {
        assert_ne!(Number::Integer(1), Number::Real(1.0));
    }
}
