/*!
 Logic used to deserialize data from the `bplist00` binary property-list encoding.

 Layout reverse engineered from the `CoreFoundation` source located at:
   - [`CFBinaryPList.c`](https://opensource.apple.com/source/CF/CF-1153.18/CFBinaryPList.c.auto.html)
   - [`ForFoundationOnly.h`](https://opensource.apple.com/source/CF/CF-1153.18/ForFoundationOnly.h.auto.html)
*/

use std::collections::HashSet;

use crate::{
    error::plist::PlistError,
    plist::models::{Dictionary, Node, Number},
    util::dates,
};

/// 8-byte magic at the start of every binary property list
const MAGIC: &[u8] = b"bplist00";
/// Size of the fixed trailer occupying the last bytes of the file
const TRAILER_SIZE: usize = 32;

/// Marker high nibble for null and the booleans
const KIND_SINGLETON: u8 = 0x0;
/// Marker high nibble for signed big-endian integers of `2^info` bytes
const KIND_INT: u8 = 0x1;
/// Marker high nibble for big-endian IEEE-754 reals of `2^info` bytes
const KIND_REAL: u8 = 0x2;
/// Marker high nibble for dates, stored as seconds relative to the Apple epoch
const KIND_DATE: u8 = 0x3;
/// Marker high nibble for raw data
const KIND_DATA: u8 = 0x4;
/// Marker high nibble for ASCII strings
const KIND_ASCII: u8 = 0x5;
/// Marker high nibble for UTF-16BE strings, counted in code units
const KIND_UTF16: u8 = 0x6;
/// Marker high nibble for `NSKeyedArchiver` UIDs of `info + 1` bytes
const KIND_UID: u8 = 0x8;
/// Marker high nibble for arrays of object references
const KIND_ARRAY: u8 = 0xA;
/// Marker high nibble for dictionaries, stored as key references then value references
const KIND_DICT: u8 = 0xD;

/// Low nibble value indicating the real count follows as a nested integer marker
const COUNT_FOLLOWS: u8 = 0xF;

/// Key under which a UID object is surfaced in the node tree
pub const UID_KEY: &str = "CF$UID";

/// Contains logic and data used to deserialize `bplist00` data.
///
/// A binary property list is a self-describing tagged format: after the 8-byte
/// magic comes a region of tagged objects at arbitrary offsets, then an offset
/// table locating every object, then a 32-byte trailer describing the widths of
/// offsets and object references, the object count, the root object index, and
/// the position of the offset table. Objects reference each other by index into
/// the offset table, so containers parse by recursively resolving references.
#[derive(Debug)]
pub struct BinaryPlistReader<'a> {
    /// The raw file contents we want to parse
    buf: &'a [u8],
    /// Width in bytes of each offset-table entry
    offset_size: usize,
    /// Width in bytes of each object reference inside containers
    ref_size: usize,
    /// Total number of objects in the offset table
    num_objects: usize,
    /// Index of the root object
    top_object: usize,
    /// Position of the offset table in the file
    table_offset: usize,
    /// Byte offset of every object, indexed by object reference
    offsets: Vec<usize>,
    /// Objects currently being parsed, to reject crafted reference cycles
    in_flight: HashSet<usize>,
}

/// Zero-padded big-endian decode of up to 8 bytes
fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, byte| (acc << 8) | u64::from(*byte))
}

impl<'a> BinaryPlistReader<'a> {
    /// Given a buffer, construct a reader instance to parse it.
    ///
    /// # Example:
    ///
    /// ```
    /// use keyed_archive::plist::binary::BinaryPlistReader;
    ///
    /// let bytes: Vec<u8> = vec![]; // Example file contents
    /// let mut reader = BinaryPlistReader::from(&bytes);
    /// let result = reader.parse();
    /// ```
    pub fn from(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset_size: 0,
            ref_size: 0,
            num_objects: 0,
            top_object: 0,
            table_offset: 0,
            offsets: vec![],
            in_flight: HashSet::new(),
        }
    }

    /// Parse the buffer into a node tree, starting from the root object named
    /// by the trailer.
    pub fn parse(&mut self) -> Result<Node, PlistError> {
        self.validate_magic()?;
        self.read_trailer()?;
        self.read_offset_table()?;
        self.parse_object(self.top_object)
    }

    /// The file must at least hold the magic and the trailer
    fn validate_magic(&self) -> Result<(), PlistError> {
        if self.buf.len() < MAGIC.len() + TRAILER_SIZE {
            return Err(PlistError::MalformedFormat(format!(
                "input of {} bytes is too short for a binary property list",
                self.buf.len()
            )));
        }
        if &self.buf[..MAGIC.len()] != MAGIC {
            return Err(PlistError::MalformedFormat(
                "bad binary property list magic".to_string(),
            ));
        }
        Ok(())
    }

    /// Read the fixed-size trailer from the end of the buffer and validate
    /// that the regions it describes fall inside the file.
    fn read_trailer(&mut self) -> Result<(), PlistError> {
        let trailer = &self.buf[self.buf.len() - TRAILER_SIZE..];

        // The first 6 trailer bytes are unused
        self.offset_size = trailer[6] as usize;
        self.ref_size = trailer[7] as usize;
        let num_objects = be_uint(&trailer[8..16]);
        let top_object = be_uint(&trailer[16..24]);
        let table_offset = be_uint(&trailer[24..32]);

        if !(1..=8).contains(&self.offset_size) {
            return Err(PlistError::MalformedFormat(format!(
                "invalid offset width {}",
                self.offset_size
            )));
        }
        if !(1..=8).contains(&self.ref_size) {
            return Err(PlistError::MalformedFormat(format!(
                "invalid object reference width {}",
                self.ref_size
            )));
        }

        self.num_objects = usize::try_from(num_objects)
            .map_err(|_| PlistError::MalformedFormat(format!("object count {num_objects} does not fit in memory")))?;
        self.top_object = usize::try_from(top_object)
            .map_err(|_| PlistError::MalformedFormat(format!("top object index {top_object} does not fit in memory")))?;
        self.table_offset = usize::try_from(table_offset)
            .map_err(|_| PlistError::MalformedFormat(format!("offset table position {table_offset} does not fit in memory")))?;

        if self.top_object >= self.num_objects {
            return Err(PlistError::MalformedFormat(format!(
                "top object index {} is outside of table range {}",
                self.top_object, self.num_objects
            )));
        }

        let table_size = self
            .num_objects
            .checked_mul(self.offset_size)
            .ok_or_else(|| PlistError::MalformedFormat("offset table size overflows".to_string()))?;
        let table_end = self
            .table_offset
            .checked_add(table_size)
            .ok_or_else(|| PlistError::MalformedFormat("offset table size overflows".to_string()))?;
        if table_end > self.buf.len() - TRAILER_SIZE {
            return Err(PlistError::MalformedFormat(format!(
                "offset table at {:#x} runs past the trailer",
                self.table_offset
            )));
        }

        Ok(())
    }

    /// Read `num_objects` offsets of `offset_size` bytes each; every offset
    /// must point inside the file.
    fn read_offset_table(&mut self) -> Result<(), PlistError> {
        let mut offsets = Vec::with_capacity(self.num_objects);
        for index in 0..self.num_objects {
            let entry = self.table_offset + index * self.offset_size;
            let offset = self.read_be_uint(entry, self.offset_size)? as usize;
            if offset >= self.buf.len() {
                return Err(PlistError::MalformedFormat(format!(
                    "object offset {:#x} is outside of range {:#x}",
                    offset,
                    self.buf.len()
                )));
            }
            offsets.push(offset);
        }
        self.offsets = offsets;
        Ok(())
    }

    /// Get the byte at a given offset, if the offset is within the bounds of the buffer
    fn byte_at(&self, offset: usize) -> Result<u8, PlistError> {
        self.buf.get(offset).copied().ok_or_else(|| {
            PlistError::MalformedFormat(format!(
                "index {:#x} is outside of range {:#x}",
                offset,
                self.buf.len()
            ))
        })
    }

    /// Borrow exactly `len` bytes starting at `offset`
    fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8], PlistError> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| PlistError::MalformedFormat("object length overflows".to_string()))?;
        self.buf.get(offset..end).ok_or_else(|| {
            PlistError::MalformedFormat(format!(
                "index {:#x} is outside of range {:#x}",
                end,
                self.buf.len()
            ))
        })
    }

    /// Read an unsigned big-endian integer of `size` bytes at `offset`
    fn read_be_uint(&self, offset: usize, size: usize) -> Result<u64, PlistError> {
        Ok(be_uint(self.bytes_at(offset, size)?))
    }

    /// Read an object reference of `ref_size` bytes at `offset`, zero-padded
    fn read_ref(&self, offset: usize) -> Result<usize, PlistError> {
        Ok(self.read_be_uint(offset, self.ref_size)? as usize)
    }

    /// Read the element count for a variable-length object whose marker holds
    /// `info` in its low nibble and sits at `offset`.
    ///
    /// Counts below 15 are stored in the marker itself; the value `0xF` means
    /// the real count immediately follows as a nested integer marker.
    /// Returns the count and the offset of the first payload byte.
    fn read_count(&self, info: u8, offset: usize) -> Result<(usize, usize), PlistError> {
        if info != COUNT_FOLLOWS {
            return Ok((info as usize, offset + 1));
        }
        let marker = self.byte_at(offset + 1)?;
        if marker >> 4 != KIND_INT {
            return Err(PlistError::MalformedFormat(format!(
                "expected an integer length marker, found {marker:#04x}"
            )));
        }
        let size = 1usize << (marker & 0xF);
        if size > 8 {
            return Err(PlistError::MalformedFormat(format!(
                "unsupported length width {size}"
            )));
        }
        let count = self.read_be_uint(offset + 2, size)?;
        let count = usize::try_from(count).map_err(|_| {
            PlistError::MalformedFormat(format!("length {count} does not fit in memory"))
        })?;
        Ok((count, offset + 2 + size))
    }

    /// Verify that `len` bytes starting at `offset` fall inside the buffer,
    /// before any allocation sized from an untrusted count.
    fn check_span(&self, offset: usize, len: usize) -> Result<(), PlistError> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| PlistError::MalformedFormat("object length overflows".to_string()))?;
        if end > self.buf.len() {
            return Err(PlistError::MalformedFormat(format!(
                "index {:#x} is outside of range {:#x}",
                end,
                self.buf.len()
            )));
        }
        Ok(())
    }

    /// Decode a signed integer of the given width. Widths of 1, 2, and 4 bytes
    /// are unsigned; 8 and 16 bytes are signed two's-complement.
    fn decode_integer(&self, offset: usize, size: usize) -> Result<Number, PlistError> {
        match size {
            1 | 2 | 4 => Ok(Number::Integer(self.read_be_uint(offset, size)? as i128)),
            8 => Ok(Number::Integer(self.read_be_uint(offset, 8)? as i64 as i128)),
            16 => {
                let bytes = self.bytes_at(offset, 16)?;
                let value = bytes
                    .iter()
                    .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte));
                Ok(Number::Integer(value as i128))
            }
            _ => Err(PlistError::MalformedFormat(format!(
                "unsupported integer width {size}"
            ))),
        }
    }

    /// Resolve an object reference into a node, rejecting references outside
    /// the offset table and references back into an object still being parsed.
    fn parse_object(&mut self, index: usize) -> Result<Node, PlistError> {
        if index >= self.num_objects {
            return Err(PlistError::MalformedFormat(format!(
                "object reference {} is outside of table range {}",
                index, self.num_objects
            )));
        }
        if !self.in_flight.insert(index) {
            return Err(PlistError::MalformedFormat(format!(
                "object {index} contains a reference to itself"
            )));
        }
        let result = self.parse_object_at(self.offsets[index]);
        self.in_flight.remove(&index);
        result
    }

    /// Read the marker byte at `offset` and dispatch on its high nibble
    fn parse_object_at(&mut self, offset: usize) -> Result<Node, PlistError> {
        let marker = self.byte_at(offset)?;
        let kind = marker >> 4;
        let info = marker & 0xF;

        match kind {
            KIND_SINGLETON => match info {
                0x0 => Ok(Node::Null),
                0x8 => Ok(Node::Boolean(false)),
                0x9 => Ok(Node::Boolean(true)),
                _ => Err(PlistError::MalformedFormat(format!(
                    "unknown marker {marker:#04x}"
                ))),
            },
            KIND_INT => {
                let size = 1usize << info;
                Ok(Node::Number(self.decode_integer(offset + 1, size)?))
            }
            KIND_REAL => match info {
                2 => {
                    let bits = self.read_be_uint(offset + 1, 4)? as u32;
                    Ok(Node::real(f64::from(f32::from_bits(bits))))
                }
                3 => {
                    let bits = self.read_be_uint(offset + 1, 8)?;
                    Ok(Node::real(f64::from_bits(bits)))
                }
                _ => Err(PlistError::MalformedFormat(format!(
                    "unsupported real width {}",
                    1u32 << info
                ))),
            },
            KIND_DATE => {
                if info != 3 {
                    return Err(PlistError::MalformedFormat(format!(
                        "unknown marker {marker:#04x}"
                    )));
                }
                let seconds = f64::from_bits(self.read_be_uint(offset + 1, 8)?);
                dates::from_apple_time(seconds).map(Node::Date).ok_or_else(|| {
                    PlistError::MalformedFormat(format!(
                        "date {seconds} is outside of the representable range"
                    ))
                })
            }
            KIND_DATA => {
                let (count, start) = self.read_count(info, offset)?;
                Ok(Node::Data(self.bytes_at(start, count)?.to_vec()))
            }
            KIND_ASCII => {
                let (count, start) = self.read_count(info, offset)?;
                let text = std::str::from_utf8(self.bytes_at(start, count)?)
                    .map_err(|_| {
                        PlistError::MalformedFormat("string is not valid UTF-8".to_string())
                    })?;
                Ok(Node::String(text.to_string()))
            }
            KIND_UTF16 => {
                let (count, start) = self.read_count(info, offset)?;
                let len = count.checked_mul(2).ok_or_else(|| {
                    PlistError::MalformedFormat("object length overflows".to_string())
                })?;
                let units: Vec<u16> = self
                    .bytes_at(start, len)?
                    .chunks_exact(2)
                    .map(|pair| u16::from(pair[0]) << 8 | u16::from(pair[1]))
                    .collect();
                let text = String::from_utf16(&units).map_err(|_| {
                    PlistError::MalformedFormat("invalid UTF-16 string data".to_string())
                })?;
                Ok(Node::String(text))
            }
            KIND_UID => {
                // UIDs carry their byte count directly, not as a power of two
                let size = info as usize + 1;
                if size > 8 {
                    return Err(PlistError::MalformedFormat(format!(
                        "unsupported UID width {size}"
                    )));
                }
                let value = self.read_be_uint(offset + 1, size)?;
                let mut uid = Dictionary::new();
                uid.insert(UID_KEY.to_string(), Node::integer(value as i128));
                Ok(Node::Dictionary(uid))
            }
            KIND_ARRAY => {
                let (count, start) = self.read_count(info, offset)?;
                let span = count.checked_mul(self.ref_size).ok_or_else(|| {
                    PlistError::MalformedFormat("object length overflows".to_string())
                })?;
                self.check_span(start, span)?;

                let mut items = Vec::with_capacity(count);
                for index in 0..count {
                    let object_ref = self.read_ref(start + index * self.ref_size)?;
                    items.push(self.parse_object(object_ref)?);
                }
                Ok(Node::Array(items))
            }
            KIND_DICT => {
                let (count, start) = self.read_count(info, offset)?;
                let span = count
                    .checked_mul(self.ref_size)
                    .and_then(|refs| refs.checked_mul(2))
                    .ok_or_else(|| {
                        PlistError::MalformedFormat("object length overflows".to_string())
                    })?;
                self.check_span(start, span)?;

                let mut entries = Dictionary::with_capacity(count);
                for index in 0..count {
                    let key_ref = self.read_ref(start + index * self.ref_size)?;
                    let value_ref = self.read_ref(start + (count + index) * self.ref_size)?;

                    let key = match self.parse_object(key_ref)? {
                        Node::String(key) => key,
                        other => {
                            return Err(PlistError::MalformedFormat(format!(
                                "dictionary key is not a string: {other:?}"
                            )))
                        }
                    };
                    if key.is_empty() {
                        return Err(PlistError::MalformedFormat(
                            "empty dictionary key".to_string(),
                        ));
                    }

                    let value = self.parse_object(value_ref)?;
                    if entries.insert(key.clone(), value).is_some() {
                        return Err(PlistError::MalformedFormat(format!(
                            "duplicate dictionary key \"{key}\""
                        )));
                    }
                }
                Ok(Node::Dictionary(entries))
            }
            _ => Err(PlistError::MalformedFormat(format!(
                "unknown marker {marker:#04x}"
            ))),
        }
    }
}
