//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! The encoder and decoder each own one dynamic table. A connection's encoder
//! table mirrors the peer decoder's table: both sides apply the same sequence
//! of insertions and size updates, so indices stay in lockstep without any
//! shared state.

mod decoder;
mod encoder;
pub mod huffman;
pub mod table;

use bytes::Bytes;

use crate::error::HpackError;

pub use decoder::HpackDecoder;
pub use encoder::HpackEncoder;
pub use table::{DynamicTable, StaticTable};

/// Per-entry overhead added to name and value lengths (RFC 7541 Section 4.1).
pub const ENTRY_OVERHEAD: usize = 32;

/// A single header field.
///
/// `sensitive` fields are always emitted as never-indexed literals, and a
/// decoded never-indexed literal comes back with the flag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    name: Bytes,
    value: Bytes,
    sensitive: bool,
}

impl HeaderField {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sensitive: false,
        }
    }

    /// A field that must never be added to a compression table.
    pub fn sensitive(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            sensitive: true,
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Table size of this entry: name + value + 32
    #[inline]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

/// An ordered header list, as carried by one HEADERS/PUSH_PROMISE block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<HeaderField>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, field: HeaderField) {
        self.fields.push(field);
    }

    /// Append a plain field; chainable.
    pub fn add(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> &mut Self {
        self.fields.push(HeaderField::new(name, value));
        self
    }

    /// Value of the first field named `name`.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&Bytes> {
        let name = name.as_ref();
        self.fields
            .iter()
            .find(|f| f.name.as_ref() == name)
            .map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderField> {
        self.fields.iter()
    }

    /// Header list size as defined for SETTINGS_MAX_HEADER_LIST_SIZE.
    pub fn size(&self) -> usize {
        self.fields.iter().map(HeaderField::size).sum()
    }
}

impl FromIterator<HeaderField> for Headers {
    fn from_iter<I: IntoIterator<Item = HeaderField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Headers {
    type Item = HeaderField;
    type IntoIter = std::vec::IntoIter<HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Decides which fields must be sent as never-indexed literals.
pub trait SensitivityDetector {
    fn is_sensitive(&self, name: &[u8], value: &[u8]) -> bool;
}

/// Treats no field as sensitive (only the per-field flag applies).
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSensitive;

impl SensitivityDetector for NeverSensitive {
    fn is_sensitive(&self, _name: &[u8], _value: &[u8]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSensitive;

impl SensitivityDetector for AlwaysSensitive {
    fn is_sensitive(&self, _name: &[u8], _value: &[u8]) -> bool {
        true
    }
}

impl<F> SensitivityDetector for F
where
    F: Fn(&[u8], &[u8]) -> bool,
{
    fn is_sensitive(&self, name: &[u8], value: &[u8]) -> bool {
        self(name, value)
    }
}

// ============================================================================
// Primitive representations (RFC 7541 Section 5)
// ============================================================================

/// Encode `value` with an N-bit prefix, OR-ing `flags` into the first byte.
pub(crate) fn encode_integer(dst: &mut Vec<u8>, value: usize, prefix_bits: u8, flags: u8) {
    let max_prefix = (1usize << prefix_bits) - 1;
    if value < max_prefix {
        dst.push(flags | value as u8);
        return;
    }
    dst.push(flags | max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 0x80 {
        dst.push((rest & 0x7F) as u8 | 0x80);
        rest >>= 7;
    }
    dst.push(rest as u8);
}

/// Decode an N-bit prefix integer. Returns (value, bytes consumed).
/// Values beyond 32 bits are rejected.
pub(crate) fn decode_integer(src: &[u8], prefix_bits: u8) -> Result<(usize, usize), HpackError> {
    let max_prefix = ((1u16 << prefix_bits) - 1) as u8;
    let first = *src.first().ok_or(HpackError::Truncated)?;
    let mut value = (first & max_prefix) as u64;
    if value < max_prefix as u64 {
        return Ok((value as usize, 1));
    }

    let mut shift = 0u32;
    for (i, &byte) in src[1..].iter().enumerate() {
        if shift > 28 {
            return Err(HpackError::IntegerOverflow);
        }
        value += ((byte & 0x7F) as u64) << shift;
        if value > u32::MAX as u64 {
            return Err(HpackError::IntegerOverflow);
        }
        if byte & 0x80 == 0 {
            return Ok((value as usize, i + 2));
        }
        shift += 7;
    }
    Err(HpackError::Truncated)
}

/// Encode a string literal, Huffman-coded only when that is strictly shorter.
pub(crate) fn encode_string(dst: &mut Vec<u8>, src: &[u8]) {
    let huffman_len = huffman::encoded_len(src);
    if huffman_len < src.len() {
        encode_integer(dst, huffman_len, 7, 0x80);
        huffman::encode(src, dst);
    } else {
        encode_integer(dst, src.len(), 7, 0x00);
        dst.extend_from_slice(src);
    }
}

/// Decode a string literal. Returns (string, bytes consumed).
pub(crate) fn decode_string(src: &[u8]) -> Result<(Bytes, usize), HpackError> {
    let huffman = src.first().ok_or(HpackError::Truncated)? & 0x80 != 0;
    let (len, consumed) = decode_integer(src, 7)?;
    let end = consumed.checked_add(len).ok_or(HpackError::IntegerOverflow)?;
    let raw = src.get(consumed..end).ok_or(HpackError::Truncated)?;
    let value = if huffman {
        Bytes::from(huffman::decode(raw)?)
    } else {
        Bytes::copy_from_slice(raw)
    };
    Ok((value, end))
}
