use tracing::{trace, warn};

use super::table::{lookup, DynamicTable};
use super::{decode_integer, decode_string, HeaderField, Headers};
use crate::error::{ErrorCode, H2Error, H2Result, HpackError};
use crate::settings::defaults;

/// HPACK decoder. Owns the dynamic table mirrored by the peer's encoder.
#[derive(Debug, Clone)]
pub struct HpackDecoder {
    table: DynamicTable,
    /// Upper bound for size updates sent by the peer (our SETTINGS_HEADER_TABLE_SIZE).
    max_table_size_limit: usize,
    max_header_list_size: usize,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

struct Block {
    headers: Headers,
    size: usize,
    exceeded: bool,
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(defaults::HEADER_TABLE_SIZE as usize),
            max_table_size_limit: defaults::HEADER_TABLE_SIZE as usize,
            max_header_list_size: defaults::MAX_HEADER_LIST_SIZE as usize,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    pub fn max_header_list_size(&self) -> usize {
        self.max_header_list_size
    }

    pub fn set_max_header_list_size(&mut self, size: usize) {
        self.max_header_list_size = size;
    }

    /// Apply an acknowledged local SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_max_header_table_size(&mut self, size: usize) {
        self.max_table_size_limit = size;
        if self.table.max_size() > size {
            self.table.set_max_size(size);
        }
    }

    /// Decode one complete header block for `stream_id`.
    ///
    /// Malformed input yields [`H2Error::Compression`] and restores the table
    /// to its state before the call. An oversized header list yields
    /// [`H2Error::HeaderListSizeExceeded`] after the whole block has been
    /// applied to the table, so it stays in lockstep with the peer.
    pub fn decode_headers(&mut self, stream_id: u32, block: &[u8]) -> H2Result<Headers> {
        self.table.begin();
        let result = self.decode_block(block);
        if result.is_ok() {
            self.table.commit();
        } else {
            self.table.rollback();
        }
        match result {
            Ok(Block { exceeded: false, headers, .. }) => {
                trace!(stream_id, fields = headers.len(), "[HPACK] decoded header block");
                Ok(headers)
            }
            Ok(Block { size, .. }) => {
                warn!(stream_id, size, max = self.max_header_list_size, "[HPACK] header list size exceeded");
                Err(H2Error::HeaderListSizeExceeded {
                    stream_id,
                    code: ErrorCode::ProtocolError,
                    size,
                    max: self.max_header_list_size,
                })
            }
            Err(err) => {
                warn!(stream_id, error = %err, "[HPACK] malformed header block");
                Err(H2Error::Compression(err))
            }
        }
    }

    fn decode_block(&mut self, src: &[u8]) -> Result<Block, HpackError> {
        let mut block = Block {
            headers: Headers::new(),
            size: 0,
            exceeded: false,
        };
        let mut pos = 0;
        let mut field_seen = false;

        while pos < src.len() {
            let rest = &src[pos..];
            let first = rest[0];

            if first & 0xE0 == 0x20 {
                // Dynamic table size update
                if field_seen {
                    return Err(HpackError::SizeUpdateNotFirst);
                }
                let (size, n) = decode_integer(rest, 5)?;
                if size > self.max_table_size_limit {
                    return Err(HpackError::SizeUpdateTooLarge {
                        requested: size,
                        limit: self.max_table_size_limit,
                    });
                }
                self.table.set_max_size(size);
                pos += n;
                continue;
            }

            field_seen = true;
            let (field, n) = if first & 0x80 != 0 {
                let (index, n) = decode_integer(rest, 7)?;
                let (name, value) = lookup(&self.table, index)?;
                (HeaderField::new(name, value), n)
            } else if first & 0xC0 == 0x40 {
                let (field, n) = self.decode_literal(rest, 6, false)?;
                self.table.insert(field.clone());
                (field, n)
            } else {
                // 0x10: never indexed, 0x00: without indexing
                self.decode_literal(rest, 4, first & 0x10 != 0)?
            };
            pos += n;

            block.size += field.size();
            if block.size > self.max_header_list_size {
                // Keep walking the block for table consistency, but stop collecting.
                block.exceeded = true;
                block.headers = Headers::new();
            }
            if !block.exceeded {
                block.headers.push(field);
            }
        }
        Ok(block)
    }

    fn decode_literal(
        &self,
        src: &[u8],
        prefix_bits: u8,
        sensitive: bool,
    ) -> Result<(HeaderField, usize), HpackError> {
        let (index, mut pos) = decode_integer(src, prefix_bits)?;
        let name = if index == 0 {
            let (name, n) = decode_string(&src[pos..])?;
            pos += n;
            name
        } else {
            lookup(&self.table, index)?.0
        };
        let (value, n) = decode_string(&src[pos..])?;
        pos += n;
        let field = if sensitive {
            HeaderField::sensitive(name, value)
        } else {
            HeaderField::new(name, value)
        };
        Ok((field, pos))
    }
}
