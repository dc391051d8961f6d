use bytes::Bytes;
use tracing::{trace, warn};

use super::table::{DynamicTable, StaticTable};
use super::{encode_integer, encode_string, HeaderField, Headers, SensitivityDetector};
use crate::error::{ErrorCode, H2Error, H2Result};
use crate::settings::defaults;

/// HPACK encoder. Owns the dynamic table mirrored by the peer's decoder.
#[derive(Debug, Clone)]
pub struct HpackEncoder {
    table: DynamicTable,
    /// Size updates to announce at the start of the next block: (smallest, final).
    pending_size_update: Option<(usize, usize)>,
    max_header_list_size: usize,
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(defaults::HEADER_TABLE_SIZE as usize),
            pending_size_update: None,
            max_header_list_size: u32::MAX as usize,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    pub fn max_header_list_size(&self) -> usize {
        self.max_header_list_size
    }

    /// Limit applied before encoding; normally the peer's SETTINGS_MAX_HEADER_LIST_SIZE.
    pub fn set_max_header_list_size(&mut self, size: usize) {
        self.max_header_list_size = size;
    }

    /// Resize the table, normally to the peer's SETTINGS_HEADER_TABLE_SIZE.
    /// The change is signalled to the peer at the start of the next header block.
    pub fn set_max_header_table_size(&mut self, size: usize) {
        if size == self.table.max_size() && self.pending_size_update.is_none() {
            return;
        }
        self.pending_size_update = Some(match self.pending_size_update {
            Some((smallest, _)) => (smallest.min(size), size),
            None => (size.min(self.table.max_size()), size),
        });
        self.table.set_max_size(size);
    }

    /// Encode a header list into a header block fragment.
    ///
    /// Fails with [`H2Error::HeaderListSizeExceeded`] before touching the
    /// dynamic table if the list is larger than the configured limit.
    pub fn encode_headers(
        &mut self,
        stream_id: u32,
        headers: &Headers,
        detector: &dyn SensitivityDetector,
    ) -> H2Result<Bytes> {
        let size = headers.size();
        if size > self.max_header_list_size {
            warn!(stream_id, size, max = self.max_header_list_size, "[HPACK] refusing to encode oversized header list");
            return Err(H2Error::HeaderListSizeExceeded {
                stream_id,
                code: ErrorCode::ProtocolError,
                size,
                max: self.max_header_list_size,
            });
        }

        let mut dst = Vec::with_capacity(size / 2 + 8);
        if let Some((smallest, last)) = self.pending_size_update.take() {
            if smallest < last {
                encode_integer(&mut dst, smallest, 5, 0x20);
            }
            encode_integer(&mut dst, last, 5, 0x20);
        }
        for field in headers {
            let sensitive =
                field.is_sensitive() || detector.is_sensitive(field.name(), field.value());
            self.encode_field(&mut dst, field, sensitive);
        }
        trace!(stream_id, fields = headers.len(), bytes = dst.len(), "[HPACK] encoded header block");
        Ok(Bytes::from(dst))
    }

    fn encode_field(&mut self, dst: &mut Vec<u8>, field: &HeaderField, sensitive: bool) {
        let name = field.name().as_ref();
        let value = field.value().as_ref();

        if sensitive {
            // Never indexed, literal name.
            encode_integer(dst, 0, 4, 0x10);
            encode_string(dst, name);
            encode_string(dst, value);
            return;
        }

        if let Some(index) = StaticTable::find_exact(name, value) {
            encode_integer(dst, index, 7, 0x80);
            return;
        }
        if let Some(index) = self.table.find_exact(name, value) {
            encode_integer(dst, index + StaticTable::LEN, 7, 0x80);
            return;
        }

        if field.size() > self.table.max_size() {
            // Would empty the peer's table anyway; send it unindexed instead.
            self.table.clear();
            let name_index = StaticTable::find_name(name).unwrap_or(0);
            encode_integer(dst, name_index, 4, 0x00);
            if name_index == 0 {
                encode_string(dst, name);
            }
            encode_string(dst, value);
            return;
        }

        let name_index = StaticTable::find_name(name)
            .or_else(|| self.table.find_name(name).map(|i| i + StaticTable::LEN))
            .unwrap_or(0);
        encode_integer(dst, name_index, 6, 0x40);
        if name_index == 0 {
            encode_string(dst, name);
        }
        encode_string(dst, value);
        self.table
            .insert(HeaderField::new(field.name().clone(), field.value().clone()));
    }
}
