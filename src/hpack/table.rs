//! Static table (RFC 7541 Appendix A) and dynamic table (Section 2.3.2).

use std::collections::VecDeque;

use bytes::Bytes;

use super::HeaderField;
use crate::error::HpackError;

/// The fixed 61-entry static table, addressed 1..=61.
pub struct StaticTable;

impl StaticTable {
    pub const LEN: usize = 61;

    const ENTRIES: [(&'static [u8], &'static [u8]); 61] = [
        (b":authority", b""),
        (b":method", b"GET"),
        (b":method", b"POST"),
        (b":path", b"/"),
        (b":path", b"/index.html"),
        (b":scheme", b"http"),
        (b":scheme", b"https"),
        (b":status", b"200"),
        (b":status", b"204"),
        (b":status", b"206"),
        (b":status", b"304"),
        (b":status", b"400"),
        (b":status", b"404"),
        (b":status", b"500"),
        (b"accept-charset", b""),
        (b"accept-encoding", b"gzip, deflate"),
        (b"accept-language", b""),
        (b"accept-ranges", b""),
        (b"accept", b""),
        (b"access-control-allow-origin", b""),
        (b"age", b""),
        (b"allow", b""),
        (b"authorization", b""),
        (b"cache-control", b""),
        (b"content-disposition", b""),
        (b"content-encoding", b""),
        (b"content-language", b""),
        (b"content-length", b""),
        (b"content-location", b""),
        (b"content-range", b""),
        (b"content-type", b""),
        (b"cookie", b""),
        (b"date", b""),
        (b"etag", b""),
        (b"expect", b""),
        (b"expires", b""),
        (b"from", b""),
        (b"host", b""),
        (b"if-match", b""),
        (b"if-modified-since", b""),
        (b"if-none-match", b""),
        (b"if-range", b""),
        (b"if-unmodified-since", b""),
        (b"last-modified", b""),
        (b"link", b""),
        (b"location", b""),
        (b"max-forwards", b""),
        (b"proxy-authenticate", b""),
        (b"proxy-authorization", b""),
        (b"range", b""),
        (b"referer", b""),
        (b"refresh", b""),
        (b"retry-after", b""),
        (b"server", b""),
        (b"set-cookie", b""),
        (b"strict-transport-security", b""),
        (b"transfer-encoding", b""),
        (b"user-agent", b""),
        (b"vary", b""),
        (b"via", b""),
        (b"www-authenticate", b""),
    ];

    pub fn get(index: usize) -> Option<(&'static [u8], &'static [u8])> {
        if index == 0 || index > Self::LEN {
            return None;
        }
        Some(Self::ENTRIES[index - 1])
    }

    pub fn find_exact(name: &[u8], value: &[u8]) -> Option<usize> {
        Self::ENTRIES
            .iter()
            .position(|(n, v)| *n == name && *v == value)
            .map(|i| i + 1)
    }

    pub fn find_name(name: &[u8]) -> Option<usize> {
        Self::ENTRIES
            .iter()
            .position(|(n, _)| *n == name)
            .map(|i| i + 1)
    }
}

/// FIFO table of recently inserted fields, newest first.
///
/// `size` never exceeds `max_size`: inserting evicts from the oldest end, and
/// an entry larger than `max_size` empties the table without being added.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
    journal: Option<Journal>,
}

/// Changes made since [`DynamicTable::begin`], enough to undo them.
#[derive(Debug, Clone)]
struct Journal {
    /// Entries inserted since the mark that are still in the table.
    fresh: usize,
    /// Pre-existing entries evicted since the mark, oldest first.
    evicted: Vec<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
            journal: None,
        }
    }

    /// Start recording changes so they can be undone with [`rollback`](Self::rollback).
    pub fn begin(&mut self) {
        self.journal = Some(Journal {
            fresh: 0,
            evicted: Vec::new(),
            size: self.size,
            max_size: self.max_size,
        });
    }

    /// Keep every change since [`begin`](Self::begin).
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo every change since [`begin`](Self::begin).
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for _ in 0..journal.fresh {
            self.entries.pop_front();
        }
        for field in journal.evicted.into_iter().rev() {
            self.entries.push_back(field);
        }
        self.size = journal.size;
        self.max_size = journal.max_size;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the bound and evict down to it immediately.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to(max_size);
    }

    /// Insert at the front. Returns false when the entry alone is too large,
    /// in which case the table is left empty.
    pub fn insert(&mut self, field: HeaderField) -> bool {
        let entry_size = field.size();
        if entry_size > self.max_size {
            self.clear();
            return false;
        }
        self.evict_to(self.max_size - entry_size);
        self.size += entry_size;
        self.entries.push_front(field);
        if let Some(journal) = &mut self.journal {
            journal.fresh += 1;
        }
        true
    }

    /// 1-based index within the dynamic table only.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&HeaderField> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn find_exact(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|f| f.name().as_ref() == name && f.value().as_ref() == value)
            .map(|i| i + 1)
    }

    pub fn find_name(&self, name: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|f| f.name().as_ref() == name)
            .map(|i| i + 1)
    }

    pub fn clear(&mut self) {
        self.evict_to(0);
        self.entries.clear();
        self.size = 0;
    }

    fn evict_to(&mut self, limit: usize) {
        while self.size > limit {
            let len = self.entries.len();
            let Some(old) = self.entries.pop_back() else {
                break;
            };
            self.size -= old.size();
            if let Some(journal) = &mut self.journal {
                if len <= journal.fresh {
                    journal.fresh -= 1;
                } else {
                    journal.evicted.push(old);
                }
            }
        }
    }
}

/// Resolve an index in the combined address space: 1..=61 static, then dynamic.
pub fn lookup(dynamic: &DynamicTable, index: usize) -> Result<(Bytes, Bytes), HpackError> {
    if let Some((name, value)) = StaticTable::get(index) {
        return Ok((Bytes::from_static(name), Bytes::from_static(value)));
    }
    index
        .checked_sub(StaticTable::LEN)
        .and_then(|i| dynamic.get(i))
        .map(|f| (f.name().clone(), f.value().clone()))
        .ok_or(HpackError::InvalidIndex(index))
}
