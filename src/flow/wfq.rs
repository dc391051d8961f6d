//! Weighted fair queueing over streams, ignoring the dependency tree.

use std::collections::HashMap;

use super::{StreamByteDistributor, StreamableState};
use crate::frame::PriorityInfo;

/// Fixed-point scale for virtual time so small grants still advance it.
const SCALE: u64 = 1 << 16;

#[derive(Debug, Clone)]
struct Entry {
    streamable: usize,
    weight: u16,
    /// Virtual finish time of the last grant.
    finish: u64,
}

/// Serves the active stream with the smallest virtual finish time; each grant
/// advances it by `bytes * SCALE / weight`, so over time bandwidth follows
/// the weights.
#[derive(Debug, Clone, Default)]
pub struct WeightedFairQueueDistributor {
    entries: HashMap<u32, Entry>,
    virtual_time: u64,
}

impl WeightedFairQueueDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(&self, stream_id: u32) -> Option<u16> {
        self.entries.get(&stream_id).map(|e| e.weight)
    }

    fn entry(&mut self, stream_id: u32) -> &mut Entry {
        let now = self.virtual_time;
        self.entries.entry(stream_id).or_insert(Entry {
            streamable: 0,
            weight: PriorityInfo::DEFAULT_WEIGHT,
            finish: now,
        })
    }

    fn next(&self) -> Option<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| e.streamable > 0)
            .min_by_key(|(id, e)| (e.finish, **id))
            .map(|(id, _)| *id)
    }
}

impl StreamByteDistributor for WeightedFairQueueDistributor {
    fn update_streamable_bytes(&mut self, state: StreamableState) {
        if state.stream_id == 0 {
            return;
        }
        let now = self.virtual_time;
        let entry = self.entry(state.stream_id);
        let streamable = if state.has_frame {
            state.streamable_bytes
        } else {
            0
        };
        if entry.streamable == 0 && streamable > 0 {
            // No credit is banked while idle.
            entry.finish = entry.finish.max(now);
        }
        entry.streamable = streamable;
    }

    fn update_dependency_tree(&mut self, child: u32, _parent: u32, weight: u16, _exclusive: bool) {
        if child != 0 {
            self.entry(child).weight = weight.clamp(1, 256);
        }
    }

    fn remove_stream(&mut self, stream_id: u32) {
        self.entries.remove(&stream_id);
    }

    fn distribute(
        &mut self,
        max_bytes: usize,
        max_write: usize,
        write: &mut dyn FnMut(u32, usize),
    ) -> bool {
        let mut remaining = max_bytes;
        while remaining > 0 {
            let Some(id) = self.next() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&id) else {
                break;
            };
            let n = entry.streamable.min(max_write.max(1)).min(remaining);
            self.virtual_time = self.virtual_time.max(entry.finish);
            entry.finish += n as u64 * SCALE / entry.weight as u64;
            entry.streamable -= n;
            remaining -= n;
            write(id, n);
        }
        self.entries.values().any(|e| e.streamable > 0)
    }
}
