//! Distribution along the RFC 7540 Section 5.3 dependency tree.
//!
//! A node is served before its dependents. Whatever a node cannot use flows
//! to its children with streamable bytes in their subtree, split in
//! proportion to weight.

use std::collections::HashMap;

use tracing::trace;

use super::{StreamByteDistributor, StreamableState};
use crate::frame::PriorityInfo;

const ROOT: u32 = 0;

#[derive(Debug, Clone)]
struct Node {
    parent: u32,
    weight: u16,
    children: Vec<u32>,
    streamable: usize,
    /// Own plus all descendants' streamable bytes.
    subtree: usize,
}

impl Node {
    fn new(parent: u32, weight: u16) -> Self {
        Self {
            parent,
            weight,
            children: Vec::new(),
            streamable: 0,
            subtree: 0,
        }
    }
}

/// Priority-tree [`StreamByteDistributor`]. Nodes are kept in an id-keyed
/// arena with the root at id 0.
#[derive(Debug, Clone)]
pub struct PriorityTreeDistributor {
    nodes: HashMap<u32, Node>,
}

impl Default for PriorityTreeDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityTreeDistributor {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, Node::new(ROOT, PriorityInfo::DEFAULT_WEIGHT));
        Self { nodes }
    }

    /// Parent of `id`, if the stream is known.
    pub fn parent(&self, id: u32) -> Option<u32> {
        self.nodes.get(&id).filter(|_| id != ROOT).map(|n| n.parent)
    }

    pub fn children(&self, id: u32) -> &[u32] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn weight(&self, id: u32) -> Option<u16> {
        self.nodes.get(&id).map(|n| n.weight)
    }

    fn ensure(&mut self, id: u32) {
        if !self.nodes.contains_key(&id) {
            self.nodes
                .insert(id, Node::new(ROOT, PriorityInfo::DEFAULT_WEIGHT));
            if let Some(root) = self.nodes.get_mut(&ROOT) {
                root.children.push(id);
            }
        }
    }

    /// Add `delta` to the subtree totals of `from` and every ancestor.
    fn adjust(&mut self, from: u32, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut cur = from;
        loop {
            let Some(node) = self.nodes.get_mut(&cur) else {
                return;
            };
            node.subtree = (node.subtree as isize + delta).max(0) as usize;
            if cur == ROOT {
                return;
            }
            cur = node.parent;
        }
    }

    fn detach(&mut self, id: u32) {
        let (parent, subtree) = match self.nodes.get(&id) {
            Some(n) => (n.parent, n.subtree),
            None => return,
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        self.adjust(parent, -(subtree as isize));
    }

    fn attach(&mut self, id: u32, parent: u32) {
        let subtree = match self.nodes.get_mut(&id) {
            Some(n) => {
                n.parent = parent;
                n.subtree
            }
            None => return,
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        self.adjust(parent, subtree as isize);
    }

    fn is_descendant(&self, node: u32, ancestor: u32) -> bool {
        let mut cur = node;
        while cur != ROOT {
            match self.nodes.get(&cur) {
                Some(n) if n.parent == ancestor => return true,
                Some(n) => cur = n.parent,
                None => return false,
            }
        }
        false
    }

    fn allocate(
        &mut self,
        id: u32,
        budget: usize,
        max_write: usize,
        write: &mut dyn FnMut(u32, usize),
    ) -> usize {
        let mut used = 0;

        let own = self.nodes.get(&id).map_or(0, |n| n.streamable);
        if id != ROOT && own > 0 {
            let n = own.min(budget);
            let mut left = n;
            while left > 0 {
                let chunk = left.min(max_write.max(1));
                write(id, chunk);
                left -= chunk;
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.streamable -= n;
            }
            self.adjust(id, -(n as isize));
            used += n;
        }

        while used < budget {
            let active: Vec<(u32, u16, usize)> = self
                .children(id)
                .iter()
                .filter_map(|c| self.nodes.get(c).map(|n| (*c, n.weight, n.subtree)))
                .filter(|(_, _, subtree)| *subtree > 0)
                .collect();
            if active.is_empty() {
                break;
            }
            let remaining = budget - used;
            let total_weight: usize = active.iter().map(|(_, w, _)| *w as usize).sum();
            let mut progress = 0;
            for (child, weight, subtree) in active {
                let left = budget - used - progress;
                if left == 0 {
                    break;
                }
                let share = (remaining * weight as usize / total_weight)
                    .max(1)
                    .min(subtree)
                    .min(left);
                progress += self.allocate(child, share, max_write, write);
            }
            if progress == 0 {
                break;
            }
            used += progress;
        }
        used
    }
}

impl StreamByteDistributor for PriorityTreeDistributor {
    fn update_streamable_bytes(&mut self, state: StreamableState) {
        if state.stream_id == ROOT {
            return;
        }
        self.ensure(state.stream_id);
        let streamable = if state.has_frame {
            state.streamable_bytes
        } else {
            0
        };
        let old = match self.nodes.get_mut(&state.stream_id) {
            Some(node) => std::mem::replace(&mut node.streamable, streamable),
            None => return,
        };
        self.adjust(state.stream_id, streamable as isize - old as isize);
    }

    fn update_dependency_tree(&mut self, child: u32, parent: u32, weight: u16, exclusive: bool) {
        if child == ROOT || child == parent {
            return;
        }
        self.ensure(child);
        if parent != ROOT {
            self.ensure(parent);
        }

        if parent != ROOT && self.is_descendant(parent, child) {
            let old_parent = self.nodes.get(&child).map_or(ROOT, |n| n.parent);
            self.detach(parent);
            self.attach(parent, old_parent);
        }

        self.detach(child);
        if exclusive {
            let siblings: Vec<u32> = self.children(parent).to_vec();
            for sibling in siblings {
                self.detach(sibling);
                self.attach(sibling, child);
            }
        }
        self.attach(child, parent);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.weight = weight.clamp(1, 256);
        }
        trace!(child, parent, weight, exclusive, "[FLOW] dependency updated");
    }

    fn remove_stream(&mut self, stream_id: u32) {
        if stream_id == ROOT || !self.nodes.contains_key(&stream_id) {
            return;
        }
        let children: Vec<u32> = self.children(stream_id).to_vec();
        for child in children {
            self.detach(child);
            self.attach(child, ROOT);
        }
        self.detach(stream_id);
        self.nodes.remove(&stream_id);
    }

    fn distribute(
        &mut self,
        max_bytes: usize,
        max_write: usize,
        write: &mut dyn FnMut(u32, usize),
    ) -> bool {
        self.allocate(ROOT, max_bytes, max_write, write);
        self.nodes.get(&ROOT).is_some_and(|root| root.subtree > 0)
    }
}
