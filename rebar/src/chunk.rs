//! Argument storage for live calls.
//!
//! Chunks are fixed-size cell buffers bump-allocated in stack order. Each
//! call takes one allocation sized to its paramlist (plus the rootvar slot)
//! and releases it when the call ends. Releases must be LIFO: a
//! [`ChunkHandle`] is not `Copy`, is consumed by [`ChunkStack::drop_chunk`],
//! and dropping anything but the top allocation is rejected.

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk dropped out of order: depth {depth} while {live} chunks are live")]
    OutOfOrder { depth: usize, live: usize },
}

/// Location of one allocation. Freely copyable; only valid while the
/// allocation that produced it is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkSlots {
    chunk: u32,
    offset: u32,
    len: u32,
}

impl ChunkSlots {
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Ownership token for the top allocation.
#[derive(Debug)]
#[must_use = "a chunk must be released with drop_chunk"]
pub struct ChunkHandle {
    slots: ChunkSlots,
    depth: usize,
}

impl ChunkHandle {
    #[inline]
    pub fn slots(&self) -> ChunkSlots {
        self.slots
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

struct Chunk {
    cells: Box<[Value]>,
    used: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            cells: vec![Value::trash(); capacity].into_boxed_slice(),
            used: 0,
        }
    }
}

pub struct ChunkStack {
    chunks: Vec<Chunk>,
    current: usize,
    live: Vec<ChunkSlots>,
    chunk_cells: usize,
}

impl ChunkStack {
    pub fn new(chunk_cells: usize) -> Self {
        Self {
            chunks: vec![Chunk::new(chunk_cells)],
            current: 0,
            live: Vec::new(),
            chunk_cells,
        }
    }

    /// Allocates `len` void-initialized cells on top of the stack.
    pub fn push_chunk(&mut self, len: usize) -> ChunkHandle {
        let fits = {
            let chunk = &self.chunks[self.current];
            chunk.used + len <= chunk.cells.len()
        };
        if !fits {
            let next = self.current + 1;
            let reusable = self
                .chunks
                .get(next)
                .is_some_and(|chunk| chunk.cells.len() >= len);
            if !reusable {
                // spare chunks past `next` are smaller than needed or about
                // to be unreachable; keep at most one
                self.chunks.truncate(next);
                self.chunks.push(Chunk::new(self.chunk_cells.max(len)));
            }
            self.current = next;
            self.chunks[next].used = 0;
        }

        let chunk = &mut self.chunks[self.current];
        let offset = chunk.used;
        chunk.used += len;
        chunk.cells[offset..offset + len].fill(Value::void());

        let slots = ChunkSlots {
            chunk: self.current as u32,
            offset: offset as u32,
            len: len as u32,
        };
        self.live.push(slots);
        ChunkHandle {
            slots,
            depth: self.live.len() - 1,
        }
    }

    /// Releases the top allocation.
    pub fn drop_chunk(&mut self, handle: ChunkHandle) -> Result<(), ChunkError> {
        let on_top = handle.depth + 1 == self.live.len()
            && self.live.last() == Some(&handle.slots);
        if !on_top {
            return Err(ChunkError::OutOfOrder {
                depth: handle.depth,
                live: self.live.len(),
            });
        }
        self.live.pop();

        let slots = handle.slots;
        let chunk = &mut self.chunks[slots.chunk as usize];
        if cfg!(debug_assertions) {
            let start = slots.offset as usize;
            chunk.cells[start..start + slots.len()].fill(Value::trash());
        }
        chunk.used = slots.offset as usize;
        self.current = self.live.last().map_or(0, |top| top.chunk as usize);
        if self.current == 0 && self.live.is_empty() {
            self.chunks[0].used = 0;
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, slots: ChunkSlots, index: usize) -> Value {
        if index >= slots.len() {
            return Value::end();
        }
        self.chunks[slots.chunk as usize].cells[slots.offset as usize + index]
    }

    #[inline]
    pub fn get_mut(&mut self, slots: ChunkSlots, index: usize) -> Option<&mut Value> {
        if index >= slots.len() {
            return None;
        }
        Some(&mut self.chunks[slots.chunk as usize].cells[slots.offset as usize + index])
    }

    #[inline]
    pub fn set(&mut self, slots: ChunkSlots, index: usize, value: Value) {
        if let Some(cell) = self.get_mut(slots, index) {
            *cell = value;
        }
    }

    pub fn cells(&self, slots: ChunkSlots) -> &[Value] {
        let start = slots.offset as usize;
        &self.chunks[slots.chunk as usize].cells[start..start + slots.len()]
    }

    pub fn depth(&self) -> usize {
        self.live.len()
    }

    /// Whether `slots` still names a live allocation.
    pub fn is_live(&self, slots: ChunkSlots) -> bool {
        self.live.contains(&slots)
    }

    /// Every cell of every live allocation, for the collector.
    pub fn live_cells(&self) -> impl Iterator<Item = &Value> + '_ {
        self.live.iter().flat_map(move |&slots| self.cells(slots).iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_push_and_drop() {
        let mut stack = ChunkStack::new(16);
        let a = stack.push_chunk(4);
        let b = stack.push_chunk(3);
        assert_eq!(stack.depth(), 2);
        assert!(stack.get(b.slots(), 0).is_void());
        stack.drop_chunk(b).unwrap();
        stack.drop_chunk(a).unwrap();
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn out_of_order_drop_is_rejected() {
        let mut stack = ChunkStack::new(16);
        let a = stack.push_chunk(2);
        let _b = stack.push_chunk(2);
        assert_eq!(
            stack.drop_chunk(a),
            Err(ChunkError::OutOfOrder { depth: 0, live: 2 })
        );
    }

    #[test]
    fn overflows_into_new_chunks() {
        let mut stack = ChunkStack::new(8);
        let a = stack.push_chunk(6);
        let b = stack.push_chunk(6);
        let c = stack.push_chunk(20);
        stack.set(a.slots(), 5, Value::integer(1));
        stack.set(b.slots(), 5, Value::integer(2));
        stack.set(c.slots(), 19, Value::integer(3));
        assert_eq!(stack.get(a.slots(), 5), Value::integer(1));
        assert_eq!(stack.get(b.slots(), 5), Value::integer(2));
        assert_eq!(stack.get(c.slots(), 19), Value::integer(3));
        assert!(stack.get(c.slots(), 20).is_end());
        assert_eq!(stack.live_cells().count(), 32);

        stack.drop_chunk(c).unwrap();
        stack.drop_chunk(b).unwrap();
        let d = stack.push_chunk(2);
        assert!(stack.get(d.slots(), 1).is_void());
        assert_eq!(stack.get(a.slots(), 5), Value::integer(1));
        stack.drop_chunk(d).unwrap();
        stack.drop_chunk(a).unwrap();
    }

    #[test]
    fn dropped_slots_are_not_live() {
        let mut stack = ChunkStack::new(8);
        let a = stack.push_chunk(2);
        let slots = a.slots();
        assert!(stack.is_live(slots));
        stack.drop_chunk(a).unwrap();
        assert!(!stack.is_live(slots));
    }
}
