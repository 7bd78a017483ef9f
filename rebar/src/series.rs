//! Series heap.
//!
//! Every composite value lives in a [`Series`] node addressed by a
//! [`SeriesId`]. Nodes are slots in a single arena with a free list; ids of
//! freed nodes are reused, so holding an id across a recycle without rooting
//! it is a bug.
//!
//! Cell arrays always carry a trailing END cell that is not counted in their
//! length. Frame varlists are the exception: while their call is running
//! they are views onto chunk-stack slots, and once the call ends they become
//! inaccessible.

use bitflags::bitflags;

use crate::chunk::{ChunkSlots, ChunkStack};
use crate::config::HeapSettings;
use crate::error::{Error, ErrorId, Result};
use crate::function::FunctionInfo;
use crate::handle::HandleData;
use crate::natives::function::VarargsState;
use crate::signal::{SignalFlags, SignalHandle};
use crate::value::{Kind, Payload, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SeriesFlags: u16 {
        /// the collector owns this series
        const MANAGED = 1 << 0;
        const FIXED_SIZE = 1 << 1;
        const PROTECTED = 1 << 2;
        const LOCKED = 1 << 3;
        /// locked, and so is everything it references
        const FROZEN = 1 << 4;
        const INACCESSIBLE = 1 << 5;
        const ARRAY = 1 << 6;
        const VARLIST = 1 << 7;
        const PARAMLIST = 1 << 8;
        const KEYLIST = 1 << 9;
        /// held by the host; always a root
        const API = 1 << 10;
        /// varlist backed by chunk slots
        const STACK = 1 << 11;
    }
}

pub enum SeriesData {
    Bytes(Vec<u8>),
    Wide(Vec<char>),
    /// always ends with an END cell
    Cells(Vec<Value>),
    Singular(Value),
    Stack(ChunkSlots),
    Inaccessible,
}

#[derive(Default)]
pub enum Link {
    #[default]
    None,
    Keylist(SeriesId),
    Function(FunctionInfo),
}

#[derive(Default)]
pub enum Misc {
    #[default]
    None,
    /// meta object of a context or function
    Meta(SeriesId),
    Handle(Box<HandleData>),
    Varargs(VarargsState),
}

pub struct Series {
    pub flags: SeriesFlags,
    pub data: SeriesData,
    pub link: Link,
    pub misc: Misc,
    pub(crate) marked: bool,
}

impl Series {
    pub fn is_array(&self) -> bool {
        self.flags.contains(SeriesFlags::ARRAY)
    }

    fn footprint(&self) -> usize {
        let payload = match &self.data {
            SeriesData::Bytes(bytes) => bytes.capacity(),
            SeriesData::Wide(chars) => chars.capacity() * size_of::<char>(),
            SeriesData::Cells(cells) => cells.capacity() * size_of::<Value>(),
            _ => 0,
        };
        payload + size_of::<Series>()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub allocations: u64,
    pub frees: u64,
    pub recycles: u64,
    pub last_swept: usize,
}

pub struct Heap {
    nodes: Vec<Option<Series>>,
    free: Vec<u32>,
    pub chunks: ChunkStack,
    pub(crate) settings: HeapSettings,
    ballast: isize,
    /// >0 while an operation must not be interrupted by a recycle
    gc_disabled: u32,
    signals: SignalHandle,
    pub stats: HeapStats,
}

fn protected() -> Error {
    Error::raised(ErrorId::Protected)
}

fn inaccessible() -> Error {
    Error::raised(ErrorId::FrameNotOnStack)
}

impl Heap {
    pub fn new(settings: HeapSettings, chunk_cells: usize, signals: SignalHandle) -> Self {
        let ballast = settings.ballast as isize;
        Self {
            nodes: Vec::with_capacity(1024),
            free: Vec::new(),
            chunks: ChunkStack::new(chunk_cells),
            settings,
            ballast,
            gc_disabled: 0,
            signals,
            stats: HeapStats::default(),
        }
    }

    // ── allocation ───────────────────────────────────────────────

    fn charge(&mut self, bytes: usize) {
        self.ballast -= bytes as isize;
        if self.ballast < 0 && self.settings.gc_enabled && self.gc_disabled == 0 {
            self.signals.raise(SignalFlags::RECYCLE);
        }
    }

    pub(crate) fn reset_ballast(&mut self) {
        self.ballast = self.settings.ballast as isize;
    }

    pub fn disable_gc(&mut self) {
        self.gc_disabled += 1;
    }

    pub fn enable_gc(&mut self) {
        self.gc_disabled = self.gc_disabled.saturating_sub(1);
    }

    pub fn gc_allowed(&self) -> bool {
        self.settings.gc_enabled && self.gc_disabled == 0
    }

    pub fn alloc(&mut self, data: SeriesData, flags: SeriesFlags) -> SeriesId {
        let mut flags = flags;
        let data = match data {
            SeriesData::Cells(mut cells) => {
                flags |= SeriesFlags::ARRAY;
                if cells.last().is_none_or(|cell| !cell.is_end()) {
                    cells.push(Value::end());
                }
                SeriesData::Cells(cells)
            }
            SeriesData::Singular(cell) => {
                flags |= SeriesFlags::ARRAY;
                SeriesData::Singular(cell)
            }
            other => other,
        };
        let series = Series {
            flags,
            data,
            link: Link::None,
            misc: Misc::None,
            marked: false,
        };
        self.charge(series.footprint());
        self.stats.allocations += 1;
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = Some(series);
                SeriesId(index)
            }
            None => {
                self.nodes.push(Some(series));
                SeriesId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn cells_with_capacity(&self, len: usize) -> Vec<Value> {
        Vec::with_capacity(self.settings.capacity_for(len + 1))
    }

    /// Managed array holding a copy of `values`.
    pub fn make_array(&mut self, values: &[Value]) -> SeriesId {
        let mut cells = self.cells_with_capacity(values.len());
        cells.extend_from_slice(values);
        self.alloc(SeriesData::Cells(cells), SeriesFlags::MANAGED)
    }

    /// Array the caller must free or [`manage`](Heap::manage).
    pub fn make_array_unmanaged(&mut self, values: &[Value]) -> SeriesId {
        let mut cells = self.cells_with_capacity(values.len());
        cells.extend_from_slice(values);
        self.alloc(SeriesData::Cells(cells), SeriesFlags::empty())
    }

    pub fn make_string(&mut self, text: &str) -> SeriesId {
        let mut chars = Vec::with_capacity(self.settings.capacity_for(text.len()));
        chars.extend(text.chars());
        self.alloc(SeriesData::Wide(chars), SeriesFlags::MANAGED)
    }

    pub fn make_chars(&mut self, chars: Vec<char>) -> SeriesId {
        self.alloc(SeriesData::Wide(chars), SeriesFlags::MANAGED)
    }

    pub fn make_binary(&mut self, bytes: Vec<u8>) -> SeriesId {
        self.alloc(SeriesData::Bytes(bytes), SeriesFlags::MANAGED)
    }

    pub fn make_singular(&mut self, cell: Value, flags: SeriesFlags) -> SeriesId {
        self.alloc(SeriesData::Singular(cell), flags)
    }

    pub fn manage(&mut self, id: SeriesId) {
        self.series_mut(id).flags.insert(SeriesFlags::MANAGED);
    }

    /// Releases an unmanaged series.
    pub fn free(&mut self, id: SeriesId) {
        let series = self.series(id);
        assert!(
            !series.flags.contains(SeriesFlags::MANAGED),
            "explicit free of managed series {id:?}"
        );
        self.release(id);
    }

    pub(crate) fn release(&mut self, id: SeriesId) {
        if let Some(mut series) = self.nodes[id.0 as usize].take() {
            if let Misc::Handle(ref mut handle) = series.misc {
                handle.run_cleanup();
            }
            self.stats.frees += 1;
            self.free.push(id.0);
        }
    }

    // ── node access ──────────────────────────────────────────────

    #[inline]
    pub fn is_live(&self, id: SeriesId) -> bool {
        matches!(self.nodes.get(id.0 as usize), Some(Some(_)))
    }

    #[inline]
    pub fn series(&self, id: SeriesId) -> &Series {
        self.nodes[id.0 as usize]
            .as_ref()
            .expect("series accessed after it was freed")
    }

    #[inline]
    pub fn series_mut(&mut self, id: SeriesId) -> &mut Series {
        self.nodes[id.0 as usize]
            .as_mut()
            .expect("series accessed after it was freed")
    }

    #[inline]
    pub fn flags(&self, id: SeriesId) -> SeriesFlags {
        self.series(id).flags
    }

    pub fn set_flags(&mut self, id: SeriesId, flags: SeriesFlags) {
        self.series_mut(id).flags.insert(flags);
    }

    pub fn clear_flags(&mut self, id: SeriesId, flags: SeriesFlags) {
        self.series_mut(id).flags.remove(flags);
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_some())
            .map(|(index, _)| SeriesId(index as u32))
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Series> {
        self.nodes.iter_mut().flatten()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn link(&self, id: SeriesId) -> &Link {
        &self.series(id).link
    }

    pub fn set_link(&mut self, id: SeriesId, link: Link) {
        self.series_mut(id).link = link;
    }

    pub fn misc(&self, id: SeriesId) -> &Misc {
        &self.series(id).misc
    }

    pub fn set_misc(&mut self, id: SeriesId, misc: Misc) {
        self.series_mut(id).misc = misc;
    }

    /// Keylist of a varlist.
    pub fn keylist(&self, varlist: SeriesId) -> SeriesId {
        match self.series(varlist).link {
            Link::Keylist(keylist) => keylist,
            _ => panic!("series {varlist:?} is not a varlist"),
        }
    }

    // ── reading ──────────────────────────────────────────────────

    pub fn len(&self, id: SeriesId) -> usize {
        match &self.series(id).data {
            SeriesData::Bytes(bytes) => bytes.len(),
            SeriesData::Wide(chars) => chars.len(),
            SeriesData::Cells(cells) => cells.len() - 1,
            SeriesData::Singular(_) => 1,
            SeriesData::Stack(slots) => slots.len(),
            SeriesData::Inaccessible => 0,
        }
    }

    /// Cells of an array, without the terminator.
    pub fn array(&self, id: SeriesId) -> Result<&[Value]> {
        match &self.series(id).data {
            SeriesData::Cells(cells) => Ok(&cells[..cells.len() - 1]),
            SeriesData::Singular(cell) => Ok(std::slice::from_ref(cell)),
            SeriesData::Stack(slots) => Ok(self.chunks.cells(*slots)),
            SeriesData::Inaccessible => Err(inaccessible()),
            _ => Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::Block))),
        }
    }

    /// Cell at `index`, END past the tail.
    pub fn at(&self, id: SeriesId, index: usize) -> Result<Value> {
        Ok(self.array(id)?.get(index).copied().unwrap_or(Value::END))
    }

    /// Like [`at`](Heap::at) but END for anything unreadable.
    #[inline]
    pub fn cell(&self, id: SeriesId, index: usize) -> Value {
        self.at(id, index).unwrap_or(Value::END)
    }

    /// Whether the array's storage still ends with its terminator.
    pub fn is_terminated(&self, id: SeriesId) -> bool {
        match &self.series(id).data {
            SeriesData::Cells(cells) => cells.last().is_some_and(Value::is_end),
            _ => true,
        }
    }

    pub fn bytes(&self, id: SeriesId) -> Result<&[u8]> {
        match &self.series(id).data {
            SeriesData::Bytes(bytes) => Ok(bytes),
            SeriesData::Inaccessible => Err(inaccessible()),
            _ => Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::Binary))),
        }
    }

    pub fn chars(&self, id: SeriesId) -> Result<&[char]> {
        match &self.series(id).data {
            SeriesData::Wide(chars) => Ok(chars),
            SeriesData::Inaccessible => Err(inaccessible()),
            _ => Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::String))),
        }
    }

    pub fn string(&self, id: SeriesId) -> Result<String> {
        Ok(self.chars(id)?.iter().collect())
    }

    // ── mutation ─────────────────────────────────────────────────

    pub fn check_mutable(&self, id: SeriesId) -> Result<()> {
        let flags = self.flags(id);
        if flags.contains(SeriesFlags::INACCESSIBLE) {
            return Err(inaccessible());
        }
        if flags.intersects(SeriesFlags::LOCKED | SeriesFlags::FROZEN | SeriesFlags::PROTECTED) {
            return Err(protected());
        }
        Ok(())
    }

    fn check_resizable(&self, id: SeriesId) -> Result<()> {
        self.check_mutable(id)?;
        if self.flags(id).contains(SeriesFlags::FIXED_SIZE) {
            return Err(protected());
        }
        Ok(())
    }

    /// Writes one cell. Frame varlists are writable through here too.
    pub fn set_at(&mut self, id: SeriesId, index: usize, value: Value) -> Result<()> {
        self.check_mutable(id)?;
        self.poke_unchecked(id, index, value)
    }

    /// Writes one cell ignoring protection flags (variable writes check
    /// their key instead).
    pub(crate) fn poke_unchecked(&mut self, id: SeriesId, index: usize, value: Value) -> Result<()> {
        let series = self.nodes[id.0 as usize]
            .as_mut()
            .expect("series accessed after it was freed");
        match &mut series.data {
            SeriesData::Cells(cells) if index + 1 < cells.len() => {
                cells[index] = value;
                Ok(())
            }
            SeriesData::Singular(cell) if index == 0 => {
                *cell = value;
                Ok(())
            }
            SeriesData::Stack(slots) => {
                let slots = *slots;
                match self.chunks.get_mut(slots, index) {
                    Some(cell) => {
                        *cell = value;
                        Ok(())
                    }
                    None => Err(Error::arg(ErrorId::OutOfRange, Value::integer(index as i64 + 1))),
                }
            }
            SeriesData::Inaccessible => Err(inaccessible()),
            _ => Err(Error::arg(ErrorId::OutOfRange, Value::integer(index as i64 + 1))),
        }
    }

    pub fn append(&mut self, id: SeriesId, value: Value) -> Result<()> {
        let len = self.len(id);
        self.insert(id, len, &[value])
    }

    /// Inserts cells before `index` (clamped to the tail).
    pub fn insert(&mut self, id: SeriesId, index: usize, values: &[Value]) -> Result<()> {
        self.check_resizable(id)?;
        let needed = self.len(id) + values.len() + 1;
        let target = self.settings.capacity_for(needed);
        let mut grown = 0;
        match &mut self.series_mut(id).data {
            SeriesData::Cells(cells) => {
                if needed > cells.capacity() {
                    let before = cells.capacity();
                    cells.reserve_exact(target - cells.len());
                    grown = (cells.capacity() - before) * size_of::<Value>();
                }
                let index = index.min(cells.len() - 1);
                cells.splice(index..index, values.iter().copied());
            }
            _ => return Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::Block))),
        }
        if grown > 0 {
            self.charge(grown);
        }
        Ok(())
    }

    /// Opens a gap of `delta` blank cells (or zero bytes / spaces) at `at`.
    pub fn expand(&mut self, id: SeriesId, at: usize, delta: usize) -> Result<()> {
        self.check_resizable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Cells(cells) => {
                let at = at.min(cells.len() - 1);
                cells.splice(at..at, std::iter::repeat_n(Value::BLANK, delta));
            }
            SeriesData::Bytes(bytes) => {
                let at = at.min(bytes.len());
                bytes.splice(at..at, std::iter::repeat_n(0u8, delta));
            }
            SeriesData::Wide(chars) => {
                let at = at.min(chars.len());
                chars.splice(at..at, std::iter::repeat_n(' ', delta));
            }
            _ => return Err(protected()),
        }
        self.charge(delta);
        Ok(())
    }

    /// Removes up to `count` elements starting at `at`.
    pub fn remove(&mut self, id: SeriesId, at: usize, count: usize) -> Result<()> {
        self.check_resizable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Cells(cells) => {
                let len = cells.len() - 1;
                let at = at.min(len);
                let end = (at + count).min(len);
                cells.drain(at..end);
            }
            SeriesData::Bytes(bytes) => {
                let at = at.min(bytes.len());
                let end = (at + count).min(bytes.len());
                bytes.drain(at..end);
            }
            SeriesData::Wide(chars) => {
                let at = at.min(chars.len());
                let end = (at + count).min(chars.len());
                chars.drain(at..end);
            }
            _ => return Err(protected()),
        }
        Ok(())
    }

    /// Truncates to `len` elements, re-terminating arrays.
    pub fn set_len(&mut self, id: SeriesId, len: usize) -> Result<()> {
        let current = self.len(id);
        if len >= current {
            return Ok(());
        }
        self.remove(id, len, current - len)
    }

    pub fn insert_bytes(&mut self, id: SeriesId, index: usize, data: &[u8]) -> Result<()> {
        self.check_resizable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Bytes(bytes) => {
                let index = index.min(bytes.len());
                bytes.splice(index..index, data.iter().copied());
            }
            _ => return Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::Binary))),
        }
        self.charge(data.len());
        Ok(())
    }

    pub fn insert_chars(&mut self, id: SeriesId, index: usize, data: &[char]) -> Result<()> {
        self.check_resizable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Wide(chars) => {
                let index = index.min(chars.len());
                chars.splice(index..index, data.iter().copied());
            }
            _ => return Err(Error::arg(ErrorId::InvalidType, Value::datatype(Kind::String))),
        }
        self.charge(data.len() * size_of::<char>());
        Ok(())
    }

    pub fn set_byte(&mut self, id: SeriesId, index: usize, byte: u8) -> Result<()> {
        self.check_mutable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Bytes(bytes) if index < bytes.len() => {
                bytes[index] = byte;
                Ok(())
            }
            _ => Err(Error::arg(ErrorId::OutOfRange, Value::integer(index as i64 + 1))),
        }
    }

    pub fn set_char(&mut self, id: SeriesId, index: usize, c: char) -> Result<()> {
        self.check_mutable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Wide(chars) if index < chars.len() => {
                chars[index] = c;
                Ok(())
            }
            _ => Err(Error::arg(ErrorId::OutOfRange, Value::integer(index as i64 + 1))),
        }
    }

    pub fn reverse(&mut self, id: SeriesId, from: usize) -> Result<()> {
        self.check_mutable(id)?;
        match &mut self.series_mut(id).data {
            SeriesData::Cells(cells) => {
                let len = cells.len() - 1;
                cells[from.min(len)..len].reverse();
            }
            SeriesData::Bytes(bytes) => {
                let len = bytes.len();
                bytes[from.min(len)..].reverse();
            }
            SeriesData::Wide(chars) => {
                let len = chars.len();
                chars[from.min(len)..].reverse();
            }
            _ => return Err(protected()),
        }
        Ok(())
    }

    /// Ends a frame varlist's stack life.
    pub(crate) fn decay_varlist(&mut self, varlist: SeriesId) {
        let series = self.series_mut(varlist);
        series.data = SeriesData::Inaccessible;
        series.flags.insert(SeriesFlags::INACCESSIBLE);
    }

    // ── copying ──────────────────────────────────────────────────

    /// Copies `[from, to)` of any series into a new managed series.
    pub fn copy_range(&mut self, id: SeriesId, from: usize, to: usize) -> Result<SeriesId> {
        let len = self.len(id);
        let to = to.min(len);
        let from = from.min(to);
        let data = match &self.series(id).data {
            SeriesData::Bytes(bytes) => SeriesData::Bytes(bytes[from..to].to_vec()),
            SeriesData::Wide(chars) => SeriesData::Wide(chars[from..to].to_vec()),
            SeriesData::Inaccessible => return Err(inaccessible()),
            _ => {
                let cells = self.array(id)?[from..to].to_vec();
                SeriesData::Cells(cells)
            }
        };
        Ok(self.alloc(data, SeriesFlags::MANAGED))
    }

    /// Copies an array from `from`; with `deep`, nested series are copied
    /// too.
    pub fn copy_array(&mut self, id: SeriesId, from: usize, deep: bool) -> Result<SeriesId> {
        let len = self.len(id);
        let copy = self.copy_range(id, from, len)?;
        if deep {
            self.deepen(copy)?;
        }
        Ok(copy)
    }

    /// Replaces every nested series reference in `id` with a deep copy.
    pub fn deepen(&mut self, id: SeriesId) -> Result<()> {
        let cells = self.array(id)?.to_vec();
        for (index, cell) in cells.into_iter().enumerate() {
            if !cell.kind.is_any_series() {
                continue;
            }
            let Some(series) = cell.as_series() else {
                continue;
            };
            let nested = if cell.kind.is_any_array() {
                self.copy_array(series.series, 0, true)?
            } else {
                let len = self.len(series.series);
                self.copy_range(series.series, 0, len)?
            };
            let mut copied = cell;
            if let Payload::Series(ref mut r) = copied.payload {
                r.series = nested;
            }
            self.poke_unchecked(id, index, copied)?;
        }
        Ok(())
    }

    // ── protection ───────────────────────────────────────────────

    /// Locks an array and every array reachable from it.
    pub fn freeze_deep(&mut self, id: SeriesId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !self.is_live(id) || self.flags(id).contains(SeriesFlags::FROZEN) {
                continue;
            }
            self.set_flags(id, SeriesFlags::FROZEN | SeriesFlags::LOCKED);
            if let Ok(cells) = self.array(id) {
                pending.extend(
                    cells
                        .iter()
                        .filter(|cell| cell.kind.is_any_series())
                        .filter_map(|cell| cell.as_series())
                        .map(|series| series.series),
                );
            }
        }
    }

    pub fn is_frozen(&self, id: SeriesId) -> bool {
        self.flags(id).contains(SeriesFlags::FROZEN)
    }

    pub fn is_locked(&self, id: SeriesId) -> bool {
        self.flags(id)
            .intersects(SeriesFlags::LOCKED | SeriesFlags::FROZEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(HeapSettings::default(), 64, SignalHandle::new(100))
    }

    #[test]
    fn arrays_are_terminated() {
        let mut heap = heap();
        let id = heap.make_array(&[Value::integer(1), Value::integer(2)]);
        assert_eq!(heap.len(id), 2);
        assert!(heap.is_terminated(id));
        assert!(heap.cell(id, 2).is_end());

        heap.append(id, Value::integer(3)).unwrap();
        heap.insert(id, 0, &[Value::BLANK; 40]).unwrap();
        assert!(heap.is_terminated(id));
        heap.remove(id, 0, 41).unwrap();
        assert!(heap.is_terminated(id));
        assert_eq!(heap.array(id).unwrap(), &[Value::integer(2), Value::integer(3)]);
        heap.set_len(id, 0).unwrap();
        assert!(heap.is_terminated(id));
        assert_eq!(heap.len(id), 0);
    }

    #[test]
    fn locked_series_reject_mutation() {
        let mut heap = heap();
        let id = heap.make_array(&[Value::integer(1)]);
        heap.set_flags(id, SeriesFlags::LOCKED);
        let err = heap.append(id, Value::integer(2)).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Protected));
        assert!(heap.set_at(id, 0, Value::BLANK).is_err());
    }

    #[test]
    fn freeze_is_transitive() {
        let mut heap = heap();
        let inner = heap.make_array(&[Value::integer(1)]);
        let outer = heap.make_array(&[Value::block(inner)]);
        heap.freeze_deep(outer);
        assert!(heap.is_frozen(inner));
        assert!(heap.append(inner, Value::BLANK).is_err());
    }

    #[test]
    fn deep_copy_detaches_nested() {
        let mut heap = heap();
        let inner = heap.make_array(&[Value::integer(1)]);
        let outer = heap.make_array(&[Value::block(inner)]);
        let copy = heap.copy_array(outer, 0, true).unwrap();
        let nested = heap.cell(copy, 0).as_series().unwrap().series;
        assert_ne!(nested, inner);
        heap.append(nested, Value::integer(2)).unwrap();
        assert_eq!(heap.len(inner), 1);
    }

    #[test]
    fn freed_ids_are_reused() {
        let mut heap = heap();
        let a = heap.make_array_unmanaged(&[]);
        heap.free(a);
        assert!(!heap.is_live(a));
        let b = heap.make_array(&[]);
        assert_eq!(a, b);
    }

    #[test]
    fn ballast_exhaustion_raises_recycle() {
        let signals = SignalHandle::new(100);
        let settings = HeapSettings {
            ballast: 256,
            ..Default::default()
        };
        let mut heap = Heap::new(settings, 64, signals.clone());
        for _ in 0..16 {
            heap.make_array(&[Value::BLANK; 8]);
        }
        assert!(signals.pending().contains(SignalFlags::RECYCLE));
    }
}
