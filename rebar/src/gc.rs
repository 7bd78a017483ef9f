//! Mark/sweep collector over the series heap.
//!
//! Marking starts from an explicit root set (see [`InterpRoots`]) plus every
//! node the heap itself must keep: API-held series and unmanaged series,
//! whose contents are live for as long as their owner holds them. Marking
//! is iterative over a worklist, so cycles and deep nesting are fine.
//! Sweeping frees unmarked managed nodes, running handle cleanups first.

use crate::chunk::ChunkStack;
use crate::interp::Frame;
use crate::series::{Heap, Link, Misc, SeriesData, SeriesFlags, SeriesId};
use crate::symbol::SymbolTable;
use crate::value::{Payload, Value};

/// Consumers implement this to provide GC roots.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(&Value));
}

/// Root set borrowed from interpreter state.
pub struct InterpRoots<'a> {
    pub root: SeriesId,
    pub task: SeriesId,
    pub frames: &'a [Frame],
    pub guards: &'a [Value],
    pub data_stack: &'a [Value],
    pub chunks: &'a ChunkStack,
}

impl RootProvider for InterpRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(&Value)) {
        visitor(&Value::block(self.root));
        visitor(&Value::block(self.task));
        for frame in self.frames {
            visitor(&Value::block(frame.varlist));
            visitor(&Value::block(frame.keylist));
            visitor(&Value::block(frame.phase));
            if let Some(binding) = frame.binding {
                visitor(&Value::block(binding));
            }
            if let Some((source, _)) = frame.near {
                visitor(&Value::block(source));
            }
        }
        for value in self.guards.iter().chain(self.data_stack) {
            visitor(value);
        }
        for value in self.chunks.live_cells() {
            visitor(value);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub marked: usize,
    pub swept: usize,
    pub live: usize,
    pub symbols_swept: usize,
}

struct Marker<'a> {
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    pending: Vec<SeriesId>,
    marked: usize,
}

impl Marker<'_> {
    fn queue(&mut self, id: SeriesId) {
        if !self.heap.is_live(id) {
            return;
        }
        let series = self.heap.series_mut(id);
        if !series.marked {
            series.marked = true;
            self.marked += 1;
            self.pending.push(id);
        }
    }

    fn value(&mut self, value: &Value) {
        match value.payload {
            Payload::Word(word) => self.symbols.mark(word.spelling),
            Payload::Typeset(key) => {
                if let Some(spelling) = key.spelling {
                    self.symbols.mark(spelling);
                }
            }
            _ => {}
        }
        if let Some(id) = value.referenced_series() {
            self.queue(id);
        }
        if let Some(id) = value.referenced_binding() {
            self.queue(id);
        }
    }

    fn drain(&mut self) {
        let mut cells = Vec::new();
        let mut extra = Vec::new();
        while let Some(id) = self.pending.pop() {
            cells.clear();
            extra.clear();
            {
                let series = self.heap.series(id);
                match &series.data {
                    SeriesData::Cells(array) => cells.extend_from_slice(array),
                    SeriesData::Singular(cell) => cells.push(*cell),
                    SeriesData::Stack(slots) => {
                        cells.extend_from_slice(self.heap.chunks.cells(*slots))
                    }
                    SeriesData::Bytes(_) | SeriesData::Wide(_) | SeriesData::Inaccessible => {}
                }
                match &series.link {
                    Link::Keylist(keylist) => extra.push(*keylist),
                    Link::Function(info) => extra.extend(info.referents()),
                    Link::None => {}
                }
                match &series.misc {
                    Misc::Meta(meta) => extra.push(*meta),
                    Misc::Varargs(state) => extra.extend(state.referents()),
                    Misc::Handle(_) | Misc::None => {}
                }
            }
            for cell in &cells {
                self.value(cell);
            }
            for &id in &extra {
                self.queue(id);
            }
        }
    }
}

/// Runs one full collection. Idempotent: a second run with the same roots
/// frees nothing.
pub fn recycle(heap: &mut Heap, symbols: &mut SymbolTable, roots: &[Value]) -> GcStats {
    for series in heap.nodes_mut() {
        series.marked = false;
    }
    symbols.clear_marks();

    let always: Vec<SeriesId> = heap
        .ids()
        .filter(|&id| {
            let flags = heap.flags(id);
            flags.contains(SeriesFlags::API) || !flags.contains(SeriesFlags::MANAGED)
        })
        .collect();

    let mut marker = Marker {
        heap: &mut *heap,
        symbols: &mut *symbols,
        pending: Vec::new(),
        marked: 0,
    };
    for id in always {
        marker.queue(id);
    }
    for value in roots {
        marker.value(value);
    }
    marker.drain();
    let marked = marker.marked;

    let dead: Vec<SeriesId> = heap
        .ids()
        .filter(|&id| {
            let series = heap.series(id);
            !series.marked && series.flags.contains(SeriesFlags::MANAGED)
        })
        .collect();
    for &id in &dead {
        heap.release(id);
    }
    let symbols_swept = symbols.sweep();

    heap.stats.recycles += 1;
    heap.stats.last_swept = dead.len();
    GcStats {
        marked,
        swept: dead.len(),
        live: heap.live_count(),
        symbols_swept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapSettings;
    use crate::signal::SignalHandle;
    use crate::value::Kind;

    fn heap() -> (Heap, SymbolTable) {
        let heap = Heap::new(HeapSettings::default(), 64, SignalHandle::new(100));
        (heap, SymbolTable::new())
    }

    #[test]
    fn unreachable_series_are_swept() {
        let (mut heap, mut symbols) = heap();
        let kept = heap.make_array(&[Value::integer(1)]);
        let garbage = heap.make_array(&[Value::integer(2)]);
        let stats = recycle(&mut heap, &mut symbols, &[Value::block(kept)]);
        assert_eq!(stats.swept, 1);
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(garbage));
    }

    #[test]
    fn cycles_are_collected_and_kept_alike() {
        let (mut heap, mut symbols) = heap();
        let a = heap.make_array(&[]);
        let b = heap.make_array(&[Value::block(a)]);
        heap.append(a, Value::block(b)).unwrap();
        recycle(&mut heap, &mut symbols, &[Value::block(a)]);
        assert!(heap.is_live(a) && heap.is_live(b));
        recycle(&mut heap, &mut symbols, &[]);
        assert!(!heap.is_live(a) && !heap.is_live(b));
    }

    #[test]
    fn second_pass_frees_nothing() {
        let (mut heap, mut symbols) = heap();
        let inner = heap.make_array(&[Value::integer(1)]);
        let outer = heap.make_array(&[Value::block(inner)]);
        for _ in 0..10 {
            heap.make_array(&[]);
        }
        let roots = [Value::block(outer)];
        let first = recycle(&mut heap, &mut symbols, &roots);
        let second = recycle(&mut heap, &mut symbols, &roots);
        assert_eq!(first.swept, 10);
        assert_eq!(second.swept, 0);
        assert_eq!(first.live, second.live);
        assert_eq!(heap.array(outer).unwrap(), &[Value::block(inner)]);
    }

    #[test]
    fn unmanaged_and_api_series_survive() {
        let (mut heap, mut symbols) = heap();
        let manual = heap.make_array_unmanaged(&[]);
        let held = heap.make_array(&[]);
        let referent = heap.make_array(&[]);
        heap.set_flags(held, SeriesFlags::API);
        heap.append(manual, Value::block(referent)).unwrap();
        recycle(&mut heap, &mut symbols, &[]);
        assert!(heap.is_live(manual));
        assert!(heap.is_live(held));
        assert!(heap.is_live(referent));
        heap.free(manual);
    }

    #[test]
    fn words_keep_their_symbols() {
        let (mut heap, mut symbols) = heap();
        let kept = symbols.intern("kept-word");
        let lost = symbols.intern("lost-word");
        let block = heap.make_array(&[Value::word(Kind::Word, kept)]);
        let stats = recycle(&mut heap, &mut symbols, &[Value::block(block)]);
        assert_eq!(stats.symbols_swept, 1);
        assert_eq!(symbols.lookup("kept-word"), Some(kept));
        assert!(symbols.lookup("lost-word").is_none());
        let _ = lost;
    }

    #[test]
    fn handle_cleanup_runs_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let (mut heap, mut symbols) = heap();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let handle = crate::handle::make_handle(
            &mut heap,
            Box::new(7u32),
            4,
            Some(Box::new(move |_: Box<dyn std::any::Any>| seen.set(seen.get() + 1))),
        );
        recycle(&mut heap, &mut symbols, &[Value::handle(handle)]);
        assert_eq!(count.get(), 0);
        recycle(&mut heap, &mut symbols, &[]);
        assert_eq!(count.get(), 1);
        recycle(&mut heap, &mut symbols, &[]);
        assert_eq!(count.get(), 1);
    }
}
