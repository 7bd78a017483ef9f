//! Sources the evaluator reads cells from.
//!
//! The evaluator only ever looks at the current cell and steps past it, so
//! a source is anything that can do that: an array position, or a slice of
//! values handed over by the host. A variadic parameter needs the rest of
//! the source as an array it can walk later; [`Feed::reify`] provides one.

use crate::series::{Heap, SeriesId};
use crate::symbol::SymId;
use crate::value::{Kind, Specifier, Value};

pub trait Feed {
    /// Current cell, END when exhausted.
    fn current(&self, heap: &Heap) -> Value;

    fn advance(&mut self);

    /// Context relative words in this source resolve against.
    fn specifier(&self) -> Specifier;

    /// Array and index of the current cell, if the source is an array.
    fn position(&self) -> Option<(SeriesId, usize)>;

    /// The remaining cells as an array position.
    fn reify(&mut self, heap: &mut Heap) -> (SeriesId, usize);

    /// Whether cells are taken as-is rather than evaluated (APPLY-style).
    fn is_inert(&self) -> bool {
        false
    }

    #[inline]
    fn at_end(&self, heap: &Heap) -> bool {
        self.current(heap).is_end()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArrayFeed {
    array: SeriesId,
    index: usize,
    specifier: Specifier,
}

impl ArrayFeed {
    pub fn new(array: SeriesId, index: usize, specifier: Specifier) -> Self {
        Self {
            array,
            index,
            specifier,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Feed for ArrayFeed {
    #[inline]
    fn current(&self, heap: &Heap) -> Value {
        heap.cell(self.array, self.index)
    }

    #[inline]
    fn advance(&mut self) {
        self.index += 1;
    }

    fn specifier(&self) -> Specifier {
        self.specifier
    }

    fn position(&self) -> Option<(SeriesId, usize)> {
        Some((self.array, self.index))
    }

    fn reify(&mut self, _heap: &mut Heap) -> (SeriesId, usize) {
        (self.array, self.index)
    }
}

/// Values supplied by the host. The caller keeps them guarded for the life
/// of the feed.
pub struct ValuesFeed<'a> {
    values: &'a [Value],
    index: usize,
    inert: bool,
    reified: Option<(SeriesId, usize)>,
}

impl<'a> ValuesFeed<'a> {
    /// Values evaluated as if they were source.
    pub fn new(values: &'a [Value]) -> Self {
        Self {
            values,
            index: 0,
            inert: false,
            reified: None,
        }
    }

    /// Values used literally as arguments.
    pub fn inert(values: &'a [Value]) -> Self {
        Self {
            inert: true,
            ..Self::new(values)
        }
    }

    pub fn consumed(&self) -> usize {
        self.index
    }
}

impl Feed for ValuesFeed<'_> {
    fn current(&self, _heap: &Heap) -> Value {
        self.values.get(self.index).copied().unwrap_or(Value::END)
    }

    fn advance(&mut self) {
        self.index += 1;
        if let Some((_, ref mut position)) = self.reified {
            *position += 1;
        }
    }

    fn specifier(&self) -> Specifier {
        None
    }

    fn position(&self) -> Option<(SeriesId, usize)> {
        self.reified
    }

    /// Copies the unconsumed values into an array. If some were already
    /// consumed, a placeholder word stands in for them at index 0.
    fn reify(&mut self, heap: &mut Heap) -> (SeriesId, usize) {
        if let Some(reified) = self.reified {
            return reified;
        }
        let rest = &self.values[self.index.min(self.values.len())..];
        let reified = if self.index > 0 {
            let mut cells = Vec::with_capacity(rest.len() + 1);
            cells.push(Value::word(Kind::Word, SymId::OptimizedOut.symbol()));
            cells.extend_from_slice(rest);
            (heap.make_array(&cells), 1)
        } else {
            (heap.make_array(rest), 0)
        };
        self.reified = Some(reified);
        reified
    }

    fn is_inert(&self) -> bool {
        self.inert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapSettings;
    use crate::signal::SignalHandle;

    fn heap() -> Heap {
        Heap::new(HeapSettings::default(), 64, SignalHandle::new(10))
    }

    #[test]
    fn array_feed_walks_to_end() {
        let mut heap = heap();
        let array = heap.make_array(&[Value::integer(1), Value::integer(2)]);
        let mut feed = ArrayFeed::new(array, 0, None);
        assert_eq!(feed.current(&heap), Value::integer(1));
        feed.advance();
        assert_eq!(feed.current(&heap), Value::integer(2));
        feed.advance();
        assert!(feed.at_end(&heap));
        assert_eq!(feed.reify(&mut heap), (array, 2));
    }

    #[test]
    fn values_feed_reify_marks_consumed_prefix() {
        let mut heap = heap();
        let values = [Value::integer(1), Value::integer(2), Value::integer(3)];
        let mut feed = ValuesFeed::new(&values);
        feed.advance();
        let (array, index) = feed.reify(&mut heap);
        assert_eq!(index, 1);
        assert_eq!(heap.len(array), 3);
        assert_eq!(heap.cell(array, 0).kind, Kind::Word);
        assert_eq!(heap.cell(array, index), Value::integer(2));
        feed.advance();
        assert_eq!(feed.position(), Some((array, 2)));
        assert_eq!(feed.current(&heap), Value::integer(3));
    }

    #[test]
    fn fresh_values_feed_reifies_without_placeholder() {
        let mut heap = heap();
        let values = [Value::integer(1)];
        let mut feed = ValuesFeed::inert(&values);
        assert!(feed.is_inert());
        let (array, index) = feed.reify(&mut heap);
        assert_eq!((heap.len(array), index), (1, 0));
    }
}
