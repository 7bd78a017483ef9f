//! HANDLE! payloads and foreign objects.
//!
//! A handle is a singular series whose misc slot holds an opaque datum and
//! a length. A cleanup closure, if any, runs exactly once: when the
//! collector frees the handle or when the heap is dropped.

use std::any::Any;

use crate::error::{Error, ErrorId, Result};
use crate::series::{Heap, Misc, SeriesFlags, SeriesId};
use crate::value::Value;

pub type Cleanup = Box<dyn FnOnce(Box<dyn Any>)>;

pub struct HandleData {
    datum: Option<Box<dyn Any>>,
    pub len: usize,
    cleanup: Option<Cleanup>,
}

impl HandleData {
    pub fn datum(&self) -> Option<&dyn Any> {
        self.datum.as_deref()
    }

    pub fn datum_mut(&mut self) -> Option<&mut (dyn Any + 'static)> {
        self.datum.as_deref_mut()
    }

    pub(crate) fn run_cleanup(&mut self) {
        if let (Some(datum), Some(cleanup)) = (self.datum.take(), self.cleanup.take()) {
            cleanup(datum);
        }
    }
}

impl Drop for HandleData {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

/// Allocates a managed handle around `datum`.
pub fn make_handle(heap: &mut Heap, datum: Box<dyn Any>, len: usize, cleanup: Option<Cleanup>) -> SeriesId {
    let id = heap.make_singular(Value::BLANK, SeriesFlags::MANAGED);
    heap.poke_unchecked(id, 0, Value::handle(id))
        .expect("singular series has one cell");
    heap.set_misc(
        id,
        Misc::Handle(Box::new(HandleData {
            datum: Some(datum),
            len,
            cleanup,
        })),
    );
    id
}

pub fn handle_data(heap: &Heap, id: SeriesId) -> Result<&HandleData> {
    match heap.misc(id) {
        Misc::Handle(data) => Ok(data),
        _ => Err(Error::arg(ErrorId::InvalidArg, Value::handle(id))),
    }
}

pub fn handle_data_mut(heap: &mut Heap, id: SeriesId) -> Result<&mut HandleData> {
    match &mut heap.series_mut(id).misc {
        Misc::Handle(data) => Ok(data),
        _ => Err(Error::arg(ErrorId::InvalidArg, Value::handle(id))),
    }
}

/// Borrow of a handle's datum as `T`.
pub fn downcast<T: 'static>(heap: &Heap, id: SeriesId) -> Result<&T> {
    handle_data(heap, id)?
        .datum()
        .and_then(|datum| datum.downcast_ref::<T>())
        .ok_or_else(|| Error::arg(ErrorId::InvalidArg, Value::handle(id)))
}

pub fn downcast_mut<T: 'static>(heap: &mut Heap, id: SeriesId) -> Result<&mut T> {
    handle_data_mut(heap, id)?
        .datum_mut()
        .and_then(|datum| datum.downcast_mut::<T>())
        .ok_or_else(|| Error::arg(ErrorId::InvalidArg, Value::handle(id)))
}

/// Opaque host object (such as a GUI node) owned by the interpreter. The
/// concrete type is the embedder's choice; `release` runs when the
/// collector frees it.
pub fn make_foreign<T: Any>(heap: &mut Heap, object: T, release: impl FnOnce(T) + 'static) -> SeriesId {
    let cleanup: Cleanup = Box::new(move |datum: Box<dyn Any>| {
        if let Ok(object) = datum.downcast::<T>() {
            release(*object);
        }
    });
    make_handle(heap, Box::new(object), size_of::<T>(), Some(cleanup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapSettings;
    use crate::signal::SignalHandle;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn downcasts_to_stored_type() {
        let mut heap = Heap::new(HeapSettings::default(), 64, SignalHandle::new(10));
        let id = make_handle(&mut heap, Box::new(String::from("payload")), 7, None);
        assert_eq!(downcast::<String>(&heap, id).unwrap(), "payload");
        assert!(downcast::<u32>(&heap, id).is_err());
        downcast_mut::<String>(&mut heap, id).unwrap().push('!');
        assert_eq!(downcast::<String>(&heap, id).unwrap(), "payload!");
        assert_eq!(handle_data(&heap, id).unwrap().len, 7);
    }

    #[test]
    fn foreign_release_runs_on_drop() {
        struct Node(&'static str);
        let released = Rc::new(RefCell::new(Vec::new()));
        {
            let mut heap = Heap::new(HeapSettings::default(), 64, SignalHandle::new(10));
            let log = released.clone();
            make_foreign(&mut heap, Node("window"), move |node| log.borrow_mut().push(node.0));
        }
        assert_eq!(*released.borrow(), vec!["window"]);
    }
}
