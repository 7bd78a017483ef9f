//! Contexts and binding.
//!
//! A context is a varlist `[rootvar v1 .. vN]` whose link names a keylist
//! `[_ k1 .. kN]` of typeset keys. Keylists are never mutated once a context
//! points at them: growing a context or changing a key's flags gives that
//! context a fresh keylist, leaving every other sharer untouched.
//!
//! Words cache the index they were last resolved at. A lookup trusts the
//! cache only when the key at that index still spells the same canon.

use ahash::AHashSet;

use crate::error::{Error, ErrorId, Result};
use crate::interp::Interp;
use crate::series::{Link, SeriesFlags, SeriesId};
use crate::value::{Binding, Key, Kind, ParamClass, ParamFlags, Payload, Specifier, TypeBits, Value, WordRef};
use crate::Symbol;

/// Key used for object fields: any value, void allowed.
pub fn field_key(spelling: Symbol) -> Key {
    Key {
        bits: TypeBits::ANY_VALUE,
        spelling: Some(spelling),
        class: ParamClass::Normal,
        flags: ParamFlags::OPTIONAL,
    }
}

impl Interp {
    // ── construction ──────────────────────────────────────────────

    pub fn make_keylist(&mut self, keys: &[Key]) -> SeriesId {
        let mut cells = Vec::with_capacity(keys.len() + 1);
        cells.push(Value::BLANK);
        cells.extend(keys.iter().map(|&key| Value::key(key)));
        let keylist = self.heap.make_array(&cells);
        self.heap.set_flags(keylist, SeriesFlags::KEYLIST);
        keylist
    }

    /// Context over an existing keylist, all fields void.
    pub fn make_context_with_keylist(&mut self, kind: Kind, keylist: SeriesId) -> SeriesId {
        let len = self.heap.len(keylist);
        let mut cells = vec![Value::VOID; len];
        cells[0] = Value::BLANK;
        let varlist = self.heap.make_array(&cells);
        self.heap.set_flags(varlist, SeriesFlags::VARLIST);
        self.heap.set_link(varlist, Link::Keylist(keylist));
        let rootvar = Value::context(kind, varlist);
        self.heap
            .poke_unchecked(varlist, 0, rootvar)
            .expect("fresh varlist has a rootvar slot");
        varlist
    }

    pub fn make_context(&mut self, kind: Kind, words: &[Symbol]) -> SeriesId {
        let keys: Vec<Key> = words.iter().map(|&sym| field_key(sym)).collect();
        let keylist = self.make_keylist(&keys);
        self.make_context_with_keylist(kind, keylist)
    }

    /// New context sharing `varlist`'s keylist, with copied field values.
    pub fn copy_context(&mut self, varlist: SeriesId, kind: Kind, deep: bool) -> Result<SeriesId> {
        let keylist = self.heap.keylist(varlist);
        let values = self.heap.array(varlist)?.to_vec();
        let copy = self.make_context_with_keylist(kind, keylist);
        for (index, value) in values.into_iter().enumerate().skip(1) {
            let value = match value.payload {
                Payload::Series(mut series) if deep && value.kind.is_any_series() => {
                    series.series = if value.kind.is_any_array() {
                        self.heap.copy_array(series.series, 0, true)?
                    } else {
                        let len = self.heap.len(series.series);
                        self.heap.copy_range(series.series, 0, len)?
                    };
                    Value { payload: Payload::Series(series), ..value }
                }
                // methods follow the copy instead of writing into the original
                Payload::Function(_) => self.rebind_function(value, varlist, copy)?,
                _ => value,
            };
            self.heap.poke_unchecked(copy, index, value)?;
        }
        Ok(copy)
    }

    // ── inspection ────────────────────────────────────────────────

    pub fn context_kind(&self, varlist: SeriesId) -> Kind {
        match self.heap.cell(varlist, 0).kind {
            Kind::End => Kind::Frame,
            kind => kind,
        }
    }

    /// Number of fields, not counting the rootvar.
    pub fn context_len(&self, varlist: SeriesId) -> usize {
        self.heap.len(self.heap.keylist(varlist)).saturating_sub(1)
    }

    pub fn key_at(&self, keylist: SeriesId, index: usize) -> Option<Key> {
        self.heap.cell(keylist, index).as_key()
    }

    /// Keys `1..=N` of a keylist.
    pub fn keys(&self, keylist: SeriesId) -> Result<Vec<Key>> {
        Ok(self
            .heap
            .array(keylist)?
            .iter()
            .skip(1)
            .filter_map(Value::as_key)
            .collect())
    }

    pub fn context_keys(&self, varlist: SeriesId) -> Result<Vec<Key>> {
        self.keys(self.heap.keylist(varlist))
    }

    /// 1-based index of `sym` in a keylist.
    pub fn find_key(&self, keylist: SeriesId, sym: Symbol, include_hidden: bool) -> Option<usize> {
        let canon = self.symbols.canon(sym);
        let cells = self.heap.array(keylist).ok()?;
        cells.iter().enumerate().skip(1).find_map(|(index, cell)| {
            let key = cell.as_key()?;
            let spelling = key.spelling?;
            let visible = include_hidden || !key.is_hidden();
            (visible && self.symbols.canon(spelling) == canon).then_some(index)
        })
    }

    pub fn find_in_context(&self, varlist: SeriesId, sym: Symbol) -> Option<usize> {
        self.find_key(self.heap.keylist(varlist), sym, false)
    }

    pub fn context_var(&self, varlist: SeriesId, index: usize) -> Result<Value> {
        if self.heap.flags(varlist).contains(SeriesFlags::INACCESSIBLE) {
            return Err(Error::raised(ErrorId::FrameNotOnStack));
        }
        self.heap.at(varlist, index)
    }

    pub fn set_context_var(&mut self, varlist: SeriesId, index: usize, value: Value) -> Result<()> {
        let keylist = self.heap.keylist(varlist);
        let key = self
            .key_at(keylist, index)
            .ok_or_else(|| Error::arg(ErrorId::OutOfRange, Value::integer(index as i64)))?;
        if key.flags.contains(ParamFlags::PROTECTED) {
            let word = key.spelling.map_or(Value::BLANK, |s| Value::word(Kind::Word, s));
            return Err(Error::arg(ErrorId::Locked, word));
        }
        if self.heap.is_locked(varlist) || self.heap.flags(varlist).contains(SeriesFlags::PROTECTED) {
            return Err(Error::raised(ErrorId::Protected));
        }
        self.heap.poke_unchecked(varlist, index, value)
    }

    // ── growth and key flags ──────────────────────────────────────

    /// Adds a void field named `sym` unless present; returns its index.
    pub fn append_context(&mut self, varlist: SeriesId, sym: Symbol) -> Result<usize> {
        self.extend_context(varlist, &[sym])?;
        let keylist = self.heap.keylist(varlist);
        Ok(self
            .find_key(keylist, sym, true)
            .expect("key was just added"))
    }

    /// Adds void fields for every symbol the context lacks, copying the
    /// keylist once.
    pub fn extend_context(&mut self, varlist: SeriesId, syms: &[Symbol]) -> Result<()> {
        let keylist = self.heap.keylist(varlist);
        let mut seen = AHashSet::new();
        let missing: Vec<Symbol> = syms
            .iter()
            .copied()
            .filter(|&sym| self.find_key(keylist, sym, true).is_none())
            .filter(|&sym| seen.insert(self.symbols.canon(sym)))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        if self.heap.flags(varlist).contains(SeriesFlags::STACK) {
            return Err(Error::raised(ErrorId::Protected));
        }
        self.heap.check_mutable(varlist)?;

        let mut cells = self.heap.array(keylist)?.to_vec();
        cells.extend(missing.iter().map(|&sym| Value::key(field_key(sym))));
        let fresh = self.heap.make_array(&cells);
        self.heap.set_flags(fresh, SeriesFlags::KEYLIST);
        self.heap.set_link(varlist, Link::Keylist(fresh));
        let len = self.heap.len(varlist);
        self.heap.insert(varlist, len, &vec![Value::VOID; missing.len()])?;
        Ok(())
    }

    /// Gives `varlist` a keylist nobody else holds.
    fn unique_keylist(&mut self, varlist: SeriesId) -> Result<SeriesId> {
        let keylist = self.heap.keylist(varlist);
        let cells = self.heap.array(keylist)?.to_vec();
        let fresh = self.heap.make_array(&cells);
        self.heap.set_flags(fresh, SeriesFlags::KEYLIST);
        self.heap.set_link(varlist, Link::Keylist(fresh));
        Ok(fresh)
    }

    pub fn set_key_flags(&mut self, varlist: SeriesId, index: usize, flags: ParamFlags, on: bool) -> Result<()> {
        if self.heap.flags(varlist).contains(SeriesFlags::STACK) {
            return Err(Error::raised(ErrorId::Protected));
        }
        let keylist = self.unique_keylist(varlist)?;
        let mut key = self
            .key_at(keylist, index)
            .ok_or_else(|| Error::arg(ErrorId::OutOfRange, Value::integer(index as i64)))?;
        key.flags.set(flags, on);
        self.heap.poke_unchecked(keylist, index, Value::key(key))
    }

    // ── collecting and binding ────────────────────────────────────

    /// Distinct (by canon) words of an array, in order of appearance.
    pub fn collect_words(&self, array: SeriesId, set_words_only: bool, deep: bool) -> Result<Vec<Symbol>> {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        let mut visited = AHashSet::new();
        self.collect_into(array, set_words_only, deep, &mut seen, &mut out, &mut visited)?;
        Ok(out)
    }

    fn collect_into(
        &self,
        array: SeriesId,
        set_words_only: bool,
        deep: bool,
        seen: &mut AHashSet<Symbol>,
        out: &mut Vec<Symbol>,
        visited: &mut AHashSet<SeriesId>,
    ) -> Result<()> {
        if !visited.insert(array) {
            return Ok(());
        }
        for cell in self.heap.array(array)?.iter() {
            let wanted = if set_words_only {
                cell.kind == Kind::SetWord
            } else {
                matches!(cell.kind, Kind::Word | Kind::SetWord | Kind::GetWord | Kind::LitWord)
            };
            if wanted {
                let sym = cell.symbol().expect("word kinds carry symbols");
                if seen.insert(self.symbols.canon(sym)) {
                    out.push(sym);
                }
            } else if deep && cell.kind.is_any_array() {
                let nested = cell.as_series().expect("arrays carry series payloads").series;
                self.collect_into(nested, set_words_only, deep, seen, out, visited)?;
            }
        }
        Ok(())
    }

    /// Binds the words of `array` that name a key of `varlist`.
    pub fn bind_array(&mut self, array: SeriesId, varlist: SeriesId, deep: bool) -> Result<()> {
        let keylist = self.heap.keylist(varlist);
        let target = BindTarget {
            keylist,
            binding: Binding::Specific(varlist),
            include_hidden: false,
        };
        self.bind_with(array, target, deep, &mut AHashSet::new())
    }

    /// Binds the words of a body copy that name parameters of `paramlist`,
    /// relative to that paramlist.
    pub fn bind_relative(&mut self, array: SeriesId, paramlist: SeriesId, deep: bool) -> Result<()> {
        let target = BindTarget {
            keylist: paramlist,
            binding: Binding::Relative(paramlist),
            include_hidden: true,
        };
        self.bind_with(array, target, deep, &mut AHashSet::new())
    }

    fn bind_with(&mut self, array: SeriesId, target: BindTarget, deep: bool, visited: &mut AHashSet<SeriesId>) -> Result<()> {
        if !visited.insert(array) {
            return Ok(());
        }
        let cells = self.heap.array(array)?.to_vec();
        for (index, cell) in cells.into_iter().enumerate() {
            if cell.kind.is_any_word() {
                let word = cell.as_word().expect("word kinds carry words");
                if let Some(found) = self.find_key(target.keylist, word.spelling, target.include_hidden) {
                    let key = self.key_at(target.keylist, found);
                    if key.is_some_and(|k| k.flags.contains(ParamFlags::UNBINDABLE)) {
                        continue;
                    }
                    let bound = Value {
                        payload: Payload::Word(WordRef {
                            spelling: word.spelling,
                            binding: target.binding,
                            index: found,
                        }),
                        ..cell
                    };
                    self.heap.poke_unchecked(array, index, bound)?;
                }
            } else if deep && cell.kind.is_any_array() {
                let nested = cell.as_series().expect("arrays carry series payloads").series;
                self.bind_with(nested, target, deep, visited)?;
            }
        }
        Ok(())
    }

    /// Rewrites words of `array` whose binding appears as the first half of
    /// a pair in `moves` to the second half, keeping their cached index.
    pub(crate) fn retarget_words(&mut self, array: SeriesId, moves: &[(Binding, Binding)]) -> Result<()> {
        let mut visited = AHashSet::new();
        let mut pending = vec![array];
        while let Some(array) = pending.pop() {
            if !visited.insert(array) {
                continue;
            }
            let cells = self.heap.array(array)?.to_vec();
            for (index, cell) in cells.into_iter().enumerate() {
                match cell.payload {
                    Payload::Word(word) => {
                        let Some(&(_, to)) = moves.iter().find(|(from, _)| *from == word.binding) else {
                            continue;
                        };
                        let moved = Value {
                            payload: Payload::Word(WordRef { binding: to, ..word }),
                            ..cell
                        };
                        self.heap.poke_unchecked(array, index, moved)?;
                    }
                    Payload::Series(series) if cell.kind.is_any_array() => pending.push(series.series),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Binds every word of `array` into `varlist`, adding fields for the
    /// ones it lacks.
    pub fn bind_adding(&mut self, array: SeriesId, varlist: SeriesId) -> Result<()> {
        let words = self.collect_words(array, false, true)?;
        self.extend_context(varlist, &words)?;
        self.bind_array(array, varlist, true)
    }

    // ── lookup ────────────────────────────────────────────────────

    /// Paramlist whose frame layout `paramlist` shares.
    pub fn underlying(&self, paramlist: SeriesId) -> SeriesId {
        match self.heap.link(paramlist) {
            Link::Function(info) => info.underlying,
            _ => paramlist,
        }
    }

    /// Concrete (varlist, index) a word refers to.
    pub fn resolve(&self, word: WordRef, specifier: Specifier) -> Result<(SeriesId, usize)> {
        let unbound = || Error::arg(ErrorId::NotBound, Value::word(Kind::Word, word.spelling));
        let varlist = match word.binding {
            Binding::Unbound => return Err(unbound()),
            Binding::Specific(varlist) => varlist,
            Binding::Relative(paramlist) => {
                let varlist = specifier.ok_or_else(unbound)?;
                if !self.heap.is_live(varlist) {
                    return Err(unbound());
                }
                let frame_keys = match self.heap.link(varlist) {
                    Link::Keylist(keylist) => *keylist,
                    _ => return Err(unbound()),
                };
                if self.underlying(frame_keys) != self.underlying(paramlist) {
                    return Err(unbound());
                }
                varlist
            }
        };
        if self.heap.flags(varlist).contains(SeriesFlags::INACCESSIBLE) {
            return Err(Error::raised(ErrorId::FrameNotOnStack));
        }
        let keylist = self.heap.keylist(varlist);
        let cached = self
            .key_at(keylist, word.index)
            .and_then(|key| key.spelling)
            .is_some_and(|spelling| word.index > 0 && self.symbols.same(spelling, word.spelling));
        if cached {
            return Ok((varlist, word.index));
        }
        match self.find_key(keylist, word.spelling, true) {
            Some(index) => Ok((varlist, index)),
            None => Err(unbound()),
        }
    }

    /// Value of a word; void if unset.
    pub fn get_var(&self, word: Value, specifier: Specifier) -> Result<Value> {
        let word = word.as_word().ok_or_else(|| Error::arg(ErrorId::InvalidArg, word))?;
        let (varlist, index) = self.resolve(word, specifier)?;
        self.heap.at(varlist, index)
    }

    pub fn set_var(&mut self, word: Value, specifier: Specifier, value: Value) -> Result<()> {
        let word = word.as_word().ok_or_else(|| Error::arg(ErrorId::InvalidArg, word))?;
        let (varlist, index) = self.resolve(word, specifier)?;
        self.set_context_var(varlist, index, value)
    }

    /// Copy of `value` that no longer needs `specifier` to be understood.
    pub fn derelativize(&self, value: Value, specifier: Specifier) -> Value {
        match value.payload {
            Payload::Word(word) => match word.binding {
                Binding::Relative(_) => match specifier {
                    Some(varlist) => Value {
                        payload: Payload::Word(WordRef {
                            binding: Binding::Specific(varlist),
                            ..word
                        }),
                        ..value
                    },
                    None => value,
                },
                _ => value,
            },
            Payload::Series(_) if value.kind.is_any_array() => value.with_specifier(specifier),
            _ => value,
        }
    }
}

#[derive(Clone, Copy)]
struct BindTarget {
    keylist: SeriesId,
    binding: Binding,
    include_hidden: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    #[test]
    fn shared_keylist_is_copied_on_extension() {
        let mut interp = interp();
        let a = interp.symbols.intern("alpha");
        let b = interp.symbols.intern("beta");
        let base = interp.make_context(Kind::Object, &[a]);
        let derived = interp.copy_context(base, Kind::Object, false).unwrap();
        assert_eq!(interp.heap.keylist(base), interp.heap.keylist(derived));

        interp.append_context(derived, b).unwrap();
        assert_ne!(interp.heap.keylist(base), interp.heap.keylist(derived));
        assert_eq!(interp.context_len(base), 1);
        assert_eq!(interp.context_len(derived), 2);
        assert_eq!(interp.heap.len(base), 2);
        assert_eq!(interp.heap.len(derived), 3);
    }

    #[test]
    fn cached_index_is_stable() {
        let mut interp = interp();
        let x = interp.symbols.intern("x");
        let ctx = interp.make_context(Kind::Object, &[x]);
        interp.set_context_var(ctx, 1, Value::integer(5)).unwrap();
        let word = Value::bound_word(Kind::Word, x, Binding::Specific(ctx), 1);
        let (_, first) = interp.resolve(word.as_word().unwrap(), None).unwrap();
        let (_, second) = interp.resolve(word.as_word().unwrap(), None).unwrap();
        assert_eq!(first, second);

        // a stale cache is repaired by rescanning
        let stale = Value::bound_word(Kind::Word, x, Binding::Specific(ctx), 7);
        assert_eq!(interp.get_var(stale, None).unwrap(), Value::integer(5));
    }

    #[test]
    fn protect_leaves_other_sharers_writable() {
        let mut interp = interp();
        let x = interp.symbols.intern("x");
        let base = interp.make_context(Kind::Object, &[x]);
        let other = interp.copy_context(base, Kind::Object, false).unwrap();
        interp.set_key_flags(base, 1, ParamFlags::PROTECTED, true).unwrap();
        assert!(interp.set_context_var(base, 1, Value::integer(1)).is_err());
        assert!(interp.set_context_var(other, 1, Value::integer(1)).is_ok());
    }

    #[test]
    fn case_insensitive_binding() {
        let mut interp = interp();
        let lower = interp.symbols.intern("count");
        let upper = interp.symbols.intern("COUNT");
        let ctx = interp.make_context(Kind::Object, &[lower]);
        let block = interp.heap.make_array(&[Value::word(Kind::Word, upper)]);
        interp.bind_array(block, ctx, false).unwrap();
        let bound = interp.heap.cell(block, 0).as_word().unwrap();
        assert_eq!(bound.binding, Binding::Specific(ctx));
        assert_eq!(bound.index, 1);
    }

    #[test]
    fn unbound_word_errors() {
        let mut interp = interp();
        let x = interp.symbols.intern("nowhere");
        let err = interp.get_var(Value::word(Kind::Word, x), None).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::NotBound));
    }
}
