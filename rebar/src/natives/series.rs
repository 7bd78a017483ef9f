//! Series actions.
//!
//! An action is one native name with a handler per kind of its first
//! argument. The handler for arrays, strings and binaries is shared: what
//! differs between them is the element type, captured by [`Insertion`].

use crate::error::{Error, ErrorId, Result};
use crate::eval::Evaluated;
use crate::function::Bounce;
use crate::interp::{Frame, Interp};
use crate::series::SeriesId;
use crate::value::{CellFlags, Kind, SeriesRef, Value};

use super::math::values_equal;
use super::{expect_count, expect_integer, function, logic, out, port, type_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Append,
    Insert,
    Copy,
    LengthOf,
    Pick,
    Poke,
    First,
    Second,
    Last,
    Next,
    Back,
    Head,
    Tail,
    Skip,
    At,
    IndexOf,
    EmptyQ,
    HeadQ,
    TailQ,
    Find,
    Select,
    Clear,
    Remove,
    Take,
    Reverse,
    Open,
    Close,
    Read,
    Write,
    Query,
}

impl Verb {
    pub fn name(self) -> &'static str {
        match self {
            Verb::Append => "append",
            Verb::Insert => "insert",
            Verb::Copy => "copy",
            Verb::LengthOf => "length-of",
            Verb::Pick => "pick",
            Verb::Poke => "poke",
            Verb::First => "first",
            Verb::Second => "second",
            Verb::Last => "last",
            Verb::Next => "next",
            Verb::Back => "back",
            Verb::Head => "head",
            Verb::Tail => "tail",
            Verb::Skip => "skip",
            Verb::At => "at",
            Verb::IndexOf => "index-of",
            Verb::EmptyQ => "empty?",
            Verb::HeadQ => "head?",
            Verb::TailQ => "tail?",
            Verb::Find => "find",
            Verb::Select => "select",
            Verb::Clear => "clear",
            Verb::Remove => "remove",
            Verb::Take => "take",
            Verb::Reverse => "reverse",
            Verb::Open => "open",
            Verb::Close => "close",
            Verb::Read => "read",
            Verb::Write => "write",
            Verb::Query => "query",
        }
    }

    fn is_port_verb(self) -> bool {
        matches!(self, Verb::Open | Verb::Close | Verb::Read | Verb::Write | Verb::Query)
    }
}

pub(crate) fn cannot_use(interp: &mut Interp, verb: Verb, value: Value) -> Error {
    let name = interp.symbols.intern(verb.name());
    Error::with_args(ErrorId::CannotUse, vec![Value::word(Kind::Word, name), Value::datatype(value.kind)])
}

/// Picks the handler for `verb` by the kind of the first argument.
pub(crate) fn run_action(interp: &mut Interp, frame: &Frame, verb: Verb) -> Result<Bounce> {
    let subject = interp.arg(frame, 1);
    match subject.kind {
        _ if verb.is_port_verb() => port::port_actor(interp, frame, verb),
        Kind::Port => port::port_actor(interp, frame, verb),
        kind if kind.is_any_series() => series_actor(interp, frame, verb, subject),
        kind if kind.is_any_context() => context_actor(interp, frame, verb, subject),
        Kind::Varargs => varargs_actor(interp, verb, subject),
        Kind::Blank => match verb {
            Verb::LengthOf | Verb::Find | Verb::Select => out(Value::BLANK),
            Verb::EmptyQ => logic(true),
            _ => Err(cannot_use(interp, verb, subject)),
        },
        Kind::Pair | Kind::Tuple | Kind::Date | Kind::Time => scalar_actor(interp, frame, verb, subject),
        _ => Err(cannot_use(interp, verb, subject)),
    }
}

// ── arrays, strings and binaries ─────────────────────────────────

/// Elements on their way into a series.
enum Insertion {
    Cells(Vec<Value>),
    Chars(Vec<char>),
    Bytes(Vec<u8>),
}

impl Insertion {
    fn len(&self) -> usize {
        match self {
            Insertion::Cells(cells) => cells.len(),
            Insertion::Chars(chars) => chars.len(),
            Insertion::Bytes(bytes) => bytes.len(),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            Insertion::Cells(cells) => cells.truncate(len),
            Insertion::Chars(chars) => chars.truncate(len),
            Insertion::Bytes(bytes) => bytes.truncate(len),
        }
    }

    fn repeat(self, count: usize) -> Self {
        match self {
            Insertion::Cells(cells) => Insertion::Cells(cells.repeat(count)),
            Insertion::Chars(chars) => Insertion::Chars(chars.repeat(count)),
            Insertion::Bytes(bytes) => Insertion::Bytes(bytes.repeat(count)),
        }
    }
}

/// Cells of an array value from its index, made specific.
fn array_cells(interp: &Interp, array: SeriesRef) -> Result<Vec<Value>> {
    Ok(interp
        .heap
        .array(array.series)?
        .get(array.index..)
        .unwrap_or_default()
        .iter()
        .map(|&cell| interp.derelativize(cell, array.specifier))
        .collect())
}

fn to_chars(interp: &Interp, value: Value) -> Result<Vec<char>> {
    Ok(match value.kind {
        kind if kind.is_any_string() => {
            let series = super::expect_series(value)?;
            interp.heap.chars(series.series)?.get(series.index..).unwrap_or_default().to_vec()
        }
        Kind::Char => value.as_char().into_iter().collect(),
        Kind::Binary => String::from_utf8_lossy(&super::bytes_of(interp, value)?).chars().collect(),
        Kind::Block => {
            let series = super::expect_series(value)?;
            let mut chars = Vec::new();
            for cell in array_cells(interp, series)? {
                chars.extend(to_chars(interp, cell)?);
            }
            chars
        }
        _ => interp.form(value).chars().collect(),
    })
}

fn to_bytes(interp: &Interp, value: Value) -> Result<Vec<u8>> {
    Ok(match value.kind {
        Kind::Binary => super::bytes_of(interp, value)?,
        kind if kind.is_any_string() => super::bytes_of(interp, value)?,
        Kind::Integer => {
            let n = expect_integer(value)?;
            vec![u8::try_from(n).map_err(|_| Error::arg(ErrorId::OutOfRange, value))?]
        }
        Kind::Char => {
            let c = value.as_char().unwrap_or_default();
            c.to_string().into_bytes()
        }
        Kind::Block => {
            let series = super::expect_series(value)?;
            let mut bytes = Vec::new();
            for cell in array_cells(interp, series)? {
                bytes.extend(to_bytes(interp, cell)?);
            }
            bytes
        }
        _ => return Err(Error::arg(ErrorId::InvalidArg, value)),
    })
}

fn insertion(interp: &Interp, target: Kind, value: Value, only: bool) -> Result<Insertion> {
    if target.is_any_array() {
        return Ok(match value.as_series() {
            Some(series) if value.kind == Kind::Block && !only => Insertion::Cells(array_cells(interp, series)?),
            _ => Insertion::Cells(vec![value.without_flag(CellFlags::NEWLINE_BEFORE)]),
        });
    }
    if target.is_any_string() {
        return Ok(Insertion::Chars(to_chars(interp, value)?));
    }
    Ok(Insertion::Bytes(to_bytes(interp, value)?))
}

fn insert_at(interp: &mut Interp, id: SeriesId, at: usize, insertion: &Insertion) -> Result<()> {
    match insertion {
        Insertion::Cells(cells) => interp.heap.insert(id, at, cells),
        Insertion::Chars(chars) => interp.heap.insert_chars(id, at, chars),
        Insertion::Bytes(bytes) => interp.heap.insert_bytes(id, at, bytes),
    }
}

/// Element `at` of any series as a value, BLANK past the tail.
pub(crate) fn element(interp: &Interp, subject: Value, series: SeriesRef, at: usize) -> Result<Value> {
    if at >= interp.heap.len(series.series) {
        return Ok(Value::BLANK);
    }
    Ok(match subject.kind {
        kind if kind.is_any_array() => {
            let cell = interp.heap.at(series.series, at)?;
            interp.derelativize(cell, series.specifier)
        }
        kind if kind.is_any_string() => Value::char(interp.heap.chars(series.series)?[at]),
        _ => Value::integer(i64::from(interp.heap.bytes(series.series)?[at])),
    })
}

/// New series of the subject's kind holding `[from, to)`.
fn copy_part(interp: &mut Interp, subject: Value, series: SeriesRef, from: usize, to: usize) -> Result<Value> {
    let copy = interp.heap.copy_range(series.series, from, to)?;
    Ok(Value::series(subject.kind, copy, 0).with_specifier(series.specifier))
}

/// End position for a /part limit given as a count or as a position in
/// the same series.
fn part_range(interp: &Interp, series: SeriesRef, limit: Value) -> Result<(usize, usize)> {
    let len = interp.heap.len(series.series);
    let index = series.index.min(len);
    if let Some(other) = limit.as_series() {
        if other.series != series.series {
            return Err(Error::arg(ErrorId::InvalidArg, limit));
        }
        let end = other.index.min(len);
        return Ok((index.min(end), index.max(end)));
    }
    let n = expect_integer(limit)?;
    if n >= 0 {
        Ok((index, index.saturating_add(n as usize).min(len)))
    } else {
        Ok((index.saturating_sub(n.unsigned_abs() as usize), index))
    }
}

fn series_actor(interp: &mut Interp, frame: &Frame, verb: Verb, subject: Value) -> Result<Bounce> {
    let series = super::expect_series(subject)?;
    let id = series.series;
    let len = interp.heap.len(id);
    let index = series.index;
    let at = |n: usize| subject.at_index(n);

    match verb {
        Verb::Append | Verb::Insert => {
            let value = interp.arg(frame, 2);
            if value.is_void() {
                return out(subject);
            }
            let mut insertion = insertion(interp, subject.kind, value, interp.refine(frame, 5))?;
            if interp.refine(frame, 3) {
                let limit = expect_count(interp.arg(frame, 4))?;
                insertion.truncate(limit);
            }
            if interp.refine(frame, 6) {
                insertion = insertion.repeat(expect_count(interp.arg(frame, 7))?);
            }
            if verb == Verb::Append {
                insert_at(interp, id, len, &insertion)?;
                out(subject)
            } else {
                let position = index.min(len);
                insert_at(interp, id, position, &insertion)?;
                out(at(position + insertion.len()))
            }
        }
        Verb::Copy => {
            let (from, to) = if interp.refine(frame, 2) {
                part_range(interp, series, interp.arg(frame, 3))?
            } else {
                (index.min(len), len)
            };
            let copy = copy_part(interp, subject, series, from, to)?;
            if interp.refine(frame, 4) && subject.kind.is_any_array() {
                let copied = copy.as_series().map(|s| s.series).unwrap_or(id);
                interp.heap.deepen(copied)?;
            }
            out(copy)
        }
        Verb::LengthOf => out(Value::integer(len.saturating_sub(index) as i64)),
        Verb::Pick => {
            let picked = interp.pick_or_blank(subject, interp.arg(frame, 2))?;
            out(picked)
        }
        Verb::Poke => {
            let value = interp.arg(frame, 3);
            interp.poke_path(subject, interp.arg(frame, 2), value, subject)?;
            out(value)
        }
        Verb::First => out(element(interp, subject, series, index)?),
        Verb::Second => out(element(interp, subject, series, index + 1)?),
        Verb::Last => match len.checked_sub(1) {
            Some(last) if last >= index => out(element(interp, subject, series, last)?),
            _ => out(Value::BLANK),
        },
        Verb::Next => out(at((index + 1).min(len))),
        Verb::Back => out(at(index.saturating_sub(1))),
        Verb::Head => out(at(0)),
        Verb::Tail => out(at(len)),
        Verb::Skip => {
            let offset = expect_integer(interp.arg(frame, 2))?;
            out(at(offset_index(index, offset, len)))
        }
        Verb::At => {
            let n = expect_integer(interp.arg(frame, 2))?;
            let offset = if n > 0 { n - 1 } else { n };
            out(at(offset_index(index, offset, len)))
        }
        Verb::IndexOf => out(Value::integer(index as i64 + 1)),
        Verb::EmptyQ | Verb::TailQ => logic(index >= len),
        Verb::HeadQ => logic(index == 0),
        Verb::Find | Verb::Select => {
            let value = interp.arg(frame, 2);
            let only = interp.refine(frame, 3);
            let strict = interp.refine(frame, 4);
            let Some((found, matched)) = find_in(interp, subject, series, value, only, strict)? else {
                return out(Value::BLANK);
            };
            if verb == Verb::Select {
                return out(element(interp, subject, series, found + matched)?);
            }
            let tail = interp.refine(frame, 5);
            out(at(if tail { found + matched } else { found }))
        }
        Verb::Clear => {
            if index < len {
                interp.heap.set_len(id, index)?;
            }
            out(subject)
        }
        Verb::Remove => {
            let count = if interp.refine(frame, 2) {
                expect_count(interp.arg(frame, 3))?
            } else {
                1
            };
            interp.heap.remove(id, index, count)?;
            out(subject)
        }
        Verb::Take => {
            let part = interp.refine(frame, 2);
            let count = if part { expect_count(interp.arg(frame, 3))? } else { 1 };
            let available = len.saturating_sub(index);
            let count = count.min(available);
            let from = if interp.refine(frame, 4) { len - count } else { index };
            let taken = if part {
                copy_part(interp, subject.at_index(0), series, from, from + count)?
            } else if count == 0 {
                Value::BLANK
            } else {
                element(interp, subject, series, from)?
            };
            if count > 0 {
                interp.heap.remove(id, from, count)?;
            }
            out(taken)
        }
        Verb::Reverse => {
            interp.heap.reverse(id, index)?;
            out(subject)
        }
        _ => Err(cannot_use(interp, verb, subject)),
    }
}

fn offset_index(index: usize, offset: i64, len: usize) -> usize {
    if offset >= 0 {
        index.saturating_add(offset as usize).min(len)
    } else {
        index.saturating_sub(offset.unsigned_abs() as usize)
    }
}

/// Position of the first match at or after the series index, and how many
/// elements matched.
fn find_in(
    interp: &Interp,
    subject: Value,
    series: SeriesRef,
    value: Value,
    only: bool,
    strict: bool,
) -> Result<Option<(usize, usize)>> {
    let id = series.series;
    let from = series.index;
    if subject.kind.is_any_array() {
        let cells = interp.heap.array(id)?;
        let pattern = match value.as_series() {
            Some(block) if value.kind == Kind::Block && !only => array_cells(interp, block)?,
            _ => vec![value],
        };
        if pattern.is_empty() {
            return Ok(None);
        }
        let found = (from..cells.len())
            .filter(|&at| at + pattern.len() <= cells.len())
            .find(|&at| {
                pattern.iter().enumerate().all(|(n, &wanted)| {
                    let cell = interp.derelativize(cells[at + n], series.specifier);
                    values_equal(interp, cell, wanted, strict)
                })
            });
        return Ok(found.map(|at| (at, pattern.len())));
    }
    if subject.kind.is_any_string() {
        let chars = interp.heap.chars(id)?;
        let pattern = to_chars(interp, value)?;
        let fold = |c: char| if strict { c } else { c.to_lowercase().next().unwrap_or(c) };
        return Ok(find_slice(chars, from, &pattern, |a, b| fold(a) == fold(b)).map(|at| (at, pattern.len())));
    }
    let bytes = interp.heap.bytes(id)?;
    let pattern = to_bytes(interp, value)?;
    Ok(find_slice(bytes, from, &pattern, |a, b| a == b).map(|at| (at, pattern.len())))
}

fn find_slice<T: Copy>(haystack: &[T], from: usize, needle: &[T], eq: impl Fn(T, T) -> bool) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.iter().zip(needle).all(|(&a, &b)| eq(a, b)))
        .map(|at| at + from)
}

// ── contexts ─────────────────────────────────────────────────────

fn visible_fields(interp: &Interp, varlist: SeriesId) -> Result<Vec<(usize, crate::value::Key)>> {
    Ok(interp
        .context_keys(varlist)?
        .into_iter()
        .enumerate()
        .filter(|(_, key)| !key.is_hidden())
        .map(|(offset, key)| (offset + 1, key))
        .collect())
}

fn context_actor(interp: &mut Interp, frame: &Frame, verb: Verb, subject: Value) -> Result<Bounce> {
    let varlist = super::expect_context(subject)?;
    match verb {
        Verb::Append => {
            let value = interp.arg(frame, 2);
            match value.as_series() {
                Some(block) if value.kind == Kind::Block => {
                    let cells = array_cells(interp, block)?;
                    for pair in cells.chunks(2) {
                        let sym = super::expect_word(pair[0])?;
                        let index = interp.append_context(varlist, sym)?;
                        let field = pair.get(1).copied().unwrap_or(Value::VOID);
                        interp.set_context_var(varlist, index, field)?;
                    }
                }
                _ => {
                    interp.append_context(varlist, super::expect_word(value)?)?;
                }
            }
            out(subject)
        }
        Verb::Copy => {
            let deep = interp.refine(frame, 4);
            let copy = interp.copy_context(varlist, subject.kind, deep)?;
            out(Value::context(subject.kind, copy))
        }
        Verb::LengthOf => out(Value::integer(visible_fields(interp, varlist)?.len() as i64)),
        Verb::EmptyQ => logic(visible_fields(interp, varlist)?.is_empty()),
        Verb::Pick => {
            let picked = interp.pick_or_blank(subject, interp.arg(frame, 2))?;
            out(picked)
        }
        Verb::Poke => {
            let value = interp.arg(frame, 3);
            interp.poke_path(subject, interp.arg(frame, 2), value, subject)?;
            out(value)
        }
        Verb::Find | Verb::Select => {
            let word = interp.arg(frame, 2);
            let found = word
                .symbol()
                .filter(|_| word.kind.is_any_word())
                .and_then(|sym| interp.find_in_context(varlist, sym));
            match (verb, found) {
                (_, None) => out(Value::BLANK),
                (Verb::Find, Some(_)) => out(Value::TRUE),
                (_, Some(index)) => out(interp.context_var(varlist, index)?),
            }
        }
        _ => Err(cannot_use(interp, verb, subject)),
    }
}

// ── varargs and scalars ──────────────────────────────────────────

fn varargs_actor(interp: &mut Interp, verb: Verb, subject: Value) -> Result<Bounce> {
    let state = subject.as_varargs().ok_or_else(|| type_error(subject))?;
    match verb {
        Verb::Take => match function::varargs_take(interp, state)? {
            Evaluated::Value(value) => out(value),
            Evaluated::End => out(Value::BLANK),
            Evaluated::Thrown { label, arg } => Ok(Bounce::Thrown { label, arg }),
        },
        Verb::TailQ | Verb::EmptyQ => logic(function::varargs_tail(interp, state)?),
        _ => Err(cannot_use(interp, verb, subject)),
    }
}

fn scalar_actor(interp: &mut Interp, frame: &Frame, verb: Verb, subject: Value) -> Result<Bounce> {
    let selector = match verb {
        Verb::Pick => interp.arg(frame, 2),
        Verb::First => Value::integer(1),
        Verb::Second => Value::integer(2),
        Verb::Last => match subject.payload {
            crate::value::Payload::Tuple(tuple) => Value::integer(tuple.parts().len() as i64),
            crate::value::Payload::Pair(..) => Value::integer(2),
            _ => return Err(cannot_use(interp, verb, subject)),
        },
        _ => return Err(cannot_use(interp, verb, subject)),
    };
    out(interp.pick_or_blank(subject, selector)?)
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::error::ErrorId;
    use crate::interp::Interp;
    use crate::value::Value;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn mold(interp: &mut Interp, text: &str) -> String {
        let value = interp.do_text(text).expect(text);
        interp.mold(value)
    }

    #[test]
    fn append_splices_unless_only() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "append copy [1] [2 3]"), "[1 2 3]");
        assert_eq!(mold(&mut interp, "append/only copy [1] [2 3]"), "[1 [2 3]]");
        assert_eq!(mold(&mut interp, "append/dup copy [] 0 3"), "[0 0 0]");
        assert_eq!(mold(&mut interp, "append/part copy [] [a b c] 2"), "[a b]");
        assert_eq!(mold(&mut interp, r#"append copy "ab" #"c""#), r#""abc""#);
        assert_eq!(mold(&mut interp, r#"append copy "n=" 42"#), r#""n=42""#);
        assert_eq!(mold(&mut interp, "append copy #{01} 2"), "#{0102}");
    }

    #[test]
    fn insert_returns_position_after() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "b: [3] head insert b [1 2]"), "[1 2 3]");
        assert_eq!(interp.do_text("index-of insert b 0").unwrap(), Value::integer(2));
    }

    #[test]
    fn navigation() {
        let mut interp = interp();
        interp.do_text("b: [1 2 3 4]").unwrap();
        assert_eq!(interp.do_text("first next b").unwrap(), Value::integer(2));
        assert_eq!(interp.do_text("last b").unwrap(), Value::integer(4));
        assert_eq!(interp.do_text("index-of skip b 10").unwrap(), Value::integer(5));
        assert_eq!(interp.do_text("index-of back b").unwrap(), Value::integer(1));
        assert_eq!(interp.do_text("first at b 3").unwrap(), Value::integer(3));
        assert_eq!(interp.do_text("tail? tail b").unwrap(), Value::TRUE);
        assert_eq!(interp.do_text("head? b").unwrap(), Value::TRUE);
        assert_eq!(interp.do_text("length-of next b").unwrap(), Value::integer(3));
        assert_eq!(interp.do_text("first []").unwrap(), Value::BLANK);
    }

    #[test]
    fn find_and_select() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "find [a b c d] 'c"), "[c d]");
        assert_eq!(mold(&mut interp, "find [a b c d] [b c]"), "[b c d]");
        assert_eq!(mold(&mut interp, "find/tail [a b c d] 'b"), "[c d]");
        assert_eq!(mold(&mut interp, "select [a 1 b 2] 'b"), "2");
        assert_eq!(mold(&mut interp, "find [1 2] 3"), "_");
        assert_eq!(mold(&mut interp, r#"find "Hello" "LL""#), r#""llo""#);
        assert_eq!(mold(&mut interp, r#"find/case "Hello" "LL""#), "_");
        assert_eq!(mold(&mut interp, "find #{010203} #{02}"), "#{0203}");
    }

    #[test]
    fn removal() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "b: [1 2 3 4] take b"), "1");
        assert_eq!(mold(&mut interp, "take/last b"), "4");
        assert_eq!(mold(&mut interp, "b"), "[2 3]");
        assert_eq!(mold(&mut interp, "take/part [a b c] 2"), "[a b]");
        assert_eq!(mold(&mut interp, "remove/part [1 2 3] 2"), "[3]");
        assert_eq!(mold(&mut interp, "head clear next [1 2 3]"), "[1]");
        assert_eq!(mold(&mut interp, "reverse [1 2 3]"), "[3 2 1]");
        assert_eq!(mold(&mut interp, r#"reverse "abc""#), r#""cba""#);
    }

    #[test]
    fn copy_variants() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "copy/part [1 2 3] 2"), "[1 2]");
        assert_eq!(mold(&mut interp, "b: [1 2 3] copy/part next b tail b"), "[2 3]");
        let value = interp
            .do_text("inner: [1] outer: reduce [inner] c: copy/deep outer append first c 2 length-of inner")
            .unwrap();
        assert_eq!(value, Value::integer(1));
        let value = interp.do_text("c: copy outer append first c 2 length-of inner").unwrap();
        assert_eq!(value, Value::integer(2));
    }

    #[test]
    fn contexts_act_like_series() {
        let mut interp = interp();
        interp.do_text("o: make object! [a: 1 b: 2]").unwrap();
        assert_eq!(interp.do_text("length-of o").unwrap(), Value::integer(2));
        assert_eq!(interp.do_text("select o 'b").unwrap(), Value::integer(2));
        assert_eq!(interp.do_text("find o 'zz").unwrap(), Value::BLANK);
        interp.do_text("append o [c 3]").unwrap();
        assert_eq!(interp.do_text("o/c").unwrap(), Value::integer(3));
    }

    #[test]
    fn scalars_pick_parts() {
        let mut interp = interp();
        assert_eq!(interp.do_text("first 1.2.3").unwrap(), Value::integer(1));
        assert_eq!(interp.do_text("last 1.2.3").unwrap(), Value::integer(3));
        assert_eq!(interp.do_text("second 3x4").unwrap(), Value::decimal(4.0));
    }

    #[test]
    fn protected_series_refuse_changes() {
        let mut interp = interp();
        let err = interp.do_text("b: [1] protect b append b 2").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Protected));
        let err = interp.do_text("append 10 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ExpectArg));
    }
}
