//! Constructing, converting and inspecting values; binding and
//! protection; output.

use crate::error::{Error, ErrorId, Result};
use crate::eval::{EvalFlags, Evaluated};
use crate::feed::{ArrayFeed, Feed};
use crate::function::Bounce;
use crate::interp::{Frame, Interp};
use crate::path::PathMode;
use crate::series::{SeriesFlags, SeriesId};
use crate::symbol::SymId;
use crate::value::{Binding, CellFlags, Kind, ParamClass, ParamFlags, Payload, SeriesRef, TypeBits, Value};

use super::{control, expect_context, expect_series, expect_word, logic, out, port, type_error};

// ── reduce and compose ───────────────────────────────────────────

/// Evaluates each expression of `block` onto the data stack, skipping
/// voids. On a throw the stack is restored and the throw handed back.
pub(crate) fn reduce_onto_stack(interp: &mut Interp, block: Value) -> Result<Option<Bounce>> {
    let series = expect_series(block)?;
    let depth = interp.data_depth();
    let mut feed = ArrayFeed::new(series.series, series.index, series.specifier);
    loop {
        let current = feed.current(&interp.heap);
        if current.is_end() {
            return Ok(None);
        }
        if current.is_bar() {
            if interp.settings.keep_bars {
                interp.push_data(Value::BAR);
            }
            feed.advance();
            continue;
        }
        let newline = current.has_flag(CellFlags::NEWLINE_BEFORE);
        match interp.eval_step(&mut feed, EvalFlags::empty()) {
            Ok(Evaluated::Value(value)) if value.is_void() => {}
            Ok(Evaluated::Value(value)) if value.is_bar() && !interp.settings.keep_bars => {}
            Ok(Evaluated::Value(value)) => {
                let value = if newline {
                    value.with_flag(CellFlags::NEWLINE_BEFORE)
                } else {
                    value.without_flag(CellFlags::NEWLINE_BEFORE)
                };
                interp.push_data(value);
            }
            Ok(Evaluated::End) => {}
            Ok(Evaluated::Thrown { label, arg }) => {
                interp.data_stack.truncate(depth);
                return Ok(Some(Bounce::Thrown { label, arg }));
            }
            Err(err) => {
                interp.data_stack.truncate(depth);
                return Err(err);
            }
        }
    }
}

fn reduced_kind(kind: Kind) -> Kind {
    if cfg!(feature = "reduce-group-as-group") && kind == Kind::Group {
        Kind::Group
    } else {
        Kind::Block
    }
}

pub fn reduce(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    if !matches!(value.kind, Kind::Block | Kind::Group) {
        return out(value);
    }
    let depth = interp.data_depth();
    if let Some(thrown) = reduce_onto_stack(interp, value)? {
        return Ok(thrown);
    }
    let array = interp.pop_data_to_array(depth);
    out(Value::series(reduced_kind(value.kind), array, 0))
}

/// Pushes the composed elements of `series` onto the data stack.
fn compose_onto_stack(interp: &mut Interp, series: SeriesRef, deep: bool, only: bool) -> Result<Option<Bounce>> {
    let cells = interp
        .heap
        .array(series.series)?
        .get(series.index..)
        .unwrap_or_default()
        .to_vec();
    for cell in cells {
        let cell = interp.derelativize(cell, series.specifier);
        let newline = cell.flags & CellFlags::NEWLINE_BEFORE;
        if cell.kind == Kind::Group {
            let result = match interp.do_block(cell)? {
                Evaluated::Value(value) => value,
                Evaluated::End => Value::VOID,
                Evaluated::Thrown { label, arg } => return Ok(Some(Bounce::Thrown { label, arg })),
            };
            match result.as_series() {
                _ if result.is_void() => {}
                Some(block) if result.kind == Kind::Block && !only => {
                    let spliced = interp.heap.array(block.series)?.get(block.index..).unwrap_or_default().to_vec();
                    for value in spliced {
                        let value = interp.derelativize(value, block.specifier);
                        interp.push_data(value);
                    }
                }
                _ => interp.push_data(result.without_flag(CellFlags::NEWLINE_BEFORE).with_flag(newline)),
            }
            continue;
        }
        if deep && cell.kind.is_any_array() {
            let nested = expect_series(cell)?;
            let depth = interp.data_depth();
            if let Some(thrown) = compose_onto_stack(interp, nested, deep, only)? {
                interp.data_stack.truncate(depth);
                return Ok(Some(thrown));
            }
            let array = interp.pop_data_to_array(depth);
            let mut composed = Value::series(cell.kind, array, 0);
            composed.flags = cell.flags;
            interp.push_data(composed);
            continue;
        }
        interp.push_data(cell);
    }
    Ok(None)
}

pub fn compose(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    if !value.kind.is_any_array() {
        return out(value);
    }
    let deep = interp.refine(frame, 2);
    let only = interp.refine(frame, 3);
    let depth = interp.data_depth();
    match compose_onto_stack(interp, expect_series(value)?, deep, only) {
        Ok(None) => {}
        Ok(Some(thrown)) => {
            interp.data_stack.truncate(depth);
            return Ok(thrown);
        }
        Err(err) => {
            interp.data_stack.truncate(depth);
            return Err(err);
        }
    }
    let array = interp.pop_data_to_array(depth);
    out(Value::series(value.kind, array, 0))
}

// ── make and to ──────────────────────────────────────────────────

fn bad_make(kind: Kind, def: Value) -> Error {
    Error::with_args(ErrorId::BadMake, vec![Value::datatype(kind), def])
}

/// Binds a deep copy of `spec` into `varlist` and runs it. Set-words in
/// the spec become fields first.
fn run_in_context(interp: &mut Interp, varlist: SeriesId, kind: Kind, spec: Value) -> Result<Option<Bounce>> {
    let series = expect_series(spec)?;
    let depth = interp.guard_depth();
    interp.push_guard(Value::context(kind, varlist));
    let result = (|| -> Result<Option<Bounce>> {
        let copy = interp.heap.copy_array(series.series, series.index, true)?;
        interp.push_guard(Value::block(copy));
        let words = interp.collect_words(copy, true, false)?;
        interp.extend_context(varlist, &words)?;
        interp.bind_array(copy, varlist, true)?;
        Ok(match interp.do_array(copy, 0, series.specifier)? {
            Evaluated::Thrown { label, arg } => Some(Bounce::Thrown { label, arg }),
            _ => None,
        })
    })();
    interp.drop_guards(depth);
    result
}

fn make_object(interp: &mut Interp, kind: Kind, parent: Option<SeriesId>, spec: Value) -> Result<Bounce> {
    let varlist = match parent {
        Some(parent) => interp.copy_context(parent, kind, true)?,
        None => interp.make_context(kind, &[]),
    };
    if spec.kind == Kind::Block {
        if let Some(thrown) = run_in_context(interp, varlist, kind, spec)? {
            return Ok(thrown);
        }
    } else if !spec.is_blank() && !spec.is_void() {
        return Err(bad_make(kind, spec));
    }
    out(Value::context(kind, varlist))
}

fn make_error(interp: &mut Interp, def: Value) -> Result<Bounce> {
    let varlist = control::blank_error(interp)?;
    let depth = interp.guard_depth();
    interp.push_guard(Value::context(Kind::Error, varlist));
    let result = fill_error(interp, varlist, def);
    interp.drop_guards(depth);
    result
}

fn fill_error(interp: &mut Interp, varlist: SeriesId, def: Value) -> Result<Bounce> {
    match def.kind {
        kind if kind.is_any_string() => {
            control::stamp_error(interp, varlist, ErrorId::Message)?;
            let index = interp
                .find_in_context(varlist, SymId::Message.symbol())
                .ok_or_else(|| Error::Panic("error context without message".to_string()))?;
            interp.set_context_var(varlist, index, def)?;
        }
        Kind::Block => {
            if let Some(thrown) = run_in_context(interp, varlist, Kind::Error, def)? {
                return Ok(thrown);
            }
            let id = interp
                .find_in_context(varlist, SymId::Id.symbol())
                .map(|index| interp.context_var(varlist, index))
                .transpose()?
                .unwrap_or(Value::VOID);
            let known = id
                .symbol()
                .and_then(|sym| ErrorId::from_name(interp.symbols.spelling(sym)));
            control::stamp_error(interp, varlist, known.unwrap_or(ErrorId::Message))?;
            if known.is_none() && id.kind.is_any_word() {
                let index = interp
                    .find_in_context(varlist, SymId::Id.symbol())
                    .ok_or_else(|| Error::Panic("error context without id".to_string()))?;
                interp.set_context_var(varlist, index, id)?;
            }
        }
        _ => return Err(bad_make(Kind::Error, def)),
    }
    out(Value::context(Kind::Error, varlist))
}

fn typeset_from(interp: &Interp, def: Value) -> Result<TypeBits> {
    let series = expect_series(def)?;
    let mut bits = TypeBits::default();
    for &cell in interp.heap.array(series.series)?.iter().skip(series.index) {
        let cell = interp.derelativize(cell, series.specifier);
        let value = if cell.kind == Kind::Word {
            interp.get_var(cell, None)?
        } else {
            cell
        };
        bits = match (value.as_datatype(), value.as_key()) {
            (Some(kind), _) => bits.with(kind),
            (_, Some(key)) => bits.union(key.bits),
            _ => return Err(bad_make(Kind::Typeset, value)),
        };
    }
    Ok(bits)
}

pub fn make(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let target = interp.arg(frame, 1);
    let def = interp.arg(frame, 2);
    let (kind, parent) = match target.as_datatype() {
        Some(kind) if target.kind == Kind::Datatype => (kind, None),
        _ if target.kind.is_any_context() => (target.kind, Some(expect_context(target)?)),
        _ => (target.kind, None),
    };
    match kind {
        Kind::Object | Kind::Module => make_object(interp, kind, parent, def),
        Kind::Error => make_error(interp, def),
        Kind::Port => out(port::make_port(interp, def)?),
        Kind::Frame => {
            let paramlist = crate::function::paramlist_of(def)?;
            out(Value::context(Kind::Frame, interp.make_context_with_keylist(Kind::Frame, paramlist)))
        }
        Kind::Function => {
            let series = expect_series(def)?;
            let cells = interp.heap.array(series.series)?.get(series.index..).unwrap_or_default().to_vec();
            let [spec, body] = cells[..] else {
                return Err(bad_make(kind, def));
            };
            let spec = interp.derelativize(spec, series.specifier);
            let body = interp.derelativize(body, series.specifier);
            out(super::function::generate(interp, spec, body, &[])?)
        }
        Kind::Typeset if def.kind == Kind::Block => out(Value::typeset(typeset_from(interp, def)?)),
        kind if (kind.is_any_series()) && def.kind == Kind::Integer => {
            let empty = match kind {
                Kind::Binary => interp.heap.make_binary(Vec::new()),
                kind if kind.is_any_string() => interp.heap.make_string(""),
                _ => interp.heap.make_array(&[]),
            };
            out(Value::series(kind, empty, 0))
        }
        _ => out(convert(interp, kind, def)?),
    }
}

/// TO conversion of `value` into `kind`.
fn convert(interp: &mut Interp, kind: Kind, value: Value) -> Result<Value> {
    let fail = || bad_make(kind, value);
    if value.kind == kind && !kind.is_any_series() {
        return Ok(value);
    }
    Ok(match kind {
        Kind::Integer => match value.payload {
            Payload::Decimal(d) => Value::integer(d.trunc() as i64),
            Payload::Char(c) => Value::integer(i64::from(u32::from(c))),
            Payload::Logic(b) => Value::integer(i64::from(b)),
            _ if value.kind.is_any_string() => {
                let text = super::text_of(interp, value)?;
                Value::integer(text.trim().parse().map_err(|_| fail())?)
            }
            _ => return Err(fail()),
        },
        Kind::Decimal => match value.as_decimal() {
            Some(d) if value.kind.is_number() => Value::decimal(d),
            _ if value.kind.is_any_string() => {
                let text = super::text_of(interp, value)?;
                Value::decimal(text.trim().parse().map_err(|_| fail())?)
            }
            _ => return Err(fail()),
        },
        Kind::Char => match value.payload {
            Payload::Integer(n) => u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .map(Value::char)
                .ok_or_else(fail)?,
            _ if value.kind.is_any_string() => {
                let text = super::text_of(interp, value)?;
                Value::char(text.chars().next().ok_or_else(fail)?)
            }
            _ => return Err(fail()),
        },
        Kind::Logic => Value::logic(value.is_truthy()),
        kind if kind.is_any_string() => {
            let text = match value.kind {
                Kind::Binary => String::from_utf8(super::bytes_of(interp, value)?).map_err(|_| fail())?,
                _ => interp.form(value),
            };
            super::make_text(interp, kind, &text)
        }
        Kind::Binary => {
            let bytes = match value.kind {
                kind if kind.is_any_string() || kind == Kind::Binary => super::bytes_of(interp, value)?,
                _ => return Err(fail()),
            };
            super::make_bytes(interp, bytes)
        }
        kind if kind.is_any_word() => {
            let sym = match value.symbol() {
                Some(sym) if value.kind.is_any_word() => sym,
                _ if value.kind.is_any_string() => {
                    let text = super::text_of(interp, value)?;
                    if text.is_empty() || text.contains(char::is_whitespace) {
                        return Err(fail());
                    }
                    interp.symbols.intern(&text)
                }
                _ => return Err(fail()),
            };
            match value.as_word() {
                Some(word) if value.kind.is_any_word() => Value::bound_word(kind, sym, word.binding, word.index),
                _ => Value::word(kind, sym),
            }
        }
        kind if kind.is_any_array() => {
            let array = match value.as_series() {
                Some(series) if value.kind.is_any_array() => interp.heap.copy_array(series.series, series.index, false)?,
                _ => interp.heap.make_array(&[value]),
            };
            let specifier = value.as_series().filter(|_| value.kind.is_any_array()).and_then(|s| s.specifier);
            Value::series(kind, array, 0).with_specifier(specifier)
        }
        Kind::Datatype => Value::datatype(value.kind),
        _ => return Err(fail()),
    })
}

pub fn to(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let target = interp.arg(frame, 1);
    let kind = target.as_datatype().ok_or_else(|| type_error(target))?;
    let value = interp.arg(frame, 2);
    out(convert(interp, kind, value)?)
}

pub fn type_of(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    out(if value.is_void() { Value::BLANK } else { Value::datatype(value.kind) })
}

pub fn object(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let spec = interp.arg(frame, 1);
    make_object(interp, Kind::Object, None, spec)
}

// ── variables and binding ────────────────────────────────────────

pub fn set(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let target = interp.arg(frame, 1);
    let value = interp.arg(frame, 2);
    let Some(words) = target.as_series().filter(|_| target.kind == Kind::Block) else {
        interp.set_var(target, None, value)?;
        return out(value);
    };
    let cells = interp.heap.array(words.series)?.get(words.index..).unwrap_or_default().to_vec();
    let values = match value.as_series() {
        Some(block) if value.kind == Kind::Block => {
            Some(interp.heap.array(block.series)?.get(block.index..).unwrap_or_default().to_vec())
        }
        _ => None,
    };
    for (n, word) in cells.into_iter().enumerate() {
        let word = interp.derelativize(word, words.specifier);
        let each = match &values {
            Some(values) => values.get(n).copied().unwrap_or(Value::BLANK),
            None => value,
        };
        interp.set_var(word, None, each)?;
    }
    out(value)
}

pub fn get(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let source = interp.arg(frame, 1);
    let any = interp.refine(frame, 2);
    if source.kind.is_any_context() {
        return values_of(interp, frame);
    }
    let value = if source.kind.is_any_path() {
        match interp.eval_path(source, None, PathMode::Get, None)? {
            Evaluated::Value(value) => value,
            _ => Value::VOID,
        }
    } else {
        interp.get_var(source, None)?
    };
    if value.is_void() && !any {
        return Err(Error::arg(ErrorId::NoValue, source.with_kind(Kind::Word)));
    }
    out(value)
}

pub fn value_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    if value.kind.is_any_word() {
        return logic(interp.get_var(value, None).is_ok_and(|v| !v.is_void()));
    }
    logic(!value.is_void())
}

/// Context a BIND target designates.
fn bind_target(interp: &Interp, target: Value) -> Result<SeriesId> {
    if target.kind.is_any_context() {
        return expect_context(target);
    }
    let word = target.as_word().ok_or_else(|| type_error(target))?;
    let Binding::Specific(varlist) = word.binding else {
        return Err(Error::arg(ErrorId::NotBound, target));
    };
    if !interp.heap.is_live(varlist) {
        return Err(Error::raised(ErrorId::FrameNotOnStack));
    }
    Ok(varlist)
}

pub fn bind(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let words = interp.arg(frame, 1);
    let varlist = bind_target(interp, interp.arg(frame, 2))?;
    if words.kind.is_any_word() {
        let sym = expect_word(words)?;
        let index = interp
            .find_in_context(varlist, sym)
            .ok_or_else(|| Error::arg(ErrorId::NotInContext, words))?;
        return out(Value::bound_word(words.kind, sym, Binding::Specific(varlist), index));
    }
    let series = expect_series(words)?;
    let (array, index) = if interp.refine(frame, 3) {
        (interp.heap.copy_array(series.series, series.index, true)?, 0)
    } else {
        (series.series, series.index)
    };
    interp.bind_array(array, varlist, true)?;
    out(Value::series(words.kind, array, index).with_specifier(series.specifier))
}

pub fn in_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let varlist = expect_context(interp.arg(frame, 1))?;
    let word = interp.arg(frame, 2);
    let sym = expect_word(word)?;
    out(match interp.find_in_context(varlist, sym) {
        Some(index) => Value::bound_word(word.kind, sym, Binding::Specific(varlist), index),
        None => Value::BLANK,
    })
}

pub fn words_of(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let mut words = Vec::new();
    if value.is_function() {
        let paramlist = crate::function::paramlist_of(value)?;
        for key in interp.keys(paramlist)? {
            let Some(sym) = key.spelling else { continue };
            if key.is_hidden() || key.flags.contains(ParamFlags::SPECIALIZED) {
                continue;
            }
            let kind = match key.class {
                ParamClass::Local | ParamClass::Return => continue,
                ParamClass::Refinement => Kind::Refinement,
                ParamClass::HardQuote => Kind::GetWord,
                ParamClass::SoftQuote => Kind::LitWord,
                _ => Kind::Word,
            };
            words.push(Value::word(kind, sym));
        }
    } else {
        let varlist = expect_context(value)?;
        for (offset, key) in interp.context_keys(varlist)?.into_iter().enumerate() {
            if let Some(sym) = key.spelling.filter(|_| !key.is_hidden()) {
                words.push(Value::bound_word(Kind::Word, sym, Binding::Specific(varlist), offset + 1));
            }
        }
    }
    out(Value::block(interp.heap.make_array(&words)))
}

pub fn values_of(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let varlist = expect_context(interp.arg(frame, 1))?;
    let mut values = Vec::new();
    for (offset, key) in interp.context_keys(varlist)?.into_iter().enumerate() {
        if !key.is_hidden() {
            values.push(interp.context_var(varlist, offset + 1)?);
        }
    }
    out(Value::block(interp.heap.make_array(&values)))
}

// ── output ───────────────────────────────────────────────────────

pub fn mold(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let text = if interp.refine(frame, 2) {
        interp.mold_only(value)
    } else {
        interp.mold(value)
    };
    out(super::make_text(interp, Kind::String, &text))
}

pub fn form(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let text = interp.form(interp.arg(frame, 1));
    out(super::make_text(interp, Kind::String, &text))
}

pub fn print(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let text = if value.kind == Kind::Block {
        let depth = interp.data_depth();
        if let Some(thrown) = reduce_onto_stack(interp, value)? {
            return Ok(thrown);
        }
        let reduced = interp.pop_data_to_array(depth);
        interp.form(Value::block(reduced))
    } else {
        interp.form(value)
    };
    interp.write_out(&text)?;
    interp.write_out("\n")?;
    out(Value::VOID)
}

pub fn probe(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let text = interp.mold(value);
    interp.write_out(&text)?;
    interp.write_out("\n")?;
    out(value)
}

// ── protection ───────────────────────────────────────────────────

/// Sets or clears `flag` on a series and, with `deep`, on every series
/// reachable from it.
fn flag_series(interp: &mut Interp, id: SeriesId, flag: SeriesFlags, on: bool, deep: bool) -> Result<()> {
    let mut pending = vec![id];
    let mut seen = ahash::AHashSet::new();
    while let Some(id) = pending.pop() {
        if !seen.insert(id) || !interp.heap.is_live(id) {
            continue;
        }
        if on {
            interp.heap.set_flags(id, flag);
        } else {
            if interp.heap.is_frozen(id) {
                return Err(Error::raised(ErrorId::Locked));
            }
            interp.heap.clear_flags(id, flag);
        }
        if deep && interp.heap.series(id).is_array() {
            pending.extend(
                interp
                    .heap
                    .array(id)?
                    .iter()
                    .filter(|cell| cell.kind.is_any_series() || cell.kind.is_any_context())
                    .filter_map(Value::referenced_series),
            );
        }
    }
    Ok(())
}

fn protect_value(interp: &mut Interp, frame: &Frame, on: bool) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let deep = interp.refine(frame, 2);
    let hide = on && interp.refine(frame, 3);
    let words = on && interp.refine(frame, 4);
    if value.kind.is_any_word() {
        let word = value.as_word().ok_or_else(|| type_error(value))?;
        let (varlist, index) = interp.resolve(word, None)?;
        let flags = if hide { ParamFlags::HIDDEN } else { ParamFlags::PROTECTED };
        interp.set_key_flags(varlist, index, flags, on)?;
        return out(value);
    }
    if value.kind.is_any_context() && (words || hide) {
        let varlist = expect_context(value)?;
        let flags = if hide { ParamFlags::HIDDEN } else { ParamFlags::PROTECTED };
        for index in 1..=interp.context_len(varlist) {
            interp.set_key_flags(varlist, index, flags, on)?;
        }
        return out(value);
    }
    let id = value.referenced_series().ok_or_else(|| type_error(value))?;
    flag_series(interp, id, SeriesFlags::PROTECTED, on, deep)?;
    out(value)
}

pub fn protect(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    protect_value(interp, frame, true)
}

pub fn unprotect(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    protect_value(interp, frame, false)
}

pub fn lock(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let id = value.referenced_series().ok_or_else(|| type_error(value))?;
    interp.heap.set_flags(id, SeriesFlags::LOCKED);
    out(value)
}

pub fn freeze(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    let id = value.referenced_series().ok_or_else(|| type_error(value))?;
    interp.heap.freeze_deep(id);
    out(value)
}

pub fn frozen_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    match value.referenced_series() {
        Some(id) if value.kind.is_any_series() || value.kind.is_any_context() => logic(interp.heap.is_frozen(id)),
        _ => logic(true),
    }
}

pub fn locked_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    match value.referenced_series() {
        Some(id) if value.kind.is_any_series() || value.kind.is_any_context() => logic(interp.heap.is_locked(id)),
        _ => logic(true),
    }
}

// ── memory ───────────────────────────────────────────────────────

pub fn recycle(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    if interp.refine(frame, 1) {
        interp.heap.disable_gc();
        return out(Value::VOID);
    }
    if interp.refine(frame, 2) {
        interp.heap.enable_gc();
    }
    let stats = interp.recycle();
    out(Value::integer(stats.swept as i64))
}

pub fn stats(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    if !interp.refine(frame, 1) {
        return out(Value::integer(interp.heap.live_count() as i64));
    }
    let fields = [
        ("steps", interp.stats.steps as i64),
        ("calls", interp.stats.calls as i64),
        ("recycles", interp.stats.recycles as i64),
        ("series", interp.heap.live_count() as i64),
        ("allocations", interp.heap.stats.allocations as i64),
        ("frees", interp.heap.stats.frees as i64),
    ];
    let syms: Vec<_> = fields.iter().map(|(name, _)| interp.symbols.intern(name)).collect();
    let varlist = interp.make_context(Kind::Object, &syms);
    for (index, (_, n)) in fields.iter().enumerate() {
        interp.set_context_var(varlist, index + 1, Value::integer(*n))?;
    }
    out(Value::context(Kind::Object, varlist))
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::error::ErrorId;
    use crate::interp::{Interp, OutputBuffer};
    use crate::value::{Kind, Value};

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn mold(interp: &mut Interp, text: &str) -> String {
        let value = interp.do_text(text).expect(text);
        interp.mold(value)
    }

    #[test]
    fn reduce_skips_voids() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "reduce [1 + 1 if false [0] 3]"), "[2 3]");
        assert_eq!(mold(&mut interp, "reduce [1 | 2]"), "[1 2]");
        assert_eq!(mold(&mut interp, "reduce [1 bar 2]"), "[1 2]");
        assert_eq!(mold(&mut interp, "reduce 5"), "5");
    }

    #[test]
    fn reduce_keeps_bars_when_asked() {
        let mut settings = Settings::default();
        settings.keep_bars = true;
        let mut interp = Interp::new(settings).unwrap();
        assert_eq!(mold(&mut interp, "reduce [1 | 2]"), "[1 | 2]");
        assert_eq!(mold(&mut interp, "reduce [1 bar 2]"), "[1 | 2]");
    }

    #[cfg(not(feature = "reduce-group-as-group"))]
    #[test]
    fn reduce_of_group_is_block() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "reduce quote (a: 1 + 2 a)"), "[3 3]");
    }

    #[test]
    fn compose_splices_groups() {
        let mut interp = interp();
        assert_eq!(mold(&mut interp, "compose [a (1 + 2) (reduce [4 5])]"), "[a 3 4 5]");
        assert_eq!(mold(&mut interp, "compose/only [a (reduce [4 5])]"), "[a [4 5]]");
        assert_eq!(mold(&mut interp, "compose [[(1 + 1)]]"), "[[(1 + 1)]]");
        assert_eq!(mold(&mut interp, "compose/deep [[(1 + 1)]]"), "[[2]]");
    }

    #[test]
    fn make_objects_and_derivation() {
        let mut interp = interp();
        interp.do_text("p: make object! [a: 1 b: a + 1]").unwrap();
        assert_eq!(interp.do_text("p/b").unwrap(), Value::integer(2));
        interp.do_text("c: make p [c: b * 10]").unwrap();
        assert_eq!(interp.do_text("c/c").unwrap(), Value::integer(20));
        assert_eq!(interp.do_text("c/a").unwrap(), Value::integer(1));
        assert_eq!(interp.do_text("o: object [x: 5] o/x").unwrap(), Value::integer(5));
    }

    #[test]
    fn derived_methods_use_the_derived_fields() {
        let mut interp = interp();
        interp
            .do_text("counter: make object! [n: 0 bump: func [by] [n: n + by]]")
            .unwrap();
        interp.do_text("twin: make counter [] twin/bump 3 twin/bump 4").unwrap();
        assert_eq!(interp.do_text("twin/n").unwrap(), Value::integer(7));
        assert_eq!(interp.do_text("counter/n").unwrap(), Value::integer(0));
        interp.do_text("clone: copy counter clone/bump 1").unwrap();
        assert_eq!(interp.do_text("clone/n").unwrap(), Value::integer(1));
        assert_eq!(interp.do_text("counter/n").unwrap(), Value::integer(0));
    }

    #[test]
    fn make_errors() {
        let mut interp = interp();
        let err = interp.do_text(r#"fail make error! "custom""#).unwrap_err();
        assert_eq!(interp.format_error(&err).lines().next(), Some("** User error: custom"));
        let err = interp.do_text("fail make error! [id: 'zero-divide]").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ZeroDivide));
    }

    #[test]
    fn conversions() {
        let mut interp = interp();
        assert_eq!(interp.do_text(r#"to integer! "42""#).unwrap(), Value::integer(42));
        assert_eq!(interp.do_text("to integer! 3.9").unwrap(), Value::integer(3));
        assert_eq!(mold(&mut interp, "to string! 12"), r#""12""#);
        assert_eq!(mold(&mut interp, r#"to word! "abc""#), "abc");
        assert_eq!(mold(&mut interp, "to block! 1"), "[1]");
        assert_eq!(mold(&mut interp, "make block! 10"), "[]");
        assert_eq!(interp.do_text("type-of 1.5").unwrap(), Value::datatype(Kind::Decimal));
        let err = interp.do_text(r#"to integer! "x""#).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadMake));
    }

    #[test]
    fn set_get_and_binding() {
        let mut interp = interp();
        interp.do_text("set [p q] [1 2]").unwrap();
        assert_eq!(interp.do_text("p + q").unwrap(), Value::integer(3));
        assert_eq!(interp.do_text("get 'p").unwrap(), Value::integer(1));
        assert_eq!(interp.do_text("value? 'never-set-here").unwrap(), Value::FALSE);
        interp.do_text("o: make object! [n: 10]").unwrap();
        assert_eq!(interp.do_text("do bind [n * 2] o").unwrap(), Value::integer(20));
        assert_eq!(interp.do_text("get in o 'n").unwrap(), Value::integer(10));
        assert_eq!(interp.do_text("in o 'zz").unwrap(), Value::BLANK);
        assert_eq!(mold(&mut interp, "words-of o"), "[n]");
        assert_eq!(mold(&mut interp, "values-of o"), "[10]");
    }

    #[test]
    fn print_reduces_blocks() {
        let mut interp = interp();
        let out = OutputBuffer::new();
        interp.set_output(Box::new(out.clone()));
        interp.do_text(r#"x: 2 print ["x is" x] probe "s""#).unwrap();
        assert_eq!(out.contents(), "x is 2\n\"s\"\n");
    }

    #[test]
    fn protection() {
        let mut interp = interp();
        let err = interp.do_text("v: 1 protect 'v v: 2").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Locked));
        interp.do_text("unprotect 'v v: 3").unwrap();
        let err = interp.do_text("b: [[1]] protect/deep b append first b 2").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Protected));
        let err = interp.do_text("f: [[1]] freeze f append first f 2").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Protected));
        assert_eq!(interp.do_text("frozen? f").unwrap(), Value::TRUE);
        assert_eq!(interp.do_text("locked? [1]").unwrap(), Value::FALSE);
        interp.do_text("h: make object! [a: 1 b: 2] protect/hide in h 'a").unwrap();
        assert_eq!(mold(&mut interp, "words-of h"), "[b]");
    }

    #[test]
    fn recycle_and_stats() {
        let mut interp = interp();
        interp.do_text("loop 10 [copy [1 2 3]]").unwrap();
        let swept = interp.do_text("loop 10 [copy [1 2 3]] recycle").unwrap();
        assert!(swept.as_integer().unwrap() >= 10);
        let profile = interp.do_text("stats/profile").unwrap();
        assert_eq!(profile.kind, Kind::Object);
    }
}
