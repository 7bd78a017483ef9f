//! Control flow: conditionals, loops, throws and traps.

use log::debug;

use crate::error::{Error, ErrorId, Raised, Result};
use crate::eval::{EvalFlags, Evaluated};
use crate::feed::{ArrayFeed, Feed};
use crate::function::Bounce;
use crate::interp::{Frame, Interp};
use crate::series::SeriesId;
use crate::symbol::SymId;
use crate::value::{Kind, Value};

use super::{evaluate, expect_series, expect_word, logic, out, port};

// ── errors as values ─────────────────────────────────────────────

/// The id recorded in an ERROR! context, `message` when it names none.
pub(crate) fn error_id_of(interp: &Interp, varlist: SeriesId) -> ErrorId {
    interp
        .find_in_context(varlist, SymId::Id.symbol())
        .and_then(|index| interp.context_var(varlist, index).ok())
        .and_then(|id| id.symbol().filter(|_| id.kind.is_any_word()))
        .and_then(|sym| ErrorId::from_name(interp.symbols.spelling(sym)))
        .unwrap_or(ErrorId::Message)
}

/// Fresh ERROR! varlist with every field void.
pub(crate) fn blank_error(interp: &mut Interp) -> Result<SeriesId> {
    let keylist = interp
        .specials
        .error_keylist
        .ok_or_else(|| Error::Panic("error keylist missing".to_string()))?;
    Ok(interp.make_context_with_keylist(Kind::Error, keylist))
}

fn set_field(interp: &mut Interp, varlist: SeriesId, field: SymId, value: Value) -> Result<()> {
    match interp.find_in_context(varlist, field.symbol()) {
        Some(index) => interp.set_context_var(varlist, index, value),
        None => Ok(()),
    }
}

/// Fills the id-derived fields (code, type, id) for `id`.
pub(crate) fn stamp_error(interp: &mut Interp, varlist: SeriesId, id: ErrorId) -> Result<()> {
    let type_word = interp.symbols.intern(id.category().name());
    let id_word = interp.symbols.intern(id.name());
    set_field(interp, varlist, SymId::Code, Value::integer(i64::from(id.code())))?;
    set_field(interp, varlist, SymId::Type, Value::word(Kind::Word, type_word))?;
    set_field(interp, varlist, SymId::Id, Value::word(Kind::Word, id_word))
}

/// The ERROR! context for a raised error, building one unless user code
/// already supplied it.
pub(crate) fn error_context(interp: &mut Interp, raised: &Raised) -> Result<SeriesId> {
    if let Some(varlist) = raised.context.filter(|&varlist| interp.heap.is_live(varlist)) {
        return Ok(varlist);
    }
    let varlist = blank_error(interp)?;
    interp.with_guard(Value::context(Kind::Error, varlist), |interp| {
        stamp_error(interp, varlist, raised.id)?;
        let template = raised.message.clone().unwrap_or_else(|| raised.id.template().to_string());
        let message = super::make_text(interp, Kind::String, &template);
        set_field(interp, varlist, SymId::Message, message)?;
        for (field, &arg) in [SymId::Arg1, SymId::Arg2, SymId::Arg3].into_iter().zip(&raised.args) {
            set_field(interp, varlist, field, arg)?;
        }
        if let Some((array, index)) = raised.near.filter(|&(array, _)| interp.heap.is_live(array)) {
            let len = interp.heap.len(array);
            let from = index.saturating_sub(1).min(len);
            let near = interp.heap.copy_range(array, from, (from + 4).min(len))?;
            set_field(interp, varlist, SymId::Near, Value::block(near))?;
        }
        let location = raised.label.map_or(Value::BLANK, |label| Value::word(Kind::Word, label));
        set_field(interp, varlist, SymId::Where, location)
    })?;
    Ok(varlist)
}

/// Raises an ERROR! value made by user code.
pub(crate) fn raise_context(interp: &Interp, varlist: SeriesId) -> Error {
    Error::from_context(varlist, error_id_of(interp, varlist))
}

// ── loop plumbing ────────────────────────────────────────────────

/// What one pass of a loop body tells the loop.
enum Pass {
    Next(Value),
    Stop(Bounce),
}

fn pass(interp: &mut Interp, body: Value) -> Result<Pass> {
    match interp.do_block(body)? {
        Evaluated::Thrown { label, arg } => {
            if interp.specials.is(label, interp.specials.break_) {
                let result = if arg.is_void() { Value::BLANK } else { arg };
                return Ok(Pass::Stop(Bounce::Out(result)));
            }
            if interp.specials.is(label, interp.specials.continue_) {
                return Ok(Pass::Next(Value::VOID));
            }
            Ok(Pass::Stop(Bounce::Thrown { label, arg }))
        }
        other => Ok(Pass::Next(other.value().unwrap_or(Value::VOID))),
    }
}

/// Copies `body` and binds the copy to a new context holding `words`.
/// The copy keeps the body's specifier for words the context doesn't own.
fn bind_loop_body(interp: &mut Interp, words: &[crate::Symbol], body: Value) -> Result<(SeriesId, Value)> {
    let series = expect_series(body)?;
    let context = interp.make_context(Kind::Object, words);
    interp.push_guard(Value::context(Kind::Object, context));
    let copy = interp.heap.copy_array(series.series, series.index, true)?;
    interp.push_guard(Value::block(copy));
    interp.bind_array(copy, context, true)?;
    Ok((context, Value::block(copy).with_specifier(series.specifier)))
}

// ── evaluation ───────────────────────────────────────────────────

pub fn do_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    match value.kind {
        Kind::Block | Kind::Group => out(evaluate!(interp, value)),
        Kind::String | Kind::File => {
            let text = match value.kind {
                Kind::File => port::read_text(interp, value)?,
                _ => super::text_of(interp, value)?,
            };
            let block = interp.load(&text)?;
            let result = interp.with_guard(Value::block(block), |interp| interp.do_array(block, 0, None))?;
            Ok(result.into())
        }
        Kind::Function => Ok(Bounce::Reevaluate(value)),
        Kind::Error => {
            let varlist = super::expect_context(value)?;
            Err(raise_context(interp, varlist))
        }
        _ => out(value),
    }
}

pub fn eval(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    Ok(Bounce::Reevaluate(interp.arg(frame, 1)))
}

// ── conditionals ─────────────────────────────────────────────────

pub fn if_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    if interp.arg(frame, 1).is_truthy() {
        return out(evaluate!(interp, interp.arg(frame, 2)));
    }
    out(Value::VOID)
}

pub fn either(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let branch = if interp.arg(frame, 1).is_truthy() { 2 } else { 3 };
    out(evaluate!(interp, interp.arg(frame, branch)))
}

pub fn unless(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    if interp.arg(frame, 1).is_truthy() {
        return out(Value::VOID);
    }
    out(evaluate!(interp, interp.arg(frame, 2)))
}

pub fn case(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let cases = expect_series(interp.arg(frame, 1))?;
    let all = interp.refine(frame, 2);
    let mut feed = ArrayFeed::new(cases.series, cases.index, cases.specifier);
    let mut result = Value::VOID;
    loop {
        let condition = match interp.eval_step(&mut feed, EvalFlags::empty())? {
            Evaluated::End => {
                if feed.current(&interp.heap).is_bar() {
                    feed.advance();
                    continue;
                }
                return out(result);
            }
            Evaluated::Value(value) => value,
            thrown => return Ok(thrown.into()),
        };
        let branch = match interp.eval_step(&mut feed, EvalFlags::empty())? {
            Evaluated::Value(value) => value,
            Evaluated::End => return Err(Error::raised(ErrorId::NoArg).with_message("case condition has no branch")),
            thrown => return Ok(thrown.into()),
        };
        if !condition.is_truthy() {
            continue;
        }
        result = if branch.kind == Kind::Block {
            evaluate!(interp, branch)
        } else {
            branch
        };
        if !all {
            return out(result);
        }
    }
}

// ── loops ────────────────────────────────────────────────────────

pub fn while_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let condition = interp.arg(frame, 1);
    let body = interp.arg(frame, 2);
    let mut result = Value::VOID;
    loop {
        if !evaluate!(interp, condition).is_truthy() {
            return out(result);
        }
        match pass(interp, body)? {
            Pass::Next(value) => result = value,
            Pass::Stop(bounce) => return Ok(bounce),
        }
    }
}

pub fn until(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let body = interp.arg(frame, 1);
    loop {
        match pass(interp, body)? {
            Pass::Next(value) if value.is_truthy() => return out(value),
            Pass::Next(_) => {}
            Pass::Stop(bounce) => return Ok(bounce),
        }
    }
}

pub fn loop_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let count = interp.arg(frame, 1);
    if count.is_blank() {
        return out(Value::VOID);
    }
    let count = super::expect_integer(count)?;
    let body = interp.arg(frame, 2);
    let mut result = Value::VOID;
    for _ in 0..count.max(0) {
        match pass(interp, body)? {
            Pass::Next(value) => result = value,
            Pass::Stop(bounce) => return Ok(bounce),
        }
    }
    out(result)
}

pub fn forever(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let body = interp.arg(frame, 1);
    loop {
        if let Pass::Stop(bounce) = pass(interp, body)? {
            return Ok(bounce);
        }
    }
}

pub fn repeat(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let word = expect_word(interp.arg(frame, 1))?;
    let count = interp.arg(frame, 2);
    if count.is_blank() {
        return out(Value::VOID);
    }
    let count = super::expect_integer(count)?;
    let body = interp.arg(frame, 3);
    let depth = interp.guard_depth();
    let (context, body) = bind_loop_body(interp, &[word], body)?;
    let mut result = Ok(Bounce::Out(Value::VOID));
    for n in 1..=count.max(0) {
        if let Err(err) = interp.set_context_var(context, 1, Value::integer(n)) {
            result = Err(err);
            break;
        }
        match pass(interp, body) {
            Ok(Pass::Next(value)) => result = out(value),
            Ok(Pass::Stop(bounce)) => {
                result = Ok(bounce);
                break;
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    interp.drop_guards(depth);
    result
}

pub fn for_each(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let vars = interp.arg(frame, 1);
    let data = interp.arg(frame, 2);
    if data.is_blank() {
        return out(Value::VOID);
    }
    let words = match vars.as_series() {
        Some(block) if vars.kind == Kind::Block => {
            let cells = interp.heap.array(block.series)?.get(block.index..).unwrap_or_default().to_vec();
            cells.into_iter().map(expect_word).collect::<Result<Vec<_>>>()?
        }
        _ => vec![expect_word(vars)?],
    };
    if words.is_empty() {
        return Err(Error::arg(ErrorId::InvalidArg, vars));
    }
    let body = interp.arg(frame, 3);
    let depth = interp.guard_depth();
    let result = interp.with_guard(data, |interp| {
        let (context, body) = bind_loop_body(interp, &words, body)?;
        if data.kind.is_any_context() {
            each_field(interp, context, words.len(), data, body)
        } else {
            each_element(interp, context, words.len(), data, body)
        }
    });
    interp.drop_guards(depth);
    result
}

fn each_element(interp: &mut Interp, context: SeriesId, width: usize, data: Value, body: Value) -> Result<Bounce> {
    let series = expect_series(data)?;
    let mut index = series.index;
    let mut result = Value::VOID;
    while index < interp.heap.len(series.series) {
        for n in 0..width {
            let element = super::series::element(interp, data, series, index + n)?;
            interp.set_context_var(context, n + 1, element)?;
        }
        index += width;
        match pass(interp, body)? {
            Pass::Next(value) => result = value,
            Pass::Stop(bounce) => return Ok(bounce),
        }
    }
    out(result)
}

fn each_field(interp: &mut Interp, context: SeriesId, width: usize, data: Value, body: Value) -> Result<Bounce> {
    let varlist = super::expect_context(data)?;
    let keys = interp.context_keys(varlist)?;
    let mut result = Value::VOID;
    for (offset, key) in keys.iter().enumerate() {
        let Some(spelling) = key.spelling.filter(|_| !key.is_hidden()) else {
            continue;
        };
        interp.set_context_var(context, 1, Value::word(Kind::Word, spelling))?;
        if width > 1 {
            let value = interp.context_var(varlist, offset + 1)?;
            interp.set_context_var(context, 2, value)?;
        }
        match pass(interp, body)? {
            Pass::Next(value) => result = value,
            Pass::Stop(bounce) => return Ok(bounce),
        }
    }
    out(result)
}

pub fn break_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let arg = if interp.refine(frame, 1) {
        interp.arg(frame, 2)
    } else {
        Value::VOID
    };
    Ok(Bounce::Thrown {
        label: Value::function(frame.phase, None),
        arg,
    })
}

pub fn continue_(_interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    Ok(Bounce::Thrown {
        label: Value::function(frame.phase, None),
        arg: Value::VOID,
    })
}

// ── throws ───────────────────────────────────────────────────────

pub fn catch(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let named = interp.refine(frame, 2);
    let names = interp.arg(frame, 3);
    match interp.do_block(interp.arg(frame, 1))? {
        Evaluated::Thrown { label, arg } => {
            let caught = if named {
                catches_name(interp, names, label)?
            } else {
                label.is_blank()
            };
            if caught {
                return out(arg);
            }
            Ok(Bounce::Thrown { label, arg })
        }
        other => Ok(other.into()),
    }
}

fn catches_name(interp: &Interp, names: Value, label: Value) -> Result<bool> {
    let Some(thrown) = label.symbol().filter(|_| label.kind.is_any_word()) else {
        return Ok(false);
    };
    let same = |name: Value| {
        name.symbol()
            .filter(|_| name.kind.is_any_word())
            .is_some_and(|sym| interp.symbols.same(sym, thrown))
    };
    match names.as_series() {
        Some(block) if names.kind == Kind::Block => {
            Ok(interp.heap.array(block.series)?.iter().skip(block.index).any(|&name| same(name)))
        }
        _ => Ok(same(names)),
    }
}

pub fn throw(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let label = if interp.refine(frame, 2) {
        interp.arg(frame, 3).with_kind(Kind::Word)
    } else {
        Value::BLANK
    };
    Ok(Bounce::Thrown {
        label,
        arg: interp.arg(frame, 1),
    })
}

pub fn trap(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let guards = interp.guard_depth();
    let data = interp.data_depth();
    let raised = match interp.do_block(interp.arg(frame, 1)) {
        Ok(evaluated) => return Ok(evaluated.into()),
        Err(Error::Raised(raised)) => raised,
        Err(other) => return Err(other),
    };
    interp.drop_guards(guards);
    interp.data_stack.truncate(data);
    debug!("trapped {} error", raised.id.name());
    let error = Value::context(Kind::Error, error_context(interp, &raised)?);
    if !interp.refine(frame, 2) {
        return out(error);
    }
    let handler = interp.arg(frame, 3);
    interp.with_guard(error, |interp| {
        if handler.is_function() {
            return Ok(interp.apply_values(handler, &[error])?.into());
        }
        Ok(match interp.do_block(handler)? {
            Evaluated::End => Bounce::Out(Value::VOID),
            other => other.into(),
        })
    })
}

pub fn attempt(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let guards = interp.guard_depth();
    let data = interp.data_depth();
    match interp.do_block(interp.arg(frame, 1)) {
        Ok(evaluated) => Ok(evaluated.into()),
        Err(Error::Raised(_)) => {
            interp.drop_guards(guards);
            interp.data_stack.truncate(data);
            out(Value::BLANK)
        }
        Err(other) => Err(other),
    }
}

pub fn fail(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let reason = interp.arg(frame, 1);
    match reason.kind {
        Kind::Error => Err(raise_context(interp, super::expect_context(reason)?)),
        Kind::Block => {
            let depth = interp.data_depth();
            if let Some(thrown) = super::data::reduce_onto_stack(interp, reason)? {
                return Ok(thrown);
            }
            let parts = interp.pop_data_to_array(depth);
            let text = interp.form(Value::block(parts));
            let message = super::make_text(interp, Kind::String, &text);
            Err(Error::arg(ErrorId::Message, message))
        }
        _ => Err(Error::arg(ErrorId::Message, reason)),
    }
}

pub fn return_(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    Ok(Bounce::Thrown {
        label: Value::function(frame.phase, frame.binding),
        arg: if value.is_end() { Value::VOID } else { value },
    })
}

pub fn halt(_interp: &mut Interp, _frame: &Frame) -> Result<Bounce> {
    Err(Error::Halt)
}

pub fn quit(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let arg = if interp.refine(frame, 1) {
        interp.arg(frame, 2)
    } else {
        Value::VOID
    };
    Ok(Bounce::Thrown {
        label: Value::function(frame.phase, None),
        arg,
    })
}

// ── logic ────────────────────────────────────────────────────────

pub fn all(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let block = expect_series(interp.arg(frame, 1))?;
    let mut feed = ArrayFeed::new(block.series, block.index, block.specifier);
    let mut result = Value::TRUE;
    loop {
        match interp.eval_step(&mut feed, EvalFlags::empty())? {
            Evaluated::End if feed.current(&interp.heap).is_bar() => feed.advance(),
            Evaluated::End => return out(result),
            Evaluated::Value(value) if value.is_void() => {}
            Evaluated::Value(value) if !value.is_truthy() => return out(Value::BLANK),
            Evaluated::Value(value) => result = value,
            thrown => return Ok(thrown.into()),
        }
    }
}

pub fn any(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let block = expect_series(interp.arg(frame, 1))?;
    let mut feed = ArrayFeed::new(block.series, block.index, block.specifier);
    loop {
        match interp.eval_step(&mut feed, EvalFlags::empty())? {
            Evaluated::End if feed.current(&interp.heap).is_bar() => feed.advance(),
            Evaluated::End => return out(Value::BLANK),
            Evaluated::Value(value) if value.is_truthy() => return out(value),
            Evaluated::Value(_) => {}
            thrown => return Ok(thrown.into()),
        }
    }
}

pub fn not(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(!interp.arg(frame, 1).is_truthy())
}

pub fn and(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(interp.arg(frame, 1).is_truthy() && interp.arg(frame, 2).is_truthy())
}

pub fn or(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(interp.arg(frame, 1).is_truthy() || interp.arg(frame, 2).is_truthy())
}

pub fn comment(_interp: &mut Interp, _frame: &Frame) -> Result<Bounce> {
    Ok(Bounce::Unwritten)
}

pub fn quote(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    out(interp.arg(frame, 1))
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::error::{Error, ErrorId};
    use crate::interp::Interp;
    use crate::value::{Kind, Value};

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn eval(interp: &mut Interp, text: &str) -> Value {
        interp.do_text(text).expect(text)
    }

    #[test]
    fn conditionals() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "if 1 < 2 [10]"), Value::integer(10));
        assert!(eval(&mut interp, "if false [10]").is_void());
        assert_eq!(eval(&mut interp, "either blank [1] [2]"), Value::integer(2));
        assert_eq!(eval(&mut interp, "unless false [3]"), Value::integer(3));
        assert_eq!(eval(&mut interp, "case [false [1] 2 > 1 [2] true [3]]"), Value::integer(2));
        assert_eq!(eval(&mut interp, "x: 0 case/all [true [x: x + 1] true [x: x + 1]] x"), Value::integer(2));
    }

    #[test]
    fn loops_and_break() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "n: 0 loop 5 [n: n + 1] n"), Value::integer(5));
        assert_eq!(eval(&mut interp, "n: 0 while [n < 3] [n: n + 1]"), Value::integer(3));
        assert_eq!(eval(&mut interp, "n: 0 until [n: n + 1 n = 4]"), Value::TRUE);
        assert_eq!(eval(&mut interp, "loop 10 [break]"), Value::BLANK);
        assert_eq!(eval(&mut interp, "loop 10 [break/return 7]"), Value::integer(7));
        assert_eq!(eval(&mut interp, "n: 0 forever [n: n + 1 if n = 6 [break/return n]]"), Value::integer(6));
        assert_eq!(eval(&mut interp, "s: 0 repeat i 4 [s: s + i]"), Value::integer(10));
        let value = eval(&mut interp, "s: 0 repeat i 4 [if odd? i [continue] s: s + i] s");
        assert_eq!(value, Value::integer(6));
    }

    #[test]
    fn for_each_walks_groups_and_fields() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "s: 0 for-each x [1 2 3] [s: s + x] s"), Value::integer(6));
        assert_eq!(eval(&mut interp, "s: 0 for-each [a b] [1 2 3 4] [s: s + (a * b)] s"), Value::integer(14));
        let value = eval(&mut interp, "out: copy [] for-each [k v] make object! [a: 1 b: 2] [append out v] out");
        assert_eq!(interp.mold(value), "[1 2]");
        assert_eq!(eval(&mut interp, r#"n: 0 for-each c "abc" [n: n + 1] n"#), Value::integer(3));
    }

    #[test]
    fn loop_body_sees_function_arguments() {
        let mut interp = interp();
        let value = eval(&mut interp, "f: func [k] [s: 0 repeat i 3 [s: s + k] s] f 5");
        assert_eq!(value, Value::integer(15));
    }

    #[test]
    fn throws_and_named_catches() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "catch [loop 3 [throw 42]]"), Value::integer(42));
        assert_eq!(eval(&mut interp, "catch/name [throw/name 5 'five] 'five"), Value::integer(5));
        assert_eq!(
            eval(&mut interp, "catch [catch/name [throw 1] 'other]"),
            Value::integer(1)
        );
        let err = interp.do_text("throw 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::NoCatch));
    }

    #[test]
    fn trap_turns_errors_into_values() {
        let mut interp = interp();
        let error = eval(&mut interp, "e: trap [1 / 0]");
        assert_eq!(error.kind, Kind::Error);
        let value = eval(&mut interp, "e/id");
        assert_eq!(interp.mold(value), "zero-divide");
        let value = eval(&mut interp, "e/type");
        assert_eq!(interp.mold(value), "math");
        assert_eq!(eval(&mut interp, "trap [1 + 1]"), Value::integer(2));
        assert_eq!(eval(&mut interp, "trap/with [fail \"x\"] [99]"), Value::integer(99));
        assert_eq!(eval(&mut interp, "attempt [1 / 0]"), Value::BLANK);
    }

    #[test]
    fn fail_with_message_and_error_value() {
        let mut interp = interp();
        let err = interp.do_text(r#"fail "boom""#).unwrap_err();
        assert_eq!(interp.format_error(&err).lines().next(), Some("** User error: boom"));
        let err = interp.do_text("fail ['a 1 + 1]").unwrap_err();
        assert!(interp.format_error(&err).starts_with("** User error: a 2"));
        let err = interp.do_text("e: trap [1 / 0] fail e").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ZeroDivide));
    }

    #[test]
    fn halt_is_not_trapped() {
        let mut interp = interp();
        assert!(matches!(interp.do_text("trap [halt]"), Err(Error::Halt)));
        assert!(matches!(interp.do_text("attempt [quit/return 4]"), Err(Error::Quit(4))));
    }

    #[test]
    fn logic_words() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "all [1 2 3]"), Value::integer(3));
        assert_eq!(eval(&mut interp, "all [1 false 3]"), Value::BLANK);
        assert_eq!(eval(&mut interp, "any [false blank 4]"), Value::integer(4));
        assert_eq!(eval(&mut interp, "not 1"), Value::FALSE);
        assert_eq!(eval(&mut interp, "1 < 2 and 3 > 2"), Value::TRUE);
        assert_eq!(eval(&mut interp, "false or false"), Value::FALSE);
        assert_eq!(eval(&mut interp, "comment [whatever] 5"), Value::integer(5));
        let value = eval(&mut interp, "quote (1 + 2)");
        assert_eq!(interp.mold(value), "(1 + 2)");
    }

    #[test]
    fn do_runs_text_and_functions() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, r#"do "1 + 2""#), Value::integer(3));
        assert_eq!(eval(&mut interp, "do :add 1 2"), Value::integer(3));
        assert_eq!(eval(&mut interp, "eval :negate 4"), Value::integer(-4));
    }
}
