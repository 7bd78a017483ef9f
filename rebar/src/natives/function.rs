//! Function generators and reflection.
//!
//! FUNC and FUNCTION build interpreted functions. ADAPT, CHAIN, HIJACK and
//! SPECIALIZE derive new functions from existing ones: the derived
//! paramlist keeps the original's keys and frame layout, and its dispatcher
//! says what to do before, after or instead of the original. VARARGS!
//! cursors are also served from here.

use crate::error::{Error, ErrorId, Result};
use crate::eval::{EvalFlags, Evaluated};
use crate::feed::{ArrayFeed, Feed};
use crate::function::{enfixed, paramlist_of, Bounce, Dispatcher, FunctionInfo};
use crate::interp::{Frame, Interp};
use crate::series::{Misc, SeriesFlags, SeriesId};
use crate::value::{Binding, CellFlags, Key, Kind, ParamClass, ParamFlags, Payload, Specifier, Value, WordRef};
use crate::Symbol;

use super::{expect_series, out};

/// Where a VARARGS! value reads from, and for which parameter.
#[derive(Debug, Clone, Copy)]
pub struct VarargsState {
    pub key: Key,
    /// frame of the variadic call; reads fail once it has ended
    pub frame: Option<SeriesId>,
    pub specifier: Specifier,
    /// cursor index when the call began
    pub start: usize,
}

impl VarargsState {
    pub fn referents(&self) -> impl Iterator<Item = SeriesId> {
        [self.frame, self.specifier].into_iter().flatten()
    }
}

impl Interp {
    /// New function with the given parameters fixed. Void settings leave a
    /// parameter open; refinements take the truth of their setting.
    pub(crate) fn make_specialization(&mut self, specializee: Value, settings: &[(Symbol, Value)]) -> Result<Value> {
        let original = paramlist_of(specializee)?;
        let mut keys = self.keys(original)?;
        let exemplar = self.make_context_with_keylist(Kind::Frame, original);

        if let Some(previous) = self.exemplar_of(original) {
            for (offset, key) in keys.iter().enumerate() {
                if key.flags.contains(ParamFlags::SPECIALIZED) {
                    let value = self.heap.cell(previous, offset + 1);
                    self.heap.poke_unchecked(exemplar, offset + 1, value)?;
                }
            }
        }

        for &(sym, value) in settings {
            let bad = || Error::arg(ErrorId::BadRefine, Value::word(Kind::Word, sym));
            let index = self.find_key(original, sym, false).ok_or_else(bad)?;
            let key = &mut keys[index - 1];
            if matches!(key.class, ParamClass::Local | ParamClass::Return)
                || key.flags.contains(ParamFlags::SPECIALIZED)
            {
                return Err(bad());
            }
            if value.is_void() {
                continue;
            }
            let value = if key.class == ParamClass::Refinement {
                Value::logic(value.is_truthy())
            } else if key.accepts(value.kind) {
                value
            } else {
                return Err(Error::with_args(
                    ErrorId::ExpectArg,
                    vec![Value::BLANK, Value::word(Kind::Word, sym), Value::datatype(value.kind)],
                ));
            };
            key.flags.insert(ParamFlags::SPECIALIZED);
            self.heap.poke_unchecked(exemplar, index, value)?;
        }

        let underlying = self.underlying(original);
        let paramlist = self.make_paramlist(
            &keys,
            Dispatcher::Specializer {
                exemplar,
                specializee,
            },
            Some(underlying),
        );
        let mut info = self.function_info(paramlist)?;
        info.spec = self.function_info(original)?.spec;
        self.set_function_info(paramlist, info);
        Ok(Value::function(paramlist, None))
    }

    /// Rebinds words of `array` (deeply) that are relative to some
    /// function to the frame `specifier` names.
    pub(crate) fn specify_deep(&mut self, array: SeriesId, specifier: Specifier) -> Result<()> {
        let Some(varlist) = specifier else {
            return Ok(());
        };
        let cells = self.heap.array(array)?.to_vec();
        for (index, cell) in cells.into_iter().enumerate() {
            match cell.payload {
                Payload::Word(word @ WordRef {
                    binding: Binding::Relative(_),
                    ..
                }) => {
                    let specific = Value {
                        payload: Payload::Word(WordRef {
                            binding: Binding::Specific(varlist),
                            ..word
                        }),
                        ..cell
                    };
                    self.heap.poke_unchecked(array, index, specific)?;
                }
                Payload::Series(series) if cell.kind.is_any_array() => {
                    self.specify_deep(series.series, specifier)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Copy of a block argument from its index, deep, with relative words
    /// made specific.
    fn body_copy(&mut self, block: Value) -> Result<SeriesId> {
        let series = expect_series(block)?;
        let copy = self.heap.copy_array(series.series, series.index, true)?;
        self.specify_deep(copy, series.specifier)?;
        Ok(copy)
    }
}

pub(crate) fn generate(interp: &mut Interp, spec: Value, body: Value, extra_locals: &[Symbol]) -> Result<Value> {
    let spec = expect_series(spec)?;
    let spec_copy = interp.heap.copy_array(spec.series, spec.index, true)?;
    let body_copy = interp.body_copy(body)?;
    let guard = interp.guard_depth();
    interp.push_guard(Value::block(spec_copy));
    interp.push_guard(Value::block(body_copy));
    let function = interp.make_interpreted(spec_copy, body_copy, extra_locals);
    interp.drop_guards(guard);
    function
}

pub fn func(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let (spec, body) = (interp.arg(frame, 1), interp.arg(frame, 2));
    out(generate(interp, spec, body, &[])?)
}

/// FUNC whose body's set-words become locals.
pub fn function(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let (spec, body) = (interp.arg(frame, 1), interp.arg(frame, 2));
    let series = expect_series(body)?;
    let locals = interp.collect_words(series.series, true, true)?;
    out(generate(interp, spec, body, &locals)?)
}

pub fn does(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let body = interp.arg(frame, 1);
    let spec = interp.heap.make_array(&[]);
    out(generate(interp, Value::block(spec), body, &[])?)
}

pub fn enfix(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    out(enfixed(interp.arg(frame, 1)))
}

/// Runs a prelude in the adaptee's frame before the adaptee itself.
pub fn adapt(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let adaptee = interp.arg(frame, 1);
    let original = paramlist_of(adaptee)?;
    let prelude = interp.body_copy(interp.arg(frame, 2))?;
    let paramlist = interp.derive_function(original, Dispatcher::Adapter { prelude, adaptee })?;
    interp.bind_relative(prelude, paramlist, true)?;
    out(Value::function(paramlist, None))
}

/// Pipes the first function's result through the others.
pub fn chain(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let block = expect_series(interp.arg(frame, 1))?;
    let depth = interp.data_depth();
    let mut feed = ArrayFeed::new(block.series, block.index, block.specifier);
    while !feed.at_end(&interp.heap) {
        let value = match interp.eval_step(&mut feed, EvalFlags::empty())? {
            Evaluated::Value(value) => value,
            Evaluated::End => {
                feed.advance();
                continue;
            }
            Evaluated::Thrown { label, arg } => {
                interp.data_stack.truncate(depth);
                return Ok(Bounce::Thrown { label, arg });
            }
        };
        if !value.is_function() {
            interp.data_stack.truncate(depth);
            return Err(Error::arg(ErrorId::InvalidArg, value));
        }
        interp.push_data(value.without_flag(CellFlags::ENFIXED));
    }
    if interp.data_depth() == depth {
        return Err(Error::arg(ErrorId::InvalidArg, interp.arg(frame, 1)));
    }
    let first = interp.data_stack[depth];
    let pipeline = interp.pop_data_to_array(depth);
    let original = paramlist_of(first)?;
    let paramlist = interp.derive_function(original, Dispatcher::Chainer { pipeline })?;
    out(Value::function(paramlist, None))
}

/// Makes every existing reference to the victim run the hijacker instead.
/// Returns a function that still does what the victim used to do.
pub fn hijack(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let victim = paramlist_of(interp.arg(frame, 1))?;
    let hijacker = interp.arg(frame, 2);
    paramlist_of(hijacker)?;

    let before = interp.function_info(victim)?;
    let keys = interp.keys(victim)?;
    let preserved = interp.make_paramlist(&keys, before.dispatcher, Some(before.underlying));
    interp.set_function_info(preserved, before);

    interp.set_function_info(
        victim,
        FunctionInfo {
            dispatcher: Dispatcher::Hijacker { hijacker },
            body: None,
            underlying: before.underlying,
            spec: before.spec,
        },
    );
    out(Value::function(preserved, None))
}

pub fn specialize(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let specializee = interp.arg(frame, 1);
    let original = paramlist_of(specializee)?;
    let def = interp.body_copy(interp.arg(frame, 2))?;
    let exemplar = interp.make_context_with_keylist(Kind::Frame, original);

    let guard = interp.guard_depth();
    interp.push_guard(Value::block(def));
    interp.push_guard(Value::context(Kind::Frame, exemplar));
    let result = specialize_with(interp, specializee, original, exemplar, def);
    interp.drop_guards(guard);
    result
}

fn specialize_with(
    interp: &mut Interp,
    specializee: Value,
    original: SeriesId,
    exemplar: SeriesId,
    def: SeriesId,
) -> Result<Bounce> {
    interp.bind_array(def, exemplar, true)?;
    if let Evaluated::Thrown { label, arg } = interp.do_array(def, 0, None)? {
        return Ok(Bounce::Thrown { label, arg });
    }
    let mut settings = Vec::new();
    for (offset, key) in interp.keys(original)?.into_iter().enumerate() {
        if key.flags.contains(ParamFlags::SPECIALIZED)
            || matches!(key.class, ParamClass::Local | ParamClass::Return)
        {
            continue;
        }
        let value = interp.heap.cell(exemplar, offset + 1);
        if let Some(sym) = key.spelling
            && !value.is_void()
            && !value.is_end()
        {
            settings.push((sym, value));
        }
    }
    out(interp.make_specialization(specializee, &settings)?)
}

pub fn spec_of(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let info = interp.function_info(paramlist_of(interp.arg(frame, 1))?)?;
    let copy = match info.spec {
        Some(spec) => interp.heap.copy_array(spec, 0, true)?,
        None => interp.heap.make_array(&[]),
    };
    out(Value::block(copy))
}

pub fn body_of(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let info = interp.function_info(paramlist_of(interp.arg(frame, 1))?)?;
    let body = match info.dispatcher {
        Dispatcher::Interpreted => info.body,
        Dispatcher::Adapter { prelude, .. } => Some(prelude),
        _ => None,
    };
    match body {
        Some(body) => out(Value::block(interp.heap.copy_array(body, 0, true)?)),
        None => out(Value::BLANK),
    }
}

// ── varargs ──────────────────────────────────────────────────────

fn varargs_state(interp: &Interp, state: SeriesId) -> Result<VarargsState> {
    let varargs = match interp.heap.misc(state) {
        Misc::Varargs(varargs) => *varargs,
        _ => return Err(Error::arg(ErrorId::InvalidArg, Value::varargs(state))),
    };
    let ended = varargs.frame.is_some_and(|frame| {
        !interp.heap.is_live(frame) || interp.heap.flags(frame).contains(SeriesFlags::INACCESSIBLE)
    });
    if ended {
        return Err(Error::raised(ErrorId::InvalidVarargs));
    }
    Ok(varargs)
}

fn varargs_cursor(interp: &Interp, state: SeriesId) -> Result<ArrayFeed> {
    let cursor = interp.heap.cell(state, 0);
    let series = cursor
        .as_series()
        .ok_or_else(|| Error::arg(ErrorId::InvalidArg, Value::varargs(state)))?;
    Ok(ArrayFeed::new(series.series, series.index, series.specifier))
}

/// Whether a VARARGS! has nothing left to take.
pub(crate) fn varargs_tail(interp: &Interp, state: SeriesId) -> Result<bool> {
    varargs_state(interp, state)?;
    let feed = varargs_cursor(interp, state)?;
    let current = feed.current(&interp.heap);
    Ok(current.is_end() || current.is_bar())
}

/// Takes the next argument from a VARARGS!, the way its parameter would
/// have been fulfilled.
pub(crate) fn varargs_take(interp: &mut Interp, state: SeriesId) -> Result<Evaluated> {
    let varargs = varargs_state(interp, state)?;
    let mut feed = varargs_cursor(interp, state)?;
    let current = feed.current(&interp.heap);
    if current.is_end() || current.is_bar() {
        return Ok(Evaluated::End);
    }
    let taken = match varargs.key.class {
        ParamClass::HardQuote | ParamClass::SoftQuote => {
            feed.advance();
            Evaluated::Value(interp.derelativize(current, feed.specifier()))
        }
        ParamClass::Tight => interp.eval_step(&mut feed, EvalFlags::NO_LOOKAHEAD)?,
        _ => interp.eval_step(&mut feed, EvalFlags::empty())?,
    };
    if let Evaluated::Value(value) = taken
        && !varargs.key.accepts(value.kind)
    {
        return Err(Error::with_args(
            ErrorId::ExpectArg,
            vec![
                Value::BLANK,
                varargs.key.spelling.map_or(Value::BLANK, |s| Value::word(Kind::Word, s)),
                Value::datatype(value.kind),
            ],
        ));
    }
    let moved = interp.heap.cell(state, 0).at_index(feed.index());
    interp.heap.poke_unchecked(state, 0, moved)?;
    Ok(taken)
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

    fn eval(interp: &mut Interp, text: &str) -> Value {
        interp.do_text(text).expect(text)
    }

    #[test]
    fn hard_quote_takes_group_literally() {
        let mut interp = interp();
        let value = eval(&mut interp, "f: func [:x] [x] f (1 + 2)");
        assert_eq!(interp.mold(value), "(1 + 2)");
    }

    #[test]
    fn function_collects_locals() {
        let mut interp = interp();
        eval(&mut interp, "total: 100 f: function [n] [total: n * 2 total]");
        assert_eq!(eval(&mut interp, "f 4"), Value::integer(8));
        assert_eq!(eval(&mut interp, "total"), Value::integer(100));
    }

    #[test]
    fn does_runs_body() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "g: does [1 + 1] g"), Value::integer(2));
    }

    #[test]
    fn adapt_runs_prelude_in_frame() {
        let mut interp = interp();
        let value = eval(&mut interp, "inc: func [n] [n + 1] double-first: adapt :inc [n: n * 2] double-first 5");
        assert_eq!(value, Value::integer(11));
    }

    #[test]
    fn chain_pipes_results() {
        let mut interp = interp();
        let value = eval(
            &mut interp,
            "inc: func [n] [n + 1] dbl: func [n] [n * 2] both: chain [:inc :dbl] both 3",
        );
        assert_eq!(value, Value::integer(8));
    }

    #[test]
    fn specialize_fixes_arguments() {
        let mut interp = interp();
        let value = eval(&mut interp, "add10: specialize :add [value2: 10] add10 5");
        assert_eq!(value, Value::integer(15));
        let value = eval(&mut interp, "app: specialize :append [only: true] b: copy [] app b [1 2] length-of b");
        assert_eq!(value, Value::integer(1));
    }

    #[test]
    fn hijack_redirects_existing_references() {
        let mut interp = interp();
        eval(&mut interp, "greet: func [x] [x + 1] keep: :greet");
        let old = eval(&mut interp, "old: hijack :greet func [x] [x * 100] keep 2");
        assert_eq!(old, Value::integer(200));
        assert_eq!(eval(&mut interp, "old 2"), Value::integer(3));
    }

    #[test]
    fn nested_function_sees_outer_argument() {
        let mut interp = interp();
        let value = eval(&mut interp, "outer: func [x] [inner: func [y] [x + y] inner 2] outer 40");
        assert_eq!(value, Value::integer(42));
    }

    #[test]
    fn varargs_take_from_callsite() {
        let mut interp = interp();
        let value = eval(
            &mut interp,
            "sum: func [args [integer! <...>]] [t: 0 while [not tail? args] [t: t + take args] t] sum 1 2 3",
        );
        assert_eq!(value, Value::integer(6));
    }

    #[test]
    fn varargs_fail_after_frame_ends() {
        let mut interp = interp();
        eval(&mut interp, "grab: func [v [<...>]] [v] leaked: grab");
        let err = interp.do_text("take leaked").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::InvalidVarargs));
    }

    #[test]
    fn reflection() {
        let mut interp = interp();
        eval(&mut interp, "f: func [a b] [a + b]");
        let spec = eval(&mut interp, "spec-of :f");
        assert_eq!(interp.mold(spec), "[a b]");
        let body = eval(&mut interp, "body-of :f");
        assert_eq!(interp.mold(body), "[a + b]");
        let words = eval(&mut interp, "words-of :f");
        assert_eq!(interp.mold(words), "[a b]");
    }
}
