//! The evaluator: one expression at a time over a [`Feed`].
//!
//! `eval_step` consumes a single expression, including any enfix functions
//! that continue it. `call_function` is the function path: it pushes a
//! frame whose argument slots live on the chunk stack, fulfills the
//! parameters from the feed in paramlist order, then runs dispatchers until
//! one produces an output.
//!
//! Throws are values, not unwinding: every layer hands back
//! [`Evaluated::Thrown`] and the first construct that recognises the label
//! stops it. Errors travel as `Err` and unwind through `?`; frames are
//! always popped on the way out.

use bitflags::bitflags;
use log::{debug, trace};

use crate::error::{Error, ErrorId, Result};
use crate::feed::{ArrayFeed, Feed, ValuesFeed};
use crate::function::{paramlist_of, Bounce, Dispatcher, FunctionInfo};
use crate::interp::{Frame, Interp};
use crate::natives;
use crate::natives::function::VarargsState;
use crate::path::PathMode;
use crate::series::{Link, Misc, SeriesData, SeriesFlags, SeriesId};
use crate::signal::{SignalFlags, SignalMessage};
use crate::value::{CellFlags, Key, Kind, ParamClass, ParamFlags, Specifier, Value};
use crate::Symbol;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EvalFlags: u8 {
        /// an enfix function after this step may not take its result
        const NO_LOOKAHEAD = 1 << 0;
    }
}

/// Outcome of evaluating an expression (or running out of them).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluated {
    Value(Value),
    Thrown { label: Value, arg: Value },
    End,
}

impl Evaluated {
    #[inline]
    pub fn is_thrown(&self) -> bool {
        matches!(self, Evaluated::Thrown { .. })
    }

    /// The produced value, END read as void; `None` for a throw.
    pub fn value(self) -> Option<Value> {
        match self {
            Evaluated::Value(value) => Some(value),
            Evaluated::End => Some(Value::VOID),
            Evaluated::Thrown { .. } => None,
        }
    }
}

impl From<Evaluated> for Bounce {
    fn from(evaluated: Evaluated) -> Self {
        match evaluated {
            Evaluated::Value(value) => Bounce::Out(value),
            Evaluated::End => Bounce::Unwritten,
            Evaluated::Thrown { label, arg } => Bounce::Thrown { label, arg },
        }
    }
}

fn word_of(sym: Option<Symbol>) -> Value {
    sym.map_or(Value::BLANK, |sym| Value::word(Kind::Word, sym))
}

impl Interp {
    // ── stepping ─────────────────────────────────────────────────

    /// Evaluates the whole of `array` from `index`; the result is the last
    /// expression's value, or END if there were none.
    pub fn do_array(&mut self, array: SeriesId, index: usize, specifier: Specifier) -> Result<Evaluated> {
        let mut feed = ArrayFeed::new(array, index, specifier);
        self.do_feed(&mut feed)
    }

    pub fn do_feed(&mut self, feed: &mut dyn Feed) -> Result<Evaluated> {
        let mut last = Evaluated::End;
        loop {
            let current = feed.current(&self.heap);
            if current.is_end() {
                return Ok(last);
            }
            if current.is_bar() {
                feed.advance();
                last = Evaluated::End;
                continue;
            }
            match self.eval_step(feed, EvalFlags::empty())? {
                thrown @ Evaluated::Thrown { .. } => return Ok(thrown),
                Evaluated::End => {}
                value => last = value,
            }
        }
    }

    /// Runs a BLOCK! or GROUP! value at its position, with its specifier.
    pub fn do_block(&mut self, block: Value) -> Result<Evaluated> {
        match block.as_series() {
            Some(series) if block.kind.is_any_array() => {
                self.do_array(series.series, series.index, series.specifier)
            }
            _ => Err(Error::arg(ErrorId::InvalidArg, block)),
        }
    }

    /// Evaluates one expression. END and `|` yield [`Evaluated::End`]
    /// without being consumed.
    pub fn eval_step(&mut self, feed: &mut dyn Feed, flags: EvalFlags) -> Result<Evaluated> {
        self.service_signals()?;
        let current = feed.current(&self.heap);
        if current.is_end() || current.is_bar() {
            return Ok(Evaluated::End);
        }
        let near = feed.position();
        self.stats.steps += 1;
        if self.settings.trace {
            trace!("eval depth={} {}", self.frames.len(), self.mold(current));
        }
        feed.advance();

        let mut out = match self.eval_core(current, feed) {
            Ok(Evaluated::Value(value)) => value,
            Ok(other) => return Ok(other),
            Err(err) => return Err(err.annotate(None, near)),
        };

        if !flags.contains(EvalFlags::NO_LOOKAHEAD) {
            while let Some((function, label)) = self.enfix_next(&*feed) {
                feed.advance();
                out = match self.call_function(function, label, feed, Some(out), &[])? {
                    Evaluated::Value(value) => value,
                    Evaluated::End => Value::VOID,
                    thrown => return Ok(thrown),
                };
            }
        }
        Ok(Evaluated::Value(out))
    }

    /// The function an enfix word at the feed head names, if any.
    fn enfix_next(&self, feed: &dyn Feed) -> Option<(Value, Option<Symbol>)> {
        let next = feed.current(&self.heap);
        if next.kind != Kind::Word {
            return None;
        }
        let value = self.get_var(next, feed.specifier()).ok()?;
        value.is_enfixed().then(|| (value, next.symbol()))
    }

    /// Evaluates `current`, already taken off the feed; argument gathering
    /// continues from `feed`.
    pub(crate) fn eval_core(&mut self, current: Value, feed: &mut dyn Feed) -> Result<Evaluated> {
        let specifier = feed.specifier();
        match current.kind {
            Kind::Word => {
                let value = self.get_var(current, specifier)?;
                if value.is_function() {
                    return self.call_function(value, current.symbol(), feed, None, &[]);
                }
                if value.is_void() {
                    return Err(Error::arg(ErrorId::NoValue, current));
                }
                Ok(Evaluated::Value(value))
            }
            Kind::SetWord => {
                let value = match self.eval_step(feed, EvalFlags::empty())? {
                    Evaluated::Value(value) => value,
                    Evaluated::End => return Err(Error::arg(ErrorId::NeedValue, current)),
                    thrown => return Ok(thrown),
                };
                self.set_var(current, specifier, value)?;
                Ok(Evaluated::Value(value))
            }
            Kind::GetWord => Ok(Evaluated::Value(self.get_var(current, specifier)?)),
            Kind::LitWord => {
                let word = self.derelativize(current, specifier).with_kind(Kind::Word);
                Ok(Evaluated::Value(word))
            }
            Kind::Group => {
                let group = self.derelativize(current, specifier);
                match self.do_block(group)? {
                    Evaluated::End => Ok(Evaluated::Value(Value::VOID)),
                    other => Ok(other),
                }
            }
            Kind::Path => self.eval_path(current, specifier, PathMode::Call, Some(feed)),
            Kind::GetPath => self.eval_path(current, specifier, PathMode::Get, None),
            Kind::SetPath => {
                let value = match self.eval_step(feed, EvalFlags::empty())? {
                    Evaluated::Value(value) => value,
                    Evaluated::End => return Err(Error::arg(ErrorId::NeedValue, current)),
                    thrown => return Ok(thrown),
                };
                let set = self.with_guard(value, |interp| {
                    interp.eval_path(current, specifier, PathMode::Set(value), None)
                })?;
                match set {
                    thrown @ Evaluated::Thrown { .. } => Ok(thrown),
                    _ => Ok(Evaluated::Value(value)),
                }
            }
            Kind::LitPath => {
                let path = self.derelativize(current, specifier).with_kind(Kind::Path);
                Ok(Evaluated::Value(path))
            }
            Kind::Function => self.call_function(current, None, feed, None, &[]),
            Kind::End | Kind::Bar => Ok(Evaluated::End),
            _ => Ok(Evaluated::Value(self.derelativize(current, specifier))),
        }
    }

    // ── signals ──────────────────────────────────────────────────

    fn service_signals(&mut self) -> Result<()> {
        if !self.signals.tick() {
            return Ok(());
        }
        let pending = self.signals.pending();
        if pending.is_empty() {
            return Ok(());
        }
        for message in self.signals.drain() {
            if let SignalMessage::Interrupt(Some(note)) = message {
                debug!("interrupt requested: {note}");
            }
        }
        if pending.contains(SignalFlags::RECYCLE) && self.heap.gc_allowed() {
            self.signals.take(SignalFlags::RECYCLE);
            self.recycle();
        }
        self.signals.take(SignalFlags::EVENT_PORT);
        if !self.signals.take(SignalFlags::HALT).is_empty() {
            debug!("halt signal at depth {}", self.frames.len());
            return Err(Error::Halt);
        }
        if !self.signals.take(SignalFlags::INTERRUPT).is_empty() {
            debug!("interrupt signal at depth {}", self.frames.len());
            if let Some(mut hook) = self.breakpoint.take() {
                let resumed = hook(self);
                self.breakpoint = Some(hook);
                let resumed = resumed?;
                if !resumed.is_void() {
                    return Err(Error::arg(ErrorId::BadResume, resumed));
                }
            }
        }
        Ok(())
    }

    // ── function path ────────────────────────────────────────────

    /// Calls `function`, taking arguments from `feed`. `left` is the
    /// already-evaluated first argument of an enfix call; `refinements`
    /// are the ones named in a path.
    pub fn call_function(
        &mut self,
        function: Value,
        label: Option<Symbol>,
        feed: &mut dyn Feed,
        left: Option<Value>,
        refinements: &[Symbol],
    ) -> Result<Evaluated> {
        let fref = function
            .as_function()
            .ok_or_else(|| Error::arg(ErrorId::InvalidArg, function))?;
        if self.frames.len() >= self.settings.stack_limit {
            return Err(Error::raised(ErrorId::StackOverflow).annotate(label, feed.position()));
        }
        let paramlist = fref.paramlist;
        let keys = self.keys(paramlist)?;

        let handle = self.heap.chunks.push_chunk(keys.len() + 1);
        let slots = handle.slots();
        let varlist = self.heap.alloc(
            SeriesData::Stack(slots),
            SeriesFlags::MANAGED
                | SeriesFlags::ARRAY
                | SeriesFlags::VARLIST
                | SeriesFlags::STACK
                | SeriesFlags::FIXED_SIZE,
        );
        self.heap.set_link(varlist, Link::Keylist(paramlist));
        self.heap.chunks.set(slots, 0, Value::context(Kind::Frame, varlist));
        let frame = Frame {
            varlist,
            keylist: paramlist,
            phase: paramlist,
            binding: fref.binding,
            slots,
            label,
            near: feed.position(),
        };
        self.frames.push(frame);
        self.stats.calls += 1;

        let enfix_missing = function.is_enfixed() && left.is_none();
        let mut variadics = Vec::new();
        let result = match self.fulfill(&frame, &keys, feed, left, enfix_missing, refinements, &mut variadics) {
            Ok(Some(thrown)) => Ok(thrown),
            Ok(None) => self.run_phase(feed, function),
            Err(err) => Err(err),
        };

        let consumed = variadics
            .iter()
            .map(|&(state, start)| self.varargs_position(state).saturating_sub(start))
            .max()
            .unwrap_or(0);
        for _ in 0..consumed {
            feed.advance();
        }

        self.frames.pop();
        self.heap.decay_varlist(varlist);
        self.heap.chunks.drop_chunk(handle)?;
        result.map_err(|err| err.annotate(label, frame.near))
    }

    /// Calls `function` with `args` used literally, in paramlist order.
    /// Each refinement takes one value (its truthiness); arguments of an
    /// inactive refinement still occupy a position.
    pub fn apply_values(&mut self, function: Value, args: &[Value]) -> Result<Evaluated> {
        let depth = self.guard_depth();
        self.push_guard(function);
        for &arg in args {
            self.push_guard(arg);
        }
        let mut feed = ValuesFeed::inert(args);
        let result = self.call_function(function.without_flag(CellFlags::ENFIXED), None, &mut feed, None, &[]);
        self.drop_guards(depth);
        let result = result?;
        if !result.is_thrown() && feed.consumed() < args.len() {
            return Err(Error::arg(ErrorId::ApplyTooMany, function));
        }
        Ok(result)
    }

    fn varargs_position(&self, state: SeriesId) -> usize {
        self.heap
            .cell(state, 0)
            .as_series()
            .map_or(0, |series| series.index)
    }

    /// Specialization exemplar reachable from `paramlist`.
    pub(crate) fn exemplar_of(&self, paramlist: SeriesId) -> Option<SeriesId> {
        let mut current = paramlist;
        loop {
            current = match self.function_info(current).ok()?.dispatcher {
                Dispatcher::Specializer { exemplar, .. } => return Some(exemplar),
                Dispatcher::Adapter { adaptee, .. } => adaptee.as_function()?.paramlist,
                Dispatcher::Hijacker { hijacker } => hijacker.as_function()?.paramlist,
                Dispatcher::Chainer { pipeline } => self.heap.cell(pipeline, 0).as_function()?.paramlist,
                _ => return None,
            };
        }
    }

    /// Fills the frame's argument slots. Returns a throw that interrupted
    /// fulfillment, if any.
    #[allow(clippy::too_many_arguments)]
    fn fulfill(
        &mut self,
        frame: &Frame,
        keys: &[Key],
        feed: &mut dyn Feed,
        mut left: Option<Value>,
        mut enfix_missing: bool,
        refinements: &[Symbol],
        variadics: &mut Vec<(SeriesId, usize)>,
    ) -> Result<Option<Evaluated>> {
        for &sym in refinements {
            let known = keys.iter().any(|key| {
                key.class == ParamClass::Refinement
                    && !key.flags.contains(ParamFlags::SPECIALIZED)
                    && key.spelling.is_some_and(|s| self.symbols.same(s, sym))
            });
            if !known {
                return Err(Error::with_args(
                    ErrorId::BadRefine,
                    vec![Value::word(Kind::Refinement, sym)],
                ));
            }
        }

        let exemplar = if keys.iter().any(|key| key.flags.contains(ParamFlags::SPECIALIZED)) {
            self.exemplar_of(frame.keylist)
        } else {
            None
        };

        let mut active = true;
        for (offset, key) in keys.iter().enumerate() {
            let n = offset + 1;

            if key.flags.contains(ParamFlags::SPECIALIZED) {
                let value = match exemplar {
                    Some(exemplar) => self.heap.cell(exemplar, n),
                    None => Value::VOID,
                };
                let value = if value.is_end() { Value::VOID } else { value };
                if key.class == ParamClass::Refinement {
                    active = value.is_truthy();
                }
                self.heap.chunks.set(frame.slots, n, value);
                continue;
            }

            match key.class {
                ParamClass::Local => continue,
                ParamClass::Return => {
                    let definitional = match self.specials.return_ {
                        Some(paramlist) => Value::function(paramlist, Some(frame.varlist)),
                        None => Value::VOID,
                    };
                    self.heap.chunks.set(frame.slots, n, definitional);
                    continue;
                }
                ParamClass::Refinement => {
                    active = if feed.is_inert() {
                        let flag = feed.current(&self.heap);
                        if flag.is_end() {
                            false
                        } else {
                            feed.advance();
                            flag.is_truthy()
                        }
                    } else {
                        key.spelling.is_some_and(|spelling| {
                            refinements.iter().any(|&sym| self.symbols.same(sym, spelling))
                        })
                    };
                    self.heap.chunks.set(frame.slots, n, Value::logic(active));
                    continue;
                }
                _ => {}
            }

            if !active {
                if feed.is_inert() && !feed.at_end(&self.heap) {
                    feed.advance();
                }
                continue;
            }

            if let Some(value) = left.take() {
                self.check_arg(frame, key, value)?;
                self.heap.chunks.set(frame.slots, n, value);
                continue;
            }
            if enfix_missing {
                enfix_missing = false;
                if key.flags.contains(ParamFlags::ENDABLE) {
                    continue;
                }
                return Err(self.no_arg(frame, key));
            }

            if key.flags.contains(ParamFlags::VARIADIC) {
                let (array, index) = feed.reify(&mut self.heap);
                let state = VarargsState {
                    key: *key,
                    frame: Some(frame.varlist),
                    specifier: feed.specifier(),
                    start: index,
                };
                let cursor = Value::series(Kind::Block, array, index).with_specifier(feed.specifier());
                let series = self.heap.make_singular(cursor, SeriesFlags::MANAGED);
                self.heap.set_misc(series, Misc::Varargs(state));
                variadics.push((series, index));
                self.heap.chunks.set(frame.slots, n, Value::varargs(series));
                continue;
            }

            let value = match self.take_arg(frame, key, feed)? {
                Ok(value) => value,
                Err(thrown) => return Ok(Some(thrown)),
            };
            self.check_arg(frame, key, value)?;
            self.heap.chunks.set(frame.slots, n, value);
        }
        Ok(None)
    }

    /// Gathers one argument for `key` from `feed` according to its class.
    /// The inner `Err` carries a throw.
    pub(crate) fn take_arg(
        &mut self,
        frame: &Frame,
        key: &Key,
        feed: &mut dyn Feed,
    ) -> Result<std::result::Result<Value, Evaluated>> {
        let current = feed.current(&self.heap);
        let endable = key.flags.contains(ParamFlags::ENDABLE);

        if feed.is_inert() {
            if current.is_end() {
                return if endable {
                    Ok(Ok(Value::VOID))
                } else {
                    Err(self.no_arg(frame, key))
                };
            }
            feed.advance();
            return Ok(Ok(current));
        }

        let barrier = current.is_bar() && key.class != ParamClass::HardQuote;
        if current.is_end() || barrier {
            if endable {
                return Ok(Ok(Value::VOID));
            }
            if barrier {
                return Err(Error::raised(ErrorId::ExpressionBarrier));
            }
            return Err(self.no_arg(frame, key));
        }

        let evaluate = |interp: &mut Self, feed: &mut dyn Feed, flags| -> Result<std::result::Result<Value, Evaluated>> {
            match interp.eval_step(feed, flags)? {
                Evaluated::Value(value) => Ok(Ok(value)),
                Evaluated::End if endable => Ok(Ok(Value::VOID)),
                Evaluated::End => Err(interp.no_arg(frame, key)),
                thrown => Ok(Err(thrown)),
            }
        };

        match key.class {
            ParamClass::Normal => evaluate(self, feed, EvalFlags::empty()),
            ParamClass::Tight => evaluate(self, feed, EvalFlags::NO_LOOKAHEAD),
            ParamClass::SoftQuote
                if matches!(current.kind, Kind::Group | Kind::GetWord | Kind::GetPath) =>
            {
                evaluate(self, feed, EvalFlags::NO_LOOKAHEAD)
            }
            _ => {
                feed.advance();
                Ok(Ok(self.derelativize(current, feed.specifier())))
            }
        }
    }

    fn no_arg(&self, frame: &Frame, key: &Key) -> Error {
        Error::with_args(ErrorId::NoArg, vec![word_of(frame.label), word_of(key.spelling)])
    }

    fn check_arg(&self, frame: &Frame, key: &Key, value: Value) -> Result<()> {
        if key.accepts(value.kind) {
            return Ok(());
        }
        Err(Error::with_args(
            ErrorId::ExpectArg,
            vec![word_of(frame.label), word_of(key.spelling), Value::datatype(value.kind)],
        ))
    }

    // ── dispatch ─────────────────────────────────────────────────

    /// Runs `phase` on the top frame, following redos, until an output is
    /// produced.
    pub(crate) fn run_phase(&mut self, feed: &mut dyn Feed, phase: Value) -> Result<Evaluated> {
        let mut phase = phase;
        loop {
            let fref = phase
                .as_function()
                .ok_or_else(|| Error::arg(ErrorId::InvalidArg, phase))?;
            let frame = {
                let top = self.frames.last_mut().expect("run_phase needs a pushed frame");
                top.phase = fref.paramlist;
                if fref.binding.is_some() {
                    top.binding = fref.binding;
                }
                *top
            };
            let info = self.function_info(frame.phase)?;
            match self.dispatch(&frame, info, feed)? {
                Bounce::Out(value) => return Ok(Evaluated::Value(value)),
                Bounce::Unwritten => return Ok(Evaluated::Value(Value::VOID)),
                Bounce::Thrown { label, arg } => return Ok(Evaluated::Thrown { label, arg }),
                Bounce::Redo(next) => phase = next,
                Bounce::Reevaluate(value) => return self.eval_core(value, feed),
            }
        }
    }

    fn dispatch(&mut self, frame: &Frame, info: FunctionInfo, feed: &mut dyn Feed) -> Result<Bounce> {
        match info.dispatcher {
            Dispatcher::Native(native) => native(self, frame),
            Dispatcher::Action(verb) => natives::series::run_action(self, frame, verb),
            Dispatcher::Interpreted => {
                let body = info.body.ok_or_else(|| Error::raised(ErrorId::Misc))?;
                match self.do_array(body, 0, Some(frame.varlist))? {
                    Evaluated::Thrown { label, arg } if self.is_return_to(label, frame.varlist) => {
                        Ok(Bounce::Out(arg))
                    }
                    other => Ok(other.into()),
                }
            }
            Dispatcher::Adapter { prelude, adaptee } => match self.do_array(prelude, 0, Some(frame.varlist))? {
                Evaluated::Thrown { label, arg } => Ok(Bounce::Thrown { label, arg }),
                _ => Ok(Bounce::Redo(adaptee)),
            },
            Dispatcher::Specializer { specializee, .. } => Ok(Bounce::Redo(specializee)),
            Dispatcher::Chainer { pipeline } => {
                let functions = self.heap.array(pipeline)?.to_vec();
                let Some((&first, rest)) = functions.split_first() else {
                    return Ok(Bounce::Unwritten);
                };
                let mut out = match self.run_phase(feed, first)? {
                    Evaluated::Value(value) => value,
                    Evaluated::End => Value::VOID,
                    thrown => return Ok(thrown.into()),
                };
                for &function in rest {
                    out = match self.apply_values(function, &[out])? {
                        Evaluated::Value(value) => value,
                        Evaluated::End => Value::VOID,
                        thrown => return Ok(thrown.into()),
                    };
                }
                Ok(Bounce::Out(out))
            }
            Dispatcher::Hijacker { hijacker } => {
                let target = paramlist_of(hijacker)?;
                if self.underlying(target) == self.underlying(frame.keylist) {
                    return Ok(Bounce::Redo(hijacker));
                }
                let args = self.args_by_name(frame, target)?;
                Ok(self.apply_values(hijacker, &args)?.into())
            }
        }
    }

    /// Whether `label` is the definitional return of the frame `varlist`.
    pub(crate) fn is_return_to(&self, label: Value, varlist: SeriesId) -> bool {
        match (label.as_function(), self.specials.return_) {
            (Some(f), Some(ret)) => label.kind == Kind::Function && f.paramlist == ret && f.binding == Some(varlist),
            _ => false,
        }
    }

    /// Arguments for `target`'s parameters, matched by name against the
    /// frame's, in the layout [`apply_values`](Interp::apply_values) takes.
    fn args_by_name(&self, frame: &Frame, target: SeriesId) -> Result<Vec<Value>> {
        let mut args = Vec::new();
        for key in self.keys(target)? {
            if matches!(key.class, ParamClass::Local | ParamClass::Return)
                || key.flags.contains(ParamFlags::SPECIALIZED)
            {
                continue;
            }
            let found = key
                .spelling
                .and_then(|sym| self.find_key(frame.keylist, sym, true))
                .map(|index| self.arg(frame, index));
            let value = match (key.class, found) {
                (ParamClass::Refinement, Some(value)) => Value::logic(value.is_truthy()),
                (ParamClass::Refinement, None) => Value::FALSE,
                (_, Some(value)) if !value.is_end() => value,
                _ => Value::VOID,
            };
            args.push(value);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn eval(interp: &mut Interp, text: &str) -> Value {
        interp.do_text(text).expect(text)
    }

    #[test]
    fn tight_operands_continue_left_to_right() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "1 + 2 * 3"), Value::integer(9));
    }

    #[test]
    fn normal_operand_takes_whole_expression() {
        let mut interp = interp();
        let value = eval(&mut interp, "plus: enfix func [a b] [add a b] 1 plus 2 * 3");
        assert_eq!(value, Value::integer(7));
    }

    #[test]
    fn set_words_chain() {
        let mut interp = interp();
        eval(&mut interp, "a: b: 5");
        assert_eq!(interp.lib_value("a"), Some(Value::integer(5)));
        assert_eq!(interp.lib_value("b"), Some(Value::integer(5)));
    }

    #[test]
    fn bar_is_an_expression_barrier() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "1 | 2"), Value::integer(2));
        let err = interp.do_text("negate | 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ExpressionBarrier));
    }

    #[test]
    fn missing_argument_reports_no_arg() {
        let mut interp = interp();
        let err = interp.do_text("negate").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::NoArg));
    }

    #[test]
    fn type_mismatch_reports_expect_arg() {
        let mut interp = interp();
        let err = interp.do_text(r#"negate "text""#).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ExpectArg));
    }

    #[test]
    fn unset_word_is_no_value() {
        let mut interp = interp();
        let err = interp.do_text("never-assigned-anywhere").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::NoValue));
    }

    #[test]
    fn throw_abandons_pending_call() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "catch [1 + throw 10]"), Value::integer(10));
    }

    #[test]
    fn definitional_return_exits_its_own_function() {
        let mut interp = interp();
        let value = eval(&mut interp, "f: func [x] [if x > 1 [return 100] x] f 5");
        assert_eq!(value, Value::integer(100));
        assert_eq!(eval(&mut interp, "f 1"), Value::integer(1));
    }

    #[test]
    fn frames_are_released_after_errors() {
        let mut interp = interp();
        let depth = interp.heap.chunks.depth();
        let _ = interp.do_text("f: func [x] [x / 0] f 1");
        assert_eq!(interp.depth(), 0);
        assert_eq!(interp.heap.chunks.depth(), depth);
    }

    #[test]
    fn stack_limit_is_enforced() {
        let mut settings = Settings::default();
        settings.stack_limit = 40;
        let mut interp = Interp::new(settings).unwrap();
        let err = interp.do_text("f: func [] [f] f").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::StackOverflow));
        assert_eq!(interp.depth(), 0);
    }

    #[test]
    fn halt_signal_stops_evaluation() {
        let mut interp = interp();
        interp.signals.halt();
        let err = interp.do_text("forever [1]").unwrap_err();
        assert!(matches!(err, Error::Halt));
    }

    #[test]
    fn interrupt_hook_may_not_resume_with_value() {
        let mut interp = interp();
        interp.set_breakpoint_hook(Box::new(|_| Ok(Value::integer(1))));
        interp.signals.raise(SignalFlags::INTERRUPT);
        let err = interp.do_text("1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadResume));

        interp.set_breakpoint_hook(Box::new(|_| Ok(Value::VOID)));
        interp.signals.raise(SignalFlags::INTERRUPT);
        assert_eq!(interp.do_text("2").unwrap(), Value::integer(2));
    }

    #[test]
    fn recycle_signal_runs_collector_between_steps() {
        let mut interp = interp();
        let before = interp.stats.recycles;
        interp.signals.raise(SignalFlags::RECYCLE);
        interp.do_text("x: [1 2 3] length-of x").unwrap();
        assert_eq!(interp.stats.recycles, before + 1);
    }

    #[test]
    fn apply_rejects_extra_values() {
        let mut interp = interp();
        let negate = interp.lib_value("negate").unwrap();
        let ok = interp.apply_values(negate, &[Value::integer(2)]).unwrap();
        assert_eq!(ok, Evaluated::Value(Value::integer(-2)));
        let err = interp
            .apply_values(negate, &[Value::integer(2), Value::integer(3)])
            .unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ApplyTooMany));
    }
}
