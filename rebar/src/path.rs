//! PATH! evaluation: `a/b/c`, `:a/b`, `a/b: value`.
//!
//! The head is looked up (or evaluated, for a group), then each step picks
//! from the value so far. Once a function is reached the remaining steps
//! name its refinements. Steps that are groups or get-words are evaluated
//! to produce the selector.

use crate::error::{Error, ErrorId, Result};
use crate::eval::Evaluated;
use crate::feed::Feed;
use crate::interp::Interp;
use crate::series::SeriesId;
use crate::value::{Kind, Payload, Specifier, Value};
use crate::Symbol;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathMode {
    /// PATH!: a function at the end is called
    Call,
    /// GET-PATH!: the value at the end is returned as-is
    Get,
    /// SET-PATH!: the last step is written
    Set(Value),
}

impl Interp {
    pub(crate) fn eval_path(
        &mut self,
        path: Value,
        specifier: Specifier,
        mode: PathMode,
        feed: Option<&mut dyn Feed>,
    ) -> Result<Evaluated> {
        let series = path
            .as_series()
            .ok_or_else(|| Error::arg(ErrorId::InvalidArg, path))?;
        let specifier = series.specifier.or(specifier);
        let elements = self.heap.array(series.series)?.get(series.index..).unwrap_or(&[]).to_vec();
        let Some((&head, steps)) = elements.split_first() else {
            return Err(Error::arg(ErrorId::BadPathType, path));
        };

        let depth = self.guard_depth();
        let result = self.walk_path(path, head, steps, specifier, mode, feed);
        self.drop_guards(depth);
        result
    }

    fn walk_path(
        &mut self,
        path: Value,
        head: Value,
        steps: &[Value],
        specifier: Specifier,
        mode: PathMode,
        feed: Option<&mut dyn Feed>,
    ) -> Result<Evaluated> {
        let mut label = head.symbol();
        let mut current = match head.kind {
            Kind::Word | Kind::GetWord => {
                let value = self.get_var(head, specifier)?;
                if value.is_void() && !steps.is_empty() {
                    return Err(Error::arg(ErrorId::NoValue, head));
                }
                value
            }
            _ => match self.path_selector(head, specifier)? {
                Evaluated::Value(value) => value,
                other => return Ok(other),
            },
        };
        self.push_guard(current);

        for (offset, &step) in steps.iter().enumerate() {
            if current.is_function() {
                let refinements = refinement_symbols(&steps[offset..])?;
                return self.finish_function(current, label, &refinements, mode, feed);
            }

            let selector = match self.path_selector(step, specifier)? {
                Evaluated::Value(value) => value,
                other => return Ok(other),
            };
            if offset + 1 == steps.len()
                && let PathMode::Set(value) = mode
            {
                self.poke_path(current, selector, value, path)?;
                return Ok(Evaluated::Value(value));
            }
            current = self.pick_path(current, selector, path)?;
            if step.kind == Kind::Word {
                label = step.symbol();
            }
            self.push_guard(current);
        }

        match mode {
            PathMode::Set(_) => Err(Error::arg(ErrorId::BadPathSet, path)),
            PathMode::Call if current.is_function() => self.finish_function(current, label, &[], mode, feed),
            PathMode::Call if current.is_void() => Err(Error::arg(ErrorId::NoValue, path)),
            _ => Ok(Evaluated::Value(current)),
        }
    }

    fn finish_function(
        &mut self,
        function: Value,
        label: Option<Symbol>,
        refinements: &[Symbol],
        mode: PathMode,
        feed: Option<&mut dyn Feed>,
    ) -> Result<Evaluated> {
        match (mode, feed) {
            (PathMode::Call, Some(feed)) => {
                let function = function.without_flag(crate::value::CellFlags::ENFIXED);
                self.call_function(function, label, feed, None, refinements)
            }
            (PathMode::Get, _) if refinements.is_empty() => Ok(Evaluated::Value(function)),
            (PathMode::Get, _) => {
                let settings: Vec<(Symbol, Value)> = refinements.iter().map(|&sym| (sym, Value::TRUE)).collect();
                let specialized = self.make_specialization(function, &settings)?;
                Ok(Evaluated::Value(specialized))
            }
            _ => Err(Error::arg(ErrorId::BadPathSet, function)),
        }
    }

    /// Selector for one step: groups and get-words are evaluated, other
    /// cells are taken literally.
    fn path_selector(&mut self, step: Value, specifier: Specifier) -> Result<Evaluated> {
        match step.kind {
            Kind::Group => {
                let group = self.derelativize(step, specifier);
                match self.do_block(group)? {
                    Evaluated::End => Ok(Evaluated::Value(Value::VOID)),
                    other => Ok(other),
                }
            }
            Kind::GetWord => Ok(Evaluated::Value(self.get_var(step, specifier)?)),
            _ => Ok(Evaluated::Value(self.derelativize(step, specifier))),
        }
    }

    /// Value reached by stepping from `current` with `selector`. Stepping
    /// past the end of a series is an `out-of-range` error.
    pub fn pick_path(&mut self, current: Value, selector: Value, path: Value) -> Result<Value> {
        match self.select_step(current, selector, path)? {
            Some(value) => Ok(value),
            None if selector.kind.is_any_word() => {
                Err(Error::with_args(ErrorId::BadPathPick, vec![selector, path]))
            }
            None => Err(Error::arg(ErrorId::OutOfRange, selector)),
        }
    }

    /// PICK: like a path step, but a position past the end gives blank.
    pub fn pick_or_blank(&mut self, current: Value, selector: Value) -> Result<Value> {
        Ok(self.select_step(current, selector, current)?.unwrap_or(Value::BLANK))
    }

    /// `None` when `selector` names a position or key `current` lacks.
    fn select_step(&mut self, current: Value, selector: Value, path: Value) -> Result<Option<Value>> {
        let bad_pick = || Error::with_args(ErrorId::BadPathPick, vec![selector, path]);
        match current.kind {
            kind if kind.is_any_context() => {
                let varlist = current.as_context().ok_or_else(bad_pick)?;
                let sym = selector.symbol().filter(|_| selector.kind.is_any_word()).ok_or_else(bad_pick)?;
                let index = self.find_in_context(varlist, sym).ok_or_else(bad_pick)?;
                self.context_var(varlist, index).map(Some)
            }
            kind if kind.is_any_array() => {
                let series = current.as_series().ok_or_else(bad_pick)?;
                if let Some(n) = selector.as_integer() {
                    return Ok(match position(series.index, n) {
                        Some(at) if at < self.heap.len(series.series) => {
                            let cell = self.heap.at(series.series, at)?;
                            Some(self.derelativize(cell, series.specifier))
                        }
                        _ => None,
                    });
                }
                if selector.kind.is_any_word() {
                    let sym = selector.symbol().ok_or_else(bad_pick)?;
                    let cells = self.heap.array(series.series)?;
                    let found = cells
                        .iter()
                        .enumerate()
                        .skip(series.index)
                        .find(|(_, cell)| {
                            cell.kind.is_any_word() && cell.symbol().is_some_and(|s| self.symbols.same(s, sym))
                        })
                        .map(|(at, _)| at + 1);
                    return Ok(match found {
                        Some(at) if at < cells.len() => {
                            let cell = cells[at];
                            Some(self.derelativize(cell, series.specifier))
                        }
                        _ => None,
                    });
                }
                Err(bad_pick())
            }
            kind if kind.is_any_string() => {
                let series = current.as_series().ok_or_else(bad_pick)?;
                let n = selector.as_integer().ok_or_else(bad_pick)?;
                let chars = self.heap.chars(series.series)?;
                Ok(position(series.index, n)
                    .and_then(|at| chars.get(at))
                    .map(|&c| Value::char(c)))
            }
            Kind::Binary => {
                let series = current.as_series().ok_or_else(bad_pick)?;
                let n = selector.as_integer().ok_or_else(bad_pick)?;
                let bytes = self.heap.bytes(series.series)?;
                Ok(position(series.index, n)
                    .and_then(|at| bytes.get(at))
                    .map(|&b| Value::integer(i64::from(b))))
            }
            Kind::Pair => {
                let Payload::Pair(x, y) = current.payload else {
                    return Err(bad_pick());
                };
                match self.selector_name(selector).as_deref() {
                    Some("x") => Ok(Some(Value::decimal(x))),
                    Some("y") => Ok(Some(Value::decimal(y))),
                    _ => match selector.as_integer() {
                        Some(1) => Ok(Some(Value::decimal(x))),
                        Some(2) => Ok(Some(Value::decimal(y))),
                        _ => Err(bad_pick()),
                    },
                }
            }
            Kind::Tuple => {
                let Payload::Tuple(tuple) = current.payload else {
                    return Err(bad_pick());
                };
                let n = selector.as_integer().ok_or_else(bad_pick)?;
                Ok(position(0, n)
                    .and_then(|at| tuple.parts().get(at))
                    .map(|&b| Value::integer(i64::from(b))))
            }
            Kind::Date => {
                let Payload::Date(date) = current.payload else {
                    return Err(bad_pick());
                };
                match self.selector_name(selector).as_deref() {
                    Some("year") => Ok(Some(Value::integer(i64::from(date.year)))),
                    Some("month") => Ok(Some(Value::integer(i64::from(date.month)))),
                    Some("day") => Ok(Some(Value::integer(i64::from(date.day)))),
                    _ => Err(bad_pick()),
                }
            }
            Kind::Time => {
                let Payload::Time(nanos) = current.payload else {
                    return Err(bad_pick());
                };
                let seconds = nanos / 1_000_000_000;
                match self.selector_name(selector).as_deref() {
                    Some("hour") => Ok(Some(Value::integer(seconds / 3600))),
                    Some("minute") => Ok(Some(Value::integer(seconds / 60 % 60))),
                    Some("second") => Ok(Some(Value::integer(seconds % 60))),
                    _ => Err(bad_pick()),
                }
            }
            _ => Err(Error::with_args(ErrorId::BadPathType, vec![path, Value::datatype(current.kind)])),
        }
    }

    /// Writes `value` at the step `selector` of `current`.
    pub fn poke_path(&mut self, current: Value, selector: Value, value: Value, path: Value) -> Result<()> {
        let bad_set = || Error::with_args(ErrorId::BadPathSet, vec![selector, path]);
        match current.kind {
            kind if kind.is_any_context() => {
                let varlist = current.as_context().ok_or_else(bad_set)?;
                let sym = selector.symbol().filter(|_| selector.kind.is_any_word()).ok_or_else(bad_set)?;
                let index = self.find_in_context(varlist, sym).ok_or_else(bad_set)?;
                self.set_context_var(varlist, index, value)
            }
            kind if kind.is_any_array() => {
                let series = current.as_series().ok_or_else(bad_set)?;
                let at = match selector.as_integer() {
                    Some(n) => position(series.index, n),
                    None if selector.kind.is_any_word() => {
                        let sym = selector.symbol().ok_or_else(bad_set)?;
                        self.heap
                            .array(series.series)?
                            .iter()
                            .enumerate()
                            .skip(series.index)
                            .find(|(_, cell)| {
                                cell.kind.is_any_word()
                                    && cell.symbol().is_some_and(|s| self.symbols.same(s, sym))
                            })
                            .map(|(at, _)| at + 1)
                    }
                    None => return Err(bad_set()),
                };
                match at {
                    Some(at) if at < self.heap.len(series.series) => self.heap.set_at(series.series, at, value),
                    _ => Err(Error::arg(ErrorId::OutOfRange, selector)),
                }
            }
            kind if kind.is_any_string() => {
                let series = current.as_series().ok_or_else(bad_set)?;
                let c = value.as_char().ok_or_else(|| Error::arg(ErrorId::InvalidArg, value))?;
                let at = self.checked_position(series.series, series.index, selector)?;
                self.heap.set_char(series.series, at, c)
            }
            Kind::Binary => {
                let series = current.as_series().ok_or_else(bad_set)?;
                let byte = value
                    .as_integer()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| Error::arg(ErrorId::OutOfRange, value))?;
                let at = self.checked_position(series.series, series.index, selector)?;
                self.heap.set_byte(series.series, at, byte)
            }
            _ => Err(bad_set()),
        }
    }

    fn checked_position(&self, series: SeriesId, index: usize, selector: Value) -> Result<usize> {
        let n = selector
            .as_integer()
            .ok_or_else(|| Error::arg(ErrorId::InvalidArg, selector))?;
        match position(index, n) {
            Some(at) if at < self.heap.len(series) => Ok(at),
            _ => Err(Error::arg(ErrorId::OutOfRange, selector)),
        }
    }

    fn selector_name(&self, selector: Value) -> Option<String> {
        if !selector.kind.is_any_word() {
            return None;
        }
        selector
            .symbol()
            .map(|sym| self.symbols.spelling(sym).to_ascii_lowercase())
    }
}

/// 0-based position of the 1-based pick `n` from `index`.
fn position(index: usize, n: i64) -> Option<usize> {
    if n < 1 {
        return None;
    }
    index.checked_add(usize::try_from(n - 1).ok()?)
}

fn refinement_symbols(steps: &[Value]) -> Result<Vec<Symbol>> {
    steps
        .iter()
        .map(|step| match step.kind {
            Kind::Word => step.symbol().ok_or_else(|| Error::arg(ErrorId::BadRefine, *step)),
            _ => Err(Error::arg(ErrorId::BadRefine, *step)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    #[test]
    fn picks_from_blocks_and_objects() {
        let mut interp = interp();
        assert_eq!(interp.do_text("b: [10 20 30] b/2").unwrap(), Value::integer(20));
        let err = interp.do_text("b/9").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::OutOfRange));
        let err = interp.do_text("b/0").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::OutOfRange));
        assert_eq!(interp.do_text("pick b 9").unwrap(), Value::BLANK);
        let err = interp.do_text(r#"s: "ab" s/3"#).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::OutOfRange));
        assert_eq!(interp.do_text("b: [x 1 y 2] b/y").unwrap(), Value::integer(2));
        let err = interp.do_text("b/z").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadPathPick));
        assert_eq!(interp.do_text("pick b 'z").unwrap(), Value::BLANK);
        assert_eq!(
            interp.do_text("o: make object! [a: make object! [b: 7]] o/a/b").unwrap(),
            Value::integer(7)
        );
    }

    #[test]
    fn groups_and_get_words_select() {
        let mut interp = interp();
        assert_eq!(interp.do_text("b: [10 20 30] i: 3 b/:i").unwrap(), Value::integer(30));
        assert_eq!(interp.do_text("b/(1 + 1)").unwrap(), Value::integer(20));
    }

    #[test]
    fn set_path_writes_through() {
        let mut interp = interp();
        assert!(interp.do_text("b: [1 2 3] b/2: 99 b").is_ok());
        assert_eq!(interp.do_text("b/2").unwrap(), Value::integer(99));
        assert_eq!(interp.do_text("o: make object! [n: 1] o/n: 5 o/n").unwrap(), Value::integer(5));
        let err = interp.do_text("o/missing: 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadPathSet));
    }

    #[test]
    fn refinements_after_function() {
        let mut interp = interp();
        let value = interp.do_text("b: copy [1] append/only b [2 3] length-of b").unwrap();
        assert_eq!(value, Value::integer(2));
        let err = interp.do_text("append/bogus [] 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadRefine));
    }

    #[test]
    fn get_path_with_refinement_specializes() {
        let mut interp = interp();
        let value = interp
            .do_text("app: :append/only b: copy [] app b [1 2] length-of b")
            .unwrap();
        assert_eq!(value, Value::integer(1));
    }

    #[test]
    fn string_and_scalar_steps() {
        let mut interp = interp();
        assert_eq!(interp.do_text(r#"s: "abc" s/2"#).unwrap(), Value::char('b'));
        assert_eq!(interp.do_text("p: 3x4 p/y").unwrap(), Value::decimal(4.0));
        assert_eq!(interp.do_text("d: 2024-02-29 d/month").unwrap(), Value::integer(2));
    }
}
