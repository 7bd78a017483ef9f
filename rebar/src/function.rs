//! Functions: paramlist + body + dispatcher.
//!
//! A paramlist is keylist-shaped: `[archetype k1 .. kN]`, where the
//! archetype is the canonical FUNCTION! value for the paramlist itself. Its
//! link carries the [`FunctionInfo`]. Frames of a call use the paramlist as
//! their keylist, so argument `n` lives in frame slot `n`.

use crate::error::{Error, ErrorId, Result};
use crate::interp::{Frame, Interp};
use crate::natives::series::Verb;
use crate::series::{Link, SeriesFlags, SeriesId};
use crate::symbol::SymId;
use crate::value::{Binding, CellFlags, FunctionRef, Key, Kind, ParamClass, ParamFlags, Payload, TypeBits, Value};
use crate::Symbol;

pub type NativeFn = fn(&mut Interp, &Frame) -> Result<Bounce>;

/// How a function's body is run once its frame is fulfilled.
#[derive(Debug, Clone, Copy)]
pub enum Dispatcher {
    /// walk the body block with the frame as specifier
    Interpreted,
    Native(NativeFn),
    /// per-kind handler chosen by the first argument
    Action(Verb),
    Adapter { prelude: SeriesId, adaptee: Value },
    Chainer { pipeline: SeriesId },
    Hijacker { hijacker: Value },
    Specializer { exemplar: SeriesId, specializee: Value },
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionInfo {
    pub dispatcher: Dispatcher,
    pub body: Option<SeriesId>,
    /// paramlist whose frame layout this function shares
    pub underlying: SeriesId,
    /// copy of the spec block, for reflection
    pub spec: Option<SeriesId>,
}

impl FunctionInfo {
    /// Series this info keeps alive, for the collector.
    pub fn referents(&self) -> impl Iterator<Item = SeriesId> {
        let (a, b) = match self.dispatcher {
            Dispatcher::Adapter { prelude, adaptee } => {
                (Some(prelude), adaptee.referenced_series())
            }
            Dispatcher::Chainer { pipeline } => (Some(pipeline), None),
            Dispatcher::Hijacker { hijacker } => (hijacker.referenced_series(), None),
            Dispatcher::Specializer {
                exemplar,
                specializee,
            } => (Some(exemplar), specializee.referenced_series()),
            Dispatcher::Interpreted | Dispatcher::Native(_) | Dispatcher::Action(_) => (None, None),
        };
        [self.body, self.spec, Some(self.underlying), a, b]
            .into_iter()
            .flatten()
    }
}

/// What a dispatcher asks the evaluator to do next.
#[derive(Debug, Clone, Copy)]
pub enum Bounce {
    Out(Value),
    Thrown { label: Value, arg: Value },
    /// nothing was written; the call yields void
    Unwritten,
    /// run this function's dispatcher on the same frame
    Redo(Value),
    /// evaluate this value as if it were next in the feed
    Reevaluate(Value),
}

/// Which definitional extras a spec gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Native,
    /// FUNC: adds a definitional RETURN
    Func,
}

struct ParamBuilder {
    keys: Vec<Key>,
}

impl Interp {
    /// Parses a spec block into keys.
    pub fn parse_spec(&self, spec: SeriesId, generator: Generator) -> Result<Vec<Key>> {
        let bad = |value: Value| Error::arg(ErrorId::BadFuncDef, value);
        let mut builder = ParamBuilder { keys: Vec::new() };
        let mut locals = false;
        let cells = self.heap.array(spec)?.to_vec();

        for cell in cells {
            match cell.kind {
                Kind::String => {}
                Kind::Block => {
                    let last = builder.keys.last_mut().ok_or_else(|| bad(cell))?;
                    let types = cell.as_series().expect("blocks carry series").series;
                    self.apply_type_block(last, types)?;
                }
                Kind::Tag => {
                    let tag = self.heap.string(cell.as_series().expect("tags carry series").series)?;
                    match tag.as_str() {
                        "local" => locals = true,
                        _ => return Err(bad(cell)),
                    }
                }
                Kind::Word | Kind::GetWord | Kind::LitWord | Kind::Issue | Kind::Refinement | Kind::SetWord => {
                    let spelling = cell.symbol().expect("word kinds carry symbols");
                    let class = match cell.kind {
                        _ if locals => ParamClass::Local,
                        Kind::Word => ParamClass::Normal,
                        Kind::Issue => ParamClass::Tight,
                        Kind::GetWord => ParamClass::HardQuote,
                        Kind::LitWord => ParamClass::SoftQuote,
                        Kind::Refinement => ParamClass::Refinement,
                        _ => ParamClass::Local,
                    };
                    if builder
                        .keys
                        .iter()
                        .any(|key| key.spelling.is_some_and(|s| self.symbols.same(s, spelling)))
                    {
                        return Err(bad(cell));
                    }
                    let bits = match class {
                        ParamClass::Refinement => TypeBits::of(Kind::Logic).with(Kind::Blank),
                        _ => TypeBits::ANY_VALUE,
                    };
                    let mut key = Key::new(spelling, class, bits);
                    if class == ParamClass::Local {
                        key.flags.insert(ParamFlags::OPTIONAL);
                    }
                    builder.keys.push(key);
                }
                _ => return Err(bad(cell)),
            }
        }

        if generator == Generator::Func {
            let has_return = builder
                .keys
                .iter()
                .any(|key| key.spelling.is_some_and(|s| self.symbols.is(s, SymId::Return)));
            if !has_return {
                let mut key = Key::new(SymId::Return.symbol(), ParamClass::Return, TypeBits::ANY_VALUE);
                key.flags.insert(ParamFlags::HIDDEN | ParamFlags::OPTIONAL);
                builder.keys.push(key);
            }
        }
        Ok(builder.keys)
    }

    fn apply_type_block(&self, key: &mut Key, types: SeriesId) -> Result<()> {
        if matches!(key.class, ParamClass::Refinement | ParamClass::Local) {
            // refinement argument types are not enforced on the refinement itself
            return Ok(());
        }
        let mut bits = TypeBits::NONE;
        for cell in self.heap.array(types)?.iter() {
            match cell.kind {
                Kind::Word => {
                    let sym = cell.symbol().expect("words carry symbols");
                    let name = self.symbols.spelling(sym);
                    if let Some(kind) = Kind::from_name(name) {
                        bits = bits.with(kind);
                    } else if let Some(set) = TypeBits::from_typeset_name(name) {
                        bits = bits.union(set);
                    } else if name == "..." {
                        key.flags.insert(ParamFlags::VARIADIC);
                    } else {
                        return Err(Error::arg(ErrorId::BadFuncDef, *cell));
                    }
                }
                Kind::Tag => {
                    let tag = self.heap.string(cell.as_series().expect("tags carry series").series)?;
                    match tag.as_str() {
                        "opt" => key.flags.insert(ParamFlags::OPTIONAL),
                        "end" => key.flags.insert(ParamFlags::ENDABLE),
                        "..." => key.flags.insert(ParamFlags::VARIADIC),
                        _ => return Err(Error::arg(ErrorId::BadFuncDef, *cell)),
                    }
                }
                Kind::Datatype => {
                    bits = bits.with(cell.as_datatype().expect("datatypes carry kinds"));
                }
                Kind::Typeset => {
                    bits = bits.union(cell.as_key().expect("typesets carry keys").bits);
                }
                _ => return Err(Error::arg(ErrorId::BadFuncDef, *cell)),
            }
        }
        if !bits.is_empty() {
            key.bits = bits;
        } else if key.flags.contains(ParamFlags::OPTIONAL) {
            key.bits = TypeBits::ANY_VALUE;
        }
        Ok(())
    }

    /// Allocates a paramlist over `keys` and attaches `info`. The
    /// `underlying` field of `info` is replaced by the paramlist itself when
    /// `None` is given.
    pub fn make_paramlist(&mut self, keys: &[Key], dispatcher: Dispatcher, underlying: Option<SeriesId>) -> SeriesId {
        let mut cells = Vec::with_capacity(keys.len() + 1);
        cells.push(Value::BLANK);
        cells.extend(keys.iter().map(|&key| Value::key(key)));
        let paramlist = self.heap.make_array(&cells);
        self.heap
            .set_flags(paramlist, SeriesFlags::PARAMLIST | SeriesFlags::KEYLIST);
        self.heap
            .poke_unchecked(paramlist, 0, Value::function(paramlist, None))
            .expect("paramlist has an archetype slot");
        self.heap.set_link(
            paramlist,
            Link::Function(FunctionInfo {
                dispatcher,
                body: None,
                underlying: underlying.unwrap_or(paramlist),
                spec: None,
            }),
        );
        paramlist
    }

    pub fn function_info(&self, paramlist: SeriesId) -> Result<FunctionInfo> {
        match self.heap.link(paramlist) {
            Link::Function(info) => Ok(*info),
            _ => Err(Error::raised(ErrorId::Misc)),
        }
    }

    pub fn set_function_info(&mut self, paramlist: SeriesId, info: FunctionInfo) {
        self.heap.set_link(paramlist, Link::Function(info));
    }

    /// Builds a native from spec text.
    pub fn make_native(&mut self, spec: &str, dispatcher: Dispatcher) -> Result<Value> {
        let spec_block = crate::scan::load(self, spec)?;
        let keys = self.parse_spec(spec_block, Generator::Native)?;
        let paramlist = self.make_paramlist(&keys, dispatcher, None);
        let mut info = self.function_info(paramlist)?;
        info.spec = Some(spec_block);
        self.set_function_info(paramlist, info);
        Ok(Value::function(paramlist, None))
    }

    /// FUNC: copies and relativizes the body against the new paramlist.
    pub fn make_interpreted(&mut self, spec: SeriesId, body: SeriesId, extra_locals: &[Symbol]) -> Result<Value> {
        let mut keys = self.parse_spec(spec, Generator::Func)?;
        for &sym in extra_locals {
            let present = keys
                .iter()
                .any(|key| key.spelling.is_some_and(|s| self.symbols.same(s, sym)));
            if !present {
                let mut key = Key::new(sym, ParamClass::Local, TypeBits::ANY_VALUE);
                key.flags.insert(ParamFlags::OPTIONAL);
                keys.push(key);
            }
        }
        let paramlist = self.make_paramlist(&keys, Dispatcher::Interpreted, None);
        let body_copy = self.heap.copy_array(body, 0, true)?;
        self.bind_relative(body_copy, paramlist, true)?;
        let spec_copy = self.heap.copy_array(spec, 0, true)?;
        self.set_function_info(
            paramlist,
            FunctionInfo {
                dispatcher: Dispatcher::Interpreted,
                body: Some(body_copy),
                underlying: paramlist,
                spec: Some(spec_copy),
            },
        );
        Ok(Value::function(paramlist, None))
    }

    /// New paramlist with the same keys as `original`, sharing its frame
    /// layout, dispatched by `dispatcher`.
    pub fn derive_function(&mut self, original: SeriesId, dispatcher: Dispatcher) -> Result<SeriesId> {
        let keys = self.keys(original)?;
        let underlying = self.underlying(original);
        let paramlist = self.make_paramlist(&keys, dispatcher, Some(underlying));
        let original_info = self.function_info(original)?;
        let mut info = self.function_info(paramlist)?;
        info.spec = original_info.spec;
        self.set_function_info(paramlist, info);
        Ok(paramlist)
    }

    /// Copy of an interpreted function whose body refers to the context
    /// `to` wherever the original referred to `from`. Any other value comes
    /// back unchanged.
    pub fn rebind_function(&mut self, function: Value, from: SeriesId, to: SeriesId) -> Result<Value> {
        let Payload::Function(reference) = function.payload else {
            return Ok(function);
        };
        let info = self.function_info(reference.paramlist)?;
        let (Dispatcher::Interpreted, Some(body)) = (info.dispatcher, info.body) else {
            return Ok(function);
        };
        let keys = self.keys(reference.paramlist)?;
        let paramlist = self.make_paramlist(&keys, Dispatcher::Interpreted, None);
        let body_copy = self.heap.copy_array(body, 0, true)?;
        self.retarget_words(
            body_copy,
            &[
                (Binding::Specific(from), Binding::Specific(to)),
                (Binding::Relative(reference.paramlist), Binding::Relative(paramlist)),
            ],
        )?;
        self.set_function_info(
            paramlist,
            FunctionInfo {
                dispatcher: Dispatcher::Interpreted,
                body: Some(body_copy),
                underlying: paramlist,
                spec: info.spec,
            },
        );
        Ok(Value {
            payload: Payload::Function(FunctionRef {
                paramlist,
                ..reference
            }),
            ..function
        })
    }

    /// Number of arguments a call site supplies (refinements excluded).
    pub fn arity(&self, paramlist: SeriesId) -> Result<usize> {
        Ok(self
            .keys(paramlist)?
            .iter()
            .take_while(|key| key.class != ParamClass::Refinement)
            .filter(|key| {
                !matches!(key.class, ParamClass::Local | ParamClass::Return)
                    && !key.flags.contains(ParamFlags::SPECIALIZED)
            })
            .count())
    }
}

/// Copy of a function value that takes its first argument from the left.
pub fn enfixed(function: Value) -> Value {
    function.with_flag(CellFlags::ENFIXED)
}

/// Paramlist of a function value.
pub fn paramlist_of(function: Value) -> Result<SeriesId> {
    match function.payload {
        Payload::Function(f) => Ok(f.paramlist),
        _ => Err(Error::arg(ErrorId::InvalidArg, function)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::scan;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    #[test]
    fn spec_forms_map_to_classes() {
        let mut interp = interp();
        let spec = scan::load(&mut interp, "a #b :c 'd /e f <local> g").unwrap();
        let keys = interp.parse_spec(spec, Generator::Native).unwrap();
        let classes: Vec<ParamClass> = keys.iter().map(|k| k.class).collect();
        assert_eq!(
            classes,
            vec![
                ParamClass::Normal,
                ParamClass::Tight,
                ParamClass::HardQuote,
                ParamClass::SoftQuote,
                ParamClass::Refinement,
                ParamClass::Normal,
                ParamClass::Local,
            ]
        );
    }

    #[test]
    fn type_blocks_and_tags() {
        let mut interp = interp();
        let spec = scan::load(&mut interp, "x [integer! decimal!] y [<opt> any-series!] z [<...>] w [<end>]").unwrap();
        let keys = interp.parse_spec(spec, Generator::Native).unwrap();
        assert!(keys[0].bits.contains(Kind::Integer));
        assert!(!keys[0].bits.contains(Kind::String));
        assert!(keys[1].flags.contains(ParamFlags::OPTIONAL));
        assert!(keys[1].bits.contains(Kind::Block));
        assert!(keys[2].flags.contains(ParamFlags::VARIADIC));
        assert!(keys[3].flags.contains(ParamFlags::ENDABLE));
    }

    #[test]
    fn func_gets_hidden_return() {
        let mut interp = interp();
        let spec = scan::load(&mut interp, "x").unwrap();
        let keys = interp.parse_spec(spec, Generator::Func).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].class, ParamClass::Return);
        assert!(keys[1].is_hidden());
    }

    #[test]
    fn duplicate_parameters_rejected() {
        let mut interp = interp();
        let spec = scan::load(&mut interp, "x X").unwrap();
        let err = interp.parse_spec(spec, Generator::Native).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadFuncDef));
    }

    #[test]
    fn arity_skips_refinements_and_locals() {
        let mut interp = interp();
        let spec = scan::load(&mut interp, "a b /only c <local> d").unwrap();
        let keys = interp.parse_spec(spec, Generator::Func).unwrap();
        let paramlist = interp.make_paramlist(&keys, Dispatcher::Interpreted, None);
        assert_eq!(interp.arity(paramlist).unwrap(), 2);
    }
}
