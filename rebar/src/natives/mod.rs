use crate::error::{Error, ErrorId, Result};
use crate::function::{Bounce, Dispatcher, NativeFn};
use crate::interp::Interp;
use crate::series::SeriesId;
use crate::value::{Kind, SeriesRef, Value};
use crate::Symbol;

use self::series::Verb;

pub mod binary;
pub mod control;
pub mod data;
pub mod function;
pub mod math;
pub mod port;
pub mod series;

/// Runs a block argument, handing any throw straight back to the caller.
macro_rules! evaluate {
    ($interp:expr, $block:expr) => {
        match $interp.do_block($block)? {
            $crate::eval::Evaluated::Value(value) => value,
            $crate::eval::Evaluated::End => $crate::value::Value::VOID,
            $crate::eval::Evaluated::Thrown { label, arg } => {
                return Ok($crate::function::Bounce::Thrown { label, arg });
            }
        }
    };
}
pub(crate) use evaluate;

/// One boot-time native: its name in `lib`, its spec, and what runs it.
#[derive(Clone, Copy)]
pub struct NativeDesc {
    pub name: &'static str,
    pub spec: &'static str,
    pub dispatcher: Dispatcher,
    pub enfix: bool,
}

impl NativeDesc {
    pub const fn new(name: &'static str, spec: &'static str, func: NativeFn) -> Self {
        Self {
            name,
            spec,
            dispatcher: Dispatcher::Native(func),
            enfix: false,
        }
    }

    pub const fn action(name: &'static str, spec: &'static str, verb: Verb) -> Self {
        Self {
            name,
            spec,
            dispatcher: Dispatcher::Action(verb),
            enfix: false,
        }
    }

    pub const fn enfixed(mut self) -> Self {
        self.enfix = true;
        self
    }
}

pub fn default_natives() -> Vec<NativeDesc> {
    vec![
        // ── control ──────────────────────────────────────────────
        NativeDesc::new("do", "value [<opt> any-value!]", control::do_),
        NativeDesc::new("eval", "value [<opt> any-value!]", control::eval),
        NativeDesc::new("if", "condition [<opt> any-value!] branch [block!]", control::if_),
        NativeDesc::new(
            "either",
            "condition [<opt> any-value!] true-branch [block!] false-branch [block!]",
            control::either,
        ),
        NativeDesc::new("unless", "condition [<opt> any-value!] branch [block!]", control::unless),
        NativeDesc::new("case", "cases [block!] /all", control::case),
        NativeDesc::new("while", "condition [block!] body [block!]", control::while_),
        NativeDesc::new("until", "body [block!]", control::until),
        NativeDesc::new("loop", "count [integer! blank!] body [block!]", control::loop_),
        NativeDesc::new("repeat", "'word [word!] count [integer! blank!] body [block!]", control::repeat),
        NativeDesc::new(
            "for-each",
            "'vars [word! block!] data [any-series! any-context! blank!] body [block!]",
            control::for_each,
        ),
        NativeDesc::new("forever", "body [block!]", control::forever),
        NativeDesc::new("break", "/return value [<opt> any-value!]", control::break_),
        NativeDesc::new("continue", "", control::continue_),
        NativeDesc::new("catch", "block [block!] /name names [word! block!]", control::catch),
        NativeDesc::new("throw", "value [<opt> any-value!] /name word [word!]", control::throw),
        NativeDesc::new("trap", "block [block!] /with handler [block! function!]", control::trap),
        NativeDesc::new("attempt", "block [block!]", control::attempt),
        NativeDesc::new("fail", "reason [error! string! block!]", control::fail),
        NativeDesc::new("return", "value [<opt> <end> any-value!]", control::return_),
        NativeDesc::new("halt", "", control::halt),
        NativeDesc::new("quit", "/return value [<opt> any-value!]", control::quit),
        NativeDesc::new("all", "block [block!]", control::all),
        NativeDesc::new("any", "block [block!]", control::any),
        NativeDesc::new("not", "value [<opt> any-value!]", control::not),
        NativeDesc::new("and", "left [<opt> any-value!] right [<opt> any-value!]", control::and).enfixed(),
        NativeDesc::new("or", "left [<opt> any-value!] right [<opt> any-value!]", control::or).enfixed(),
        NativeDesc::new("comment", ":discarded [any-value!]", control::comment),
        NativeDesc::new("quote", ":value [any-value!]", control::quote),
        // ── math ─────────────────────────────────────────────────
        NativeDesc::new("add", "value1 [any-scalar!] #value2 [any-scalar!]", math::add),
        NativeDesc::new("subtract", "value1 [any-scalar!] #value2 [any-scalar!]", math::subtract),
        NativeDesc::new("multiply", "value1 [any-scalar!] #value2 [any-scalar!]", math::multiply),
        NativeDesc::new("divide", "value1 [any-scalar!] #value2 [any-scalar!]", math::divide),
        NativeDesc::new("remainder", "value1 [any-number!] value2 [any-number!]", math::remainder),
        NativeDesc::new("negate", "number [any-number! pair! time!]", math::negate),
        NativeDesc::new("abs", "number [any-number! pair! time!]", math::abs),
        NativeDesc::new("min", "value1 [any-scalar! any-string!] value2 [any-scalar! any-string!]", math::min),
        NativeDesc::new("max", "value1 [any-scalar! any-string!] value2 [any-scalar! any-string!]", math::max),
        NativeDesc::new("equal?", "value1 [<opt> any-value!] #value2 [<opt> any-value!]", math::equal_q),
        NativeDesc::new("not-equal?", "value1 [<opt> any-value!] #value2 [<opt> any-value!]", math::not_equal_q),
        NativeDesc::new(
            "strict-equal?",
            "value1 [<opt> any-value!] #value2 [<opt> any-value!]",
            math::strict_equal_q,
        ),
        NativeDesc::new("same?", "value1 [<opt> any-value!] value2 [<opt> any-value!]", math::same_q),
        NativeDesc::new("lesser?", "value1 [any-value!] #value2 [any-value!]", math::lesser_q),
        NativeDesc::new("greater?", "value1 [any-value!] #value2 [any-value!]", math::greater_q),
        NativeDesc::new("lesser-or-equal?", "value1 [any-value!] #value2 [any-value!]", math::lesser_or_equal_q),
        NativeDesc::new(
            "greater-or-equal?",
            "value1 [any-value!] #value2 [any-value!]",
            math::greater_or_equal_q,
        ),
        NativeDesc::new("zero?", "value [any-scalar!]", math::zero_q),
        NativeDesc::new("even?", "number [integer! char!]", math::even_q),
        NativeDesc::new("odd?", "number [integer! char!]", math::odd_q),
        // ── data ─────────────────────────────────────────────────
        NativeDesc::new("reduce", "value [<opt> any-value!]", data::reduce),
        NativeDesc::new("compose", "value [<opt> any-value!] /deep /only", data::compose),
        NativeDesc::new("make", "type [any-value!] def [<opt> any-value!]", data::make),
        NativeDesc::new("to", "type [datatype!] value [<opt> any-value!]", data::to),
        NativeDesc::new("type-of", "value [<opt> any-value!]", data::type_of),
        NativeDesc::new("object", "spec [block!]", data::object),
        NativeDesc::new("context", "spec [block!]", data::object),
        NativeDesc::new("set", "target [any-word! block!] value [<opt> any-value!]", data::set),
        NativeDesc::new("get", "source [any-word! any-path! any-context!] /any", data::get),
        NativeDesc::new("value?", "value [<opt> any-value!]", data::value_q),
        NativeDesc::new("bind", "words [block! any-word!] target [any-word! any-context!] /copy", data::bind),
        NativeDesc::new("in", "target [any-context!] word [any-word!]", data::in_),
        NativeDesc::new("words-of", "value [any-context! function!]", data::words_of),
        NativeDesc::new("values-of", "value [any-context!]", data::values_of),
        NativeDesc::new("mold", "value [<opt> any-value!] /only", data::mold),
        NativeDesc::new("form", "value [<opt> any-value!]", data::form),
        NativeDesc::new("print", "value [<opt> any-value!]", data::print),
        NativeDesc::new("probe", "value [<opt> any-value!]", data::probe),
        NativeDesc::new(
            "protect",
            "value [any-word! any-series! any-context!] /deep /hide /words",
            data::protect,
        ),
        NativeDesc::new("unprotect", "value [any-word! any-series! any-context!] /deep", data::unprotect),
        NativeDesc::new("lock", "value [any-series! any-context!]", data::lock),
        NativeDesc::new("freeze", "value [any-series! any-context!]", data::freeze),
        NativeDesc::new("frozen?", "value [any-value!]", data::frozen_q),
        NativeDesc::new("locked?", "value [any-value!]", data::locked_q),
        NativeDesc::new("recycle", "/off /on", data::recycle),
        NativeDesc::new("stats", "/profile", data::stats),
        // ── functions ────────────────────────────────────────────
        NativeDesc::new("func", "spec [block!] body [block!]", function::func),
        NativeDesc::new("function", "spec [block!] body [block!]", function::function),
        NativeDesc::new("does", "body [block!]", function::does),
        NativeDesc::new("enfix", "action [function!]", function::enfix),
        NativeDesc::new("adapt", "adaptee [function!] prelude [block!]", function::adapt),
        NativeDesc::new("chain", "pipeline [block!]", function::chain),
        NativeDesc::new("hijack", "victim [function!] hijacker [function!]", function::hijack),
        NativeDesc::new("specialize", "specializee [function!] def [block!]", function::specialize),
        NativeDesc::new("spec-of", "action [function!]", function::spec_of),
        NativeDesc::new("body-of", "action [function!]", function::body_of),
        // ── series actions ───────────────────────────────────────
        NativeDesc::action(
            "append",
            "series [any-series! any-context! port!] value [<opt> any-value!] /part limit [integer!] /only /dup count [integer!]",
            Verb::Append,
        ),
        NativeDesc::action(
            "insert",
            "series [any-series! port!] value [<opt> any-value!] /part limit [integer!] /only /dup count [integer!]",
            Verb::Insert,
        ),
        NativeDesc::action(
            "copy",
            "value [any-series! any-context! port!] /part limit [integer! any-series!] /deep",
            Verb::Copy,
        ),
        NativeDesc::action("length-of", "series [any-series! any-context! port! blank!]", Verb::LengthOf),
        NativeDesc::action(
            "pick",
            "series [any-series! any-context! pair! tuple! date! time!] index [any-value!]",
            Verb::Pick,
        ),
        NativeDesc::action(
            "poke",
            "series [any-series! any-context!] index [any-value!] value [<opt> any-value!]",
            Verb::Poke,
        ),
        NativeDesc::action("first", "series [any-series! pair! tuple!]", Verb::First),
        NativeDesc::action("second", "series [any-series! pair! tuple!]", Verb::Second),
        NativeDesc::action("last", "series [any-series! tuple!]", Verb::Last),
        NativeDesc::action("next", "series [any-series!]", Verb::Next),
        NativeDesc::action("back", "series [any-series!]", Verb::Back),
        NativeDesc::action("head", "series [any-series!]", Verb::Head),
        NativeDesc::action("tail", "series [any-series!]", Verb::Tail),
        NativeDesc::action("skip", "series [any-series!] offset [integer!]", Verb::Skip),
        NativeDesc::action("at", "series [any-series!] index [integer!]", Verb::At),
        NativeDesc::action("index-of", "series [any-series!]", Verb::IndexOf),
        NativeDesc::action("empty?", "series [any-series! any-context! blank!]", Verb::EmptyQ),
        NativeDesc::action("head?", "series [any-series!]", Verb::HeadQ),
        NativeDesc::action("tail?", "series [any-series! varargs!]", Verb::TailQ),
        NativeDesc::action(
            "find",
            "series [any-series! any-context! blank!] value [<opt> any-value!] /only /case /tail",
            Verb::Find,
        ),
        NativeDesc::action(
            "select",
            "series [any-series! any-context! blank!] value [<opt> any-value!] /only /case",
            Verb::Select,
        ),
        NativeDesc::action("clear", "series [any-series!]", Verb::Clear),
        NativeDesc::action("remove", "series [any-series!] /part limit [integer!]", Verb::Remove),
        NativeDesc::action("take", "series [any-series! varargs!] /part limit [integer!] /last", Verb::Take),
        NativeDesc::action("reverse", "series [any-series!]", Verb::Reverse),
        NativeDesc::action("open", "spec [port! file! url! block!] /new /read /write", Verb::Open),
        NativeDesc::action("close", "port [port!]", Verb::Close),
        NativeDesc::action(
            "read",
            "source [port! file! url!] /part limit [integer!] /string",
            Verb::Read,
        ),
        NativeDesc::action(
            "write",
            "destination [port! file! url!] data [binary! string! block!] /append",
            Verb::Write,
        ),
        NativeDesc::action("query", "target [port! file! url!]", Verb::Query),
        // ── binary ───────────────────────────────────────────────
        NativeDesc::new("compress", "data [binary! string!] /gzip /only", binary::compress),
        NativeDesc::new("decompress", "data [binary!] /gzip /only /limit max [integer!]", binary::decompress),
        NativeDesc::new(
            "deflate",
            "data [binary! string!] /envelope format [word!]",
            binary::deflate,
        ),
        NativeDesc::new(
            "inflate",
            "data [binary!] /envelope format [word!] /max bound [integer!]",
            binary::inflate,
        ),
    ]
}

// ── argument helpers ─────────────────────────────────────────────

pub(crate) fn type_error(value: Value) -> Error {
    Error::arg(ErrorId::InvalidType, Value::datatype(value.kind))
}

pub(crate) fn expect_integer(value: Value) -> Result<i64> {
    value.as_integer().ok_or_else(|| type_error(value))
}

pub(crate) fn expect_series(value: Value) -> Result<SeriesRef> {
    value
        .as_series()
        .filter(|_| value.kind.is_any_series())
        .ok_or_else(|| type_error(value))
}

pub(crate) fn expect_context(value: Value) -> Result<SeriesId> {
    value
        .as_context()
        .filter(|_| value.kind.is_any_context())
        .ok_or_else(|| type_error(value))
}

pub(crate) fn expect_word(value: Value) -> Result<Symbol> {
    value
        .symbol()
        .filter(|_| value.kind.is_any_word())
        .ok_or_else(|| type_error(value))
}

/// Count argument as a non-negative length.
pub(crate) fn expect_count(value: Value) -> Result<usize> {
    let n = expect_integer(value)?;
    usize::try_from(n.max(0)).map_err(|_| Error::arg(ErrorId::OutOfRange, value))
}

#[inline]
pub(crate) fn out(value: Value) -> Result<Bounce> {
    Ok(Bounce::Out(value))
}

#[inline]
pub(crate) fn logic(flag: bool) -> Result<Bounce> {
    Ok(Bounce::Out(Value::logic(flag)))
}

/// Text of an ANY-STRING! from its index.
pub(crate) fn text_of(interp: &Interp, value: Value) -> Result<String> {
    let series = expect_series(value)?;
    if !value.kind.is_any_string() {
        return Err(type_error(value));
    }
    Ok(interp
        .heap
        .chars(series.series)?
        .iter()
        .skip(series.index)
        .collect())
}

/// Bytes of a BINARY! from its index, or the UTF-8 of a string.
pub(crate) fn bytes_of(interp: &Interp, value: Value) -> Result<Vec<u8>> {
    match value.kind {
        Kind::Binary => {
            let series = expect_series(value)?;
            Ok(interp
                .heap
                .bytes(series.series)?
                .get(series.index..)
                .unwrap_or_default()
                .to_vec())
        }
        kind if kind.is_any_string() => Ok(text_of(interp, value)?.into_bytes()),
        _ => Err(type_error(value)),
    }
}

/// New STRING!-family value holding `text`.
pub(crate) fn make_text(interp: &mut Interp, kind: Kind, text: &str) -> Value {
    let id = interp.heap.make_string(text);
    Value::series(kind, id, 0)
}

pub(crate) fn make_bytes(interp: &mut Interp, bytes: Vec<u8>) -> Value {
    let id = interp.heap.make_binary(bytes);
    Value::series(Kind::Binary, id, 0)
}
