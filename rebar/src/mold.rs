//! MOLD and FORM: values back to text.
//!
//! Molded text loads back as an equivalent value where the kind allows it.
//! Formed text is for people: strings lose their quotes, blocks their
//! brackets. Arrays and contexts that contain themselves print `...` at the
//! point of re-entry.

use std::fmt::Write as _;

use crate::error::{Error, Raised};
use crate::function::Dispatcher;
use crate::interp::Interp;
use crate::series::SeriesId;
use crate::symbol::SymId;
use crate::value::{CellFlags, Kind, ParamClass, Payload, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Mold,
    Form,
}

struct Molder<'a> {
    interp: &'a Interp,
    out: String,
    /// arrays and varlists currently being printed
    stack: Vec<SeriesId>,
    indent: usize,
}

impl Interp {
    pub fn mold(&self, value: Value) -> String {
        let mut molder = Molder::new(self);
        molder.value(value, Mode::Mold);
        molder.out
    }

    /// Molds a block's contents without the outer brackets.
    pub fn mold_only(&self, value: Value) -> String {
        let mut molder = Molder::new(self);
        match value.as_series() {
            Some(series) if value.kind.is_any_array() => {
                molder.elements(series.series, series.index, Mode::Mold);
            }
            _ => molder.value(value, Mode::Mold),
        }
        molder.out
    }

    pub fn form(&self, value: Value) -> String {
        let mut molder = Molder::new(self);
        molder.value(value, Mode::Form);
        molder.out
    }

    /// Text shown to the user for an error that reached the top level.
    pub fn format_error(&self, err: &Error) -> String {
        match err {
            Error::Raised(raised) => self.format_raised(raised),
            Error::Halt => "** Halted".to_string(),
            Error::Quit(code) => format!("** Quit with status {code}"),
            Error::Panic(message) => format!("** PANIC: {message}"),
        }
    }

    fn format_raised(&self, raised: &Raised) -> String {
        let mut text = format!(
            "** {} error: {}",
            raised.id.category().title(),
            self.error_message(raised)
        );
        if let Some(label) = raised.label {
            let _ = write!(text, "\n** Where: {}", self.symbols.spelling(label));
        }
        if let Some(near) = self.near_text(raised.near) {
            let _ = write!(text, "\n** Near: {near}");
        }
        text
    }

    /// The error's message with its arguments substituted.
    pub fn error_message(&self, raised: &Raised) -> String {
        let (template, args) = match raised.context {
            Some(varlist) if self.heap.is_live(varlist) => {
                let field = |sym: SymId| {
                    self.find_in_context(varlist, sym.symbol())
                        .and_then(|index| self.context_var(varlist, index).ok())
                        .unwrap_or(Value::VOID)
                };
                let message = field(SymId::Message);
                let template = if message.is_void() || message.is_blank() {
                    raised.id.template().to_string()
                } else {
                    self.form(message)
                };
                (template, vec![field(SymId::Arg1), field(SymId::Arg2), field(SymId::Arg3)])
            }
            _ => {
                let template = raised
                    .message
                    .clone()
                    .unwrap_or_else(|| raised.id.template().to_string());
                (template, raised.args.clone())
            }
        };
        let mut message = template;
        for (n, arg) in args.iter().enumerate() {
            let placeholder = format!(":arg{}", n + 1);
            if message.contains(&placeholder) {
                let text = if arg.kind.is_any_string() {
                    self.form(*arg)
                } else {
                    self.mold(*arg)
                };
                message = message.replace(&placeholder, &text);
            }
        }
        message
    }

    fn near_text(&self, near: Option<(SeriesId, usize)>) -> Option<String> {
        let (array, index) = near?;
        if !self.heap.is_live(array) {
            return None;
        }
        let cells = self.heap.array(array).ok()?;
        let from = index.saturating_sub(1).min(cells.len());
        let to = (from + 4).min(cells.len());
        if from == to {
            return None;
        }
        let mut molder = Molder::new(self);
        for (n, &cell) in cells[from..to].iter().enumerate() {
            if n > 0 {
                molder.out.push(' ');
            }
            molder.value(cell, Mode::Mold);
        }
        if to < cells.len() {
            molder.out.push_str(" ...");
        }
        Some(molder.out)
    }
}

impl<'a> Molder<'a> {
    fn new(interp: &'a Interp) -> Self {
        Self {
            interp,
            out: String::new(),
            stack: Vec::new(),
            indent: 0,
        }
    }

    fn value(&mut self, value: Value, mode: Mode) {
        let interp = self.interp;
        match value.payload {
            Payload::Logic(b) => self.out.push_str(if b { "true" } else { "false" }),
            Payload::Integer(n) => {
                let _ = write!(self.out, "{n}");
            }
            Payload::Decimal(d) => self.out.push_str(&format_decimal(d)),
            Payload::Char(c) => match mode {
                Mode::Form => self.out.push(c),
                Mode::Mold => {
                    self.out.push_str("#\"");
                    escape_char(&mut self.out, c, '"');
                    self.out.push('"');
                }
            },
            Payload::Pair(x, y) => {
                let _ = write!(self.out, "{}x{}", format_pair_part(x), format_pair_part(y));
            }
            Payload::Tuple(tuple) => {
                let parts: Vec<String> = tuple.parts().iter().map(u8::to_string).collect();
                self.out.push_str(&parts.join("."));
            }
            Payload::Time(nanos) => self.out.push_str(&format_time(nanos)),
            Payload::Date(date) => {
                let _ = write!(self.out, "{}-{:02}-{:02}", date.year, date.month, date.day);
            }
            Payload::Datatype(kind) => self.out.push_str(kind.name()),
            Payload::Typeset(key) => {
                self.out.push_str("make typeset! [");
                let names: Vec<&str> = key.bits.kinds().map(Kind::name).collect();
                self.out.push_str(&names.join(" "));
                self.out.push(']');
            }
            Payload::Word(word) => {
                let spelling = interp.symbols.spelling(word.spelling);
                let (prefix, suffix) = match value.kind {
                    Kind::SetWord => ("", ":"),
                    Kind::GetWord => (":", ""),
                    Kind::LitWord => ("'", ""),
                    Kind::Refinement => ("/", ""),
                    Kind::Issue => ("#", ""),
                    _ => ("", ""),
                };
                self.out.push_str(prefix);
                self.out.push_str(spelling);
                self.out.push_str(suffix);
            }
            Payload::Series(series) => self.series(value.kind, series.series, series.index, mode),
            Payload::Context(varlist) => self.context(value.kind, varlist, mode),
            Payload::Function(function) => self.function(function.paramlist, mode),
            Payload::Varargs(_) => self.out.push_str("make varargs! [...]"),
            Payload::Handle(_) => self.out.push_str("#[handle!]"),
            Payload::None => match value.kind {
                Kind::Blank => self.out.push('_'),
                Kind::Bar => self.out.push('|'),
                Kind::Trash => self.out.push_str("#[trash]"),
                Kind::Void | Kind::End => {}
                kind => {
                    let _ = write!(self.out, "#[{}]", kind.name());
                }
            },
        }
    }

    fn series(&mut self, kind: Kind, id: SeriesId, index: usize, mode: Mode) {
        let interp = self.interp;
        if !interp.heap.is_live(id) {
            self.out.push_str("#[freed]");
            return;
        }
        match kind {
            Kind::Block | Kind::Group => {
                let (open, close) = if kind == Kind::Block { ('[', ']') } else { ('(', ')') };
                if mode == Mode::Form {
                    self.form_elements(id, index);
                    return;
                }
                self.out.push(open);
                let multiline = self.elements(id, index, mode);
                if multiline {
                    self.newline();
                }
                self.out.push(close);
            }
            Kind::Path | Kind::SetPath | Kind::GetPath | Kind::LitPath => {
                match kind {
                    Kind::GetPath => self.out.push(':'),
                    Kind::LitPath => self.out.push('\''),
                    _ => {}
                }
                if self.enter(id) {
                    let cells = interp.heap.array(id).map(<[Value]>::to_vec).unwrap_or_default();
                    for (n, cell) in cells.into_iter().skip(index).enumerate() {
                        if n > 0 {
                            self.out.push('/');
                        }
                        self.value(cell, Mode::Mold);
                    }
                    self.stack.pop();
                }
                if kind == Kind::SetPath {
                    self.out.push(':');
                }
            }
            Kind::Binary => {
                self.out.push_str("#{");
                for byte in interp.heap.bytes(id).unwrap_or_default().iter().skip(index) {
                    let _ = write!(self.out, "{byte:02X}");
                }
                self.out.push('}');
            }
            _ => {
                let chars = interp.heap.chars(id).unwrap_or_default();
                let text: String = chars.iter().skip(index).collect();
                self.string(kind, &text, mode);
            }
        }
    }

    fn string(&mut self, kind: Kind, text: &str, mode: Mode) {
        match (kind, mode) {
            (Kind::Tag, _) => {
                self.out.push('<');
                self.out.push_str(text);
                self.out.push('>');
            }
            (_, Mode::Form) | (Kind::Url, _) => self.out.push_str(text),
            (Kind::File, Mode::Mold) => {
                self.out.push('%');
                if text.chars().any(|c| c.is_whitespace() || c == '"') {
                    self.quoted(text);
                } else {
                    self.out.push_str(text);
                }
            }
            _ => self.quoted(text),
        }
    }

    fn quoted(&mut self, text: &str) {
        self.out.push('"');
        for c in text.chars() {
            escape_char(&mut self.out, c, '"');
        }
        self.out.push('"');
    }

    /// Molds the cells of an array from `index`, separated by spaces or by
    /// newlines where a cell is flagged. True if any newline was written.
    fn elements(&mut self, id: SeriesId, index: usize, mode: Mode) -> bool {
        if !self.enter(id) {
            self.out.push_str("...");
            return false;
        }
        let cells = self.interp.heap.array(id).map(<[Value]>::to_vec).unwrap_or_default();
        let mut multiline = false;
        self.indent += 1;
        for (n, cell) in cells.into_iter().skip(index).enumerate() {
            if cell.has_flag(CellFlags::NEWLINE_BEFORE) {
                multiline = true;
                self.newline();
            } else if n > 0 {
                self.out.push(' ');
            }
            self.value(cell, mode);
        }
        self.indent -= 1;
        self.stack.pop();
        multiline
    }

    fn form_elements(&mut self, id: SeriesId, index: usize) {
        if !self.enter(id) {
            self.out.push_str("...");
            return;
        }
        let cells = self.interp.heap.array(id).map(<[Value]>::to_vec).unwrap_or_default();
        let mut first = true;
        for cell in cells.into_iter().skip(index) {
            if cell.is_void() {
                continue;
            }
            if !first {
                self.out.push(' ');
            }
            first = false;
            self.value(cell, Mode::Form);
        }
        self.stack.pop();
    }

    fn context(&mut self, kind: Kind, varlist: SeriesId, mode: Mode) {
        let interp = self.interp;
        if kind == Kind::Error && mode == Mode::Form {
            let raised = Raised {
                id: crate::natives::control::error_id_of(interp, varlist),
                args: Vec::new(),
                label: None,
                near: None,
                context: Some(varlist),
                message: None,
            };
            self.out.push_str(&interp.format_raised(&raised));
            return;
        }
        let fields = match (interp.context_keys(varlist), interp.heap.array(varlist)) {
            (Ok(keys), Ok(values)) => Some((keys, values.to_vec())),
            _ => None,
        };
        let Some((keys, values)) = fields else {
            let _ = write!(self.out, "make {} [...]", kind.name());
            return;
        };
        if mode == Mode::Mold {
            let _ = write!(self.out, "make {} [", kind.name());
        }
        if !self.enter(varlist) {
            self.out.push_str("...");
            if mode == Mode::Mold {
                self.out.push(']');
            }
            return;
        }
        self.indent += 1;
        let mut first = true;
        for (key, value) in keys.iter().zip(values.iter().skip(1)) {
            let Some(spelling) = key.spelling.filter(|_| !key.is_hidden()) else {
                continue;
            };
            if mode == Mode::Mold {
                self.newline();
            } else if !first {
                self.out.push('\n');
            }
            first = false;
            let _ = write!(self.out, "{}: ", interp.symbols.spelling(spelling));
            match (mode, value.kind) {
                (_, Kind::Void) => {}
                (Mode::Mold, kind) if kind.is_any_word() && kind != Kind::Refinement && kind != Kind::Issue => {
                    self.out.push('\'');
                    self.value(value.with_kind(Kind::Word), Mode::Mold);
                }
                _ => self.value(*value, Mode::Mold),
            }
        }
        self.indent -= 1;
        self.stack.pop();
        if mode == Mode::Mold {
            if !first {
                self.newline();
            }
            self.out.push(']');
        }
    }

    fn function(&mut self, paramlist: SeriesId, mode: Mode) {
        let interp = self.interp;
        let Ok(info) = interp.function_info(paramlist) else {
            self.out.push_str("#[function!]");
            return;
        };
        let keys = interp.keys(paramlist).unwrap_or_default();
        self.out.push_str("make function! [[");
        let mut first = true;
        for key in keys.iter().filter(|key| !key.is_hidden()) {
            let Some(spelling) = key.spelling else { continue };
            if !first {
                self.out.push(' ');
            }
            first = false;
            let name = interp.symbols.spelling(spelling);
            let _ = match key.class {
                ParamClass::Refinement => write!(self.out, "/{name}"),
                ParamClass::Tight => write!(self.out, "#{name}"),
                ParamClass::HardQuote => write!(self.out, ":{name}"),
                ParamClass::SoftQuote => write!(self.out, "'{name}"),
                ParamClass::Local => write!(self.out, "<local> {name}"),
                ParamClass::Normal | ParamClass::Return => write!(self.out, "{name}"),
            };
        }
        self.out.push_str("] ");
        match (info.dispatcher, info.body) {
            (Dispatcher::Interpreted, Some(body)) if mode == Mode::Mold => {
                self.series(Kind::Block, body, 0, Mode::Mold);
            }
            _ => self.out.push_str("[...]"),
        }
        self.out.push(']');
    }

    /// Pushes `id` unless it is already being printed.
    fn enter(&mut self, id: SeriesId) -> bool {
        if self.stack.contains(&id) {
            return false;
        }
        self.stack.push(id);
        true
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }
}

fn escape_char(out: &mut String, c: char, quote: char) {
    match c {
        '\n' => out.push_str("^/"),
        '\t' => out.push_str("^-"),
        '^' => out.push_str("^^"),
        '\0' => out.push_str("^@"),
        c if c == quote => {
            out.push('^');
            out.push(c);
        }
        c if c.is_control() => {
            let _ = write!(out, "^({:02X})", u32::from(c));
        }
        c => out.push(c),
    }
}

pub(crate) fn format_decimal(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

fn format_pair_part(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

fn format_time(nanos: i64) -> String {
    let sign = if nanos < 0 { "-" } else { "" };
    let nanos = nanos.unsigned_abs();
    let seconds = nanos / 1_000_000_000;
    let fraction = nanos % 1_000_000_000;
    let mut text = format!(
        "{sign}{}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    );
    if fraction > 0 {
        let digits = format!("{fraction:09}");
        text.push('.');
        text.push_str(digits.trim_end_matches('0'));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ErrorId;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn mold_of(interp: &mut Interp, text: &str) -> String {
        let value = interp.do_text(text).expect(text);
        interp.mold(value)
    }

    #[test]
    fn scalars() {
        let mut interp = interp();
        assert_eq!(mold_of(&mut interp, "42"), "42");
        assert_eq!(mold_of(&mut interp, "1.5"), "1.5");
        assert_eq!(mold_of(&mut interp, "3.0"), "3.0");
        assert_eq!(mold_of(&mut interp, "3x4"), "3x4");
        assert_eq!(mold_of(&mut interp, "1.2.3"), "1.2.3");
        assert_eq!(mold_of(&mut interp, "10:30"), "10:30:00");
        assert_eq!(mold_of(&mut interp, "2024-02-29"), "2024-02-29");
        assert_eq!(mold_of(&mut interp, "#\"a\""), "#\"a\"");
        assert_eq!(mold_of(&mut interp, "_"), "_");
    }

    #[test]
    fn strings_mold_with_escapes_and_form_raw() {
        let mut interp = interp();
        let value = interp.do_text(r#""a^/b^"c""#).unwrap();
        assert_eq!(interp.mold(value), r#""a^/b^"c""#);
        assert_eq!(interp.form(value), "a\nb\"c");
        assert_eq!(mold_of(&mut interp, "%file.txt"), "%file.txt");
        assert_eq!(mold_of(&mut interp, "<tag>"), "<tag>");
        assert_eq!(mold_of(&mut interp, "#{DEADBEEF}"), "#{DEADBEEF}");
    }

    #[test]
    fn blocks_and_paths() {
        let mut interp = interp();
        assert_eq!(mold_of(&mut interp, "[a b: :c 'd /e #f [1 (2)]]"), "[a b: :c 'd /e #f [1 (2)]]");
        assert_eq!(mold_of(&mut interp, "'a/b/c"), "a/b/c");
        let value = interp.do_text("[1 [2 3] \"x\"]").unwrap();
        assert_eq!(interp.form(value), "1 2 3 x");
    }

    #[test]
    fn newline_flags_are_kept() {
        let mut interp = interp();
        assert_eq!(mold_of(&mut interp, "[a\nb]"), "[a\n    b\n]");
    }

    #[test]
    fn self_containing_block_is_cut_short() {
        let mut interp = interp();
        let text = mold_of(&mut interp, "b: copy [1] append/only b b b");
        assert_eq!(text, "[1 [...]]");
    }

    #[test]
    fn objects_mold_as_make() {
        let mut interp = interp();
        let text = mold_of(&mut interp, "make object! [a: 1 b: \"x\"]");
        assert_eq!(text, "make object! [\n    a: 1\n    b: \"x\"\n]");
    }

    #[test]
    fn errors_format_with_where_and_near() {
        let mut interp = interp();
        let err = interp.do_text("f: func [x] [x / 0] f 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ZeroDivide));
        let text = interp.format_error(&err);
        assert!(text.starts_with("** Math error: attempt to divide by zero"), "{text}");
        assert!(text.contains("** Where:"), "{text}");
    }

    #[test]
    fn templates_take_arguments() {
        let mut interp = interp();
        let err = interp.do_text("no-such-word").unwrap_err();
        let text = interp.format_error(&err);
        assert!(text.starts_with("** Script error: no-such-word has no value"), "{text}");
    }
}
