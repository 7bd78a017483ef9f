//! Loader: UTF-8 source text to a BLOCK! of cells.
//!
//! Words come back unbound; [`Interp::load`](crate::Interp::load) binds them.
//! The scanner never evaluates anything, and it never runs the collector,
//! so nested arrays need no guarding while the outer one is being built.

use thiserror::Error;

use crate::error::Result;
use crate::interp::Interp;
use crate::series::{Heap, SeriesId};
use crate::symbol::SymbolTable;
use crate::value::{CellFlags, Date, Kind, Tuple, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("missing {expected} for the one opened on line {opened}")]
    Missing { expected: char, opened: usize },
    #[error("invalid {kind} on line {line}: {text}")]
    Invalid {
        kind: &'static str,
        text: String,
        line: usize,
    },
    #[error("unexpected {found} on line {line}")]
    Unexpected { found: char, line: usize },
}

impl ScanError {
    pub fn line(&self) -> usize {
        match self {
            ScanError::Missing { opened, .. } => *opened,
            ScanError::Invalid { line, .. } | ScanError::Unexpected { line, .. } => *line,
        }
    }
}

/// Scans `text` into a new managed block of unbound cells.
pub fn load(interp: &mut Interp, text: &str) -> Result<SeriesId> {
    Ok(scan(&mut interp.heap, &mut interp.symbols, text)?)
}

pub fn scan(heap: &mut Heap, symbols: &mut SymbolTable, text: &str) -> std::result::Result<SeriesId, ScanError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut scanner = Scanner {
        heap,
        symbols,
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
    };
    let cells = scanner.scan_block(None, 1)?;
    Ok(scanner.heap.make_array(&cells))
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '"' | ';')
}

fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if c.is_ascii_digit() => true,
        (Some('+' | '-' | '.'), Some(c)) => c.is_ascii_digit(),
        _ => false,
    }
}

/// `scheme://...` or `scheme:rest` such as `mailto:a@b`.
fn is_url(raw: &str) -> bool {
    if raw.contains("://") {
        return true;
    }
    match raw.split_once(':') {
        Some((scheme, rest)) => {
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && !rest.is_empty()
                && !rest.starts_with(':')
        }
        None => false,
    }
}

struct Scanner<'a> {
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn invalid(&self, kind: &'static str, text: impl Into<String>) -> ScanError {
        ScanError::Invalid {
            kind,
            text: text.into(),
            line: self.line,
        }
    }

    /// Text up to the next delimiter, not consumed.
    fn raw_token(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take_while(|&&c| !is_delimiter(c))
            .collect()
    }

    fn consume(&mut self, text: &str) {
        self.pos += text.chars().count();
    }

    /// Skips whitespace and comments. True if a newline was crossed.
    fn skip_space(&mut self) -> bool {
        let mut newline = false;
        while let Some(c) = self.peek() {
            if c == ';' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            } else if c.is_whitespace() {
                newline |= c == '\n';
                self.bump();
            } else {
                break;
            }
        }
        newline
    }

    fn scan_block(&mut self, close: Option<char>, opened: usize) -> std::result::Result<Vec<Value>, ScanError> {
        let mut cells = Vec::new();
        loop {
            let newline = self.skip_space();
            match self.peek() {
                None => {
                    return match close {
                        Some(expected) => Err(ScanError::Missing { expected, opened }),
                        None => Ok(cells),
                    };
                }
                Some(c) if Some(c) == close => {
                    self.pos += 1;
                    return Ok(cells);
                }
                Some(found @ (']' | ')' | '}')) => {
                    return Err(ScanError::Unexpected { found, line: self.line });
                }
                Some(_) => {
                    let mut value = self.scan_value()?;
                    if newline {
                        value = value.with_flag(CellFlags::NEWLINE_BEFORE);
                    }
                    cells.push(value);
                }
            }
        }
    }

    fn scan_value(&mut self) -> std::result::Result<Value, ScanError> {
        match self.peek() {
            Some('[') => self.scan_nested(Kind::Block, ']'),
            Some('(') => self.scan_nested(Kind::Group, ')'),
            Some('"') => {
                self.pos += 1;
                let text = self.quoted_string()?;
                Ok(self.string_value(Kind::String, &text))
            }
            Some('{') => {
                self.pos += 1;
                let text = self.braced_string()?;
                Ok(self.string_value(Kind::String, &text))
            }
            Some('#') => match self.peek_at(1) {
                Some('{') => {
                    self.pos += 2;
                    self.binary()
                }
                Some('"') => {
                    self.pos += 2;
                    self.char_literal()
                }
                _ => {
                    self.pos += 1;
                    let raw = self.raw_token();
                    if raw.is_empty() {
                        return Err(self.invalid("issue", "#"));
                    }
                    self.consume(&raw);
                    let sym = self.symbols.intern(&raw);
                    Ok(Value::word(Kind::Issue, sym))
                }
            },
            Some('%') => {
                self.pos += 1;
                let path = if self.peek() == Some('"') {
                    self.pos += 1;
                    self.quoted_string()?
                } else {
                    let raw = self.raw_token();
                    self.consume(&raw);
                    raw
                };
                Ok(self.string_value(Kind::File, &path))
            }
            Some('<') if self.at_tag() => {
                self.pos += 1;
                let mut text = String::new();
                while let Some(c) = self.bump() {
                    if c == '>' {
                        return Ok(self.string_value(Kind::Tag, &text));
                    }
                    text.push(c);
                }
                Err(ScanError::Missing {
                    expected: '>',
                    opened: self.line,
                })
            }
            _ => self.word_like(),
        }
    }

    fn scan_nested(&mut self, kind: Kind, close: char) -> std::result::Result<Value, ScanError> {
        let opened = self.line;
        self.pos += 1;
        let cells = self.scan_block(Some(close), opened)?;
        let array = self.heap.make_array(&cells);
        Ok(Value::series(kind, array, 0))
    }

    fn string_value(&mut self, kind: Kind, text: &str) -> Value {
        let series = self.heap.make_string(text);
        Value::series(kind, series, 0)
    }

    /// `<` starts a tag when something other than space, `=`, `<` or `>`
    /// follows and a `>` closes it on the same line.
    fn at_tag(&self) -> bool {
        match self.peek_at(1) {
            Some(c) if c.is_whitespace() || matches!(c, '=' | '<' | '>') => false,
            Some(_) => self.chars[self.pos + 1..]
                .iter()
                .take_while(|&&c| c != '\n')
                .any(|&c| c == '>'),
            None => false,
        }
    }

    // ── strings ──────────────────────────────────────────────────

    fn escape(&mut self) -> std::result::Result<char, ScanError> {
        let c = self.bump().ok_or_else(|| self.invalid("escape", "^"))?;
        Ok(match c {
            '/' => '\n',
            '-' => '\t',
            '@' => '\0',
            '(' => {
                let mut name = String::new();
                loop {
                    match self.bump() {
                        Some(')') => break,
                        Some(c) => name.push(c),
                        None => return Err(self.invalid("escape", format!("^({name}"))),
                    }
                }
                match name.to_ascii_lowercase().as_str() {
                    "line" => '\n',
                    "tab" => '\t',
                    "null" => '\0',
                    "esc" => '\u{1b}',
                    "back" => '\u{8}',
                    "del" => '\u{7f}',
                    hex => u32::from_str_radix(hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.invalid("escape", format!("^({name})")))?,
                }
            }
            c @ 'A'..='Z' => char::from(c as u8 - b'@'),
            other => other,
        })
    }

    fn quoted_string(&mut self) -> std::result::Result<String, ScanError> {
        let opened = self.line;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('^') => text.push(self.escape()?),
                Some('\n') | None => return Err(ScanError::Missing { expected: '"', opened }),
                Some(c) => text.push(c),
            }
        }
    }

    fn braced_string(&mut self) -> std::result::Result<String, ScanError> {
        let opened = self.line;
        let mut depth = 1;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('{') => {
                    depth += 1;
                    text.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push('}');
                }
                Some('^') => text.push(self.escape()?),
                Some(c) => text.push(c),
                None => return Err(ScanError::Missing { expected: '}', opened }),
            }
        }
    }

    fn char_literal(&mut self) -> std::result::Result<Value, ScanError> {
        let c = match self.bump() {
            Some('^') => self.escape()?,
            Some(c) => c,
            None => return Err(self.invalid("char", "#\"")),
        };
        if self.bump() != Some('"') {
            return Err(self.invalid("char", format!("#\"{c}")));
        }
        Ok(Value::char(c))
    }

    fn binary(&mut self) -> std::result::Result<Value, ScanError> {
        let opened = self.line;
        let mut digits = Vec::new();
        loop {
            match self.bump() {
                Some('}') => break,
                Some(c) if c.is_whitespace() => {}
                Some(c) => digits.push(c.to_digit(16).ok_or_else(|| self.invalid("binary", c.to_string()))? as u8),
                None => return Err(ScanError::Missing { expected: '}', opened }),
            }
        }
        if digits.len() % 2 != 0 {
            return Err(self.invalid("binary", "odd number of hex digits"));
        }
        let bytes = digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect();
        let series = self.heap.make_binary(bytes);
        Ok(Value::series(Kind::Binary, series, 0))
    }

    // ── words, numbers, paths ────────────────────────────────────

    fn word_like(&mut self) -> std::result::Result<Value, ScanError> {
        let raw = self.raw_token();
        if is_url(&raw) {
            self.consume(&raw);
            return Ok(self.string_value(Kind::Url, &raw));
        }

        if let Some(rest) = raw.strip_prefix('/') {
            if rest.is_empty() || rest.chars().all(|c| c == '/') {
                self.consume(&raw);
                return Ok(self.word(Kind::Word, &raw));
            }
            let name: String = rest.chars().take_while(|&c| c != '/').collect();
            self.pos += 1;
            self.consume(&name);
            return Ok(self.word(Kind::Refinement, &name));
        }

        let head: String = raw.chars().take_while(|&c| c != '/').collect();
        self.consume(&head);
        let value = self.atom(&head)?;
        let continues = self.peek() == Some('/')
            && self.peek_at(1).is_some_and(|c| !is_delimiter(c) || c == '(');
        if continues && matches!(value.kind, Kind::Word | Kind::GetWord | Kind::LitWord) {
            return self.path(value);
        }
        Ok(value)
    }

    fn word(&mut self, kind: Kind, spelling: &str) -> Value {
        let sym = self.symbols.intern(spelling);
        Value::word(kind, sym)
    }

    /// One token with no path structure.
    fn atom(&mut self, text: &str) -> std::result::Result<Value, ScanError> {
        if looks_numeric(text) {
            return self.number(text);
        }
        match text {
            "_" => return Ok(Value::BLANK),
            "|" => return Ok(Value::BAR),
            "" => return Err(self.invalid("word", text)),
            _ => {}
        }
        let (kind, name) = if let Some(name) = text.strip_prefix('\'') {
            (Kind::LitWord, name)
        } else if let Some(name) = text.strip_prefix(':') {
            (Kind::GetWord, name)
        } else if let Some(name) = text.strip_suffix(':') {
            (Kind::SetWord, name)
        } else {
            (Kind::Word, text)
        };
        if name.is_empty() || name.contains(':') || looks_numeric(name) {
            return Err(self.invalid("word", text));
        }
        Ok(self.word(kind, name))
    }

    fn path(&mut self, head: Value) -> std::result::Result<Value, ScanError> {
        let (mut kind, head) = match head.kind {
            Kind::GetWord => (Kind::GetPath, head.with_kind(Kind::Word)),
            Kind::LitWord => (Kind::LitPath, head.with_kind(Kind::Word)),
            _ => (Kind::Path, head),
        };
        let mut elements = vec![head];
        while self.peek() == Some('/') {
            self.pos += 1;
            match self.peek() {
                Some('(') => {
                    let group = self.scan_nested(Kind::Group, ')')?;
                    elements.push(group);
                }
                Some(c) if !is_delimiter(c) && c != '/' => {
                    let raw: String = self.raw_token().chars().take_while(|&c| c != '/').collect();
                    self.consume(&raw);
                    let (text, set) = match raw.strip_suffix(':') {
                        Some(text) if kind == Kind::Path => (text.to_string(), true),
                        _ => (raw.clone(), false),
                    };
                    let element = self.atom(&text)?;
                    if element.kind == Kind::SetWord {
                        return Err(self.invalid("path", raw));
                    }
                    elements.push(element);
                    if set {
                        kind = Kind::SetPath;
                        break;
                    }
                }
                _ => return Err(self.invalid("path", "/")),
            }
        }
        if kind == Kind::Path && self.peek() == Some(':') {
            self.pos += 1;
            kind = Kind::SetPath;
        }
        let array = self.heap.make_array(&elements);
        Ok(Value::series(kind, array, 0))
    }

    fn number(&mut self, text: &str) -> std::result::Result<Value, ScanError> {
        let clean: String = text.chars().filter(|&c| c != '\'').collect();
        let text = clean.as_str();

        if let Some((x, y)) = text.split_once(['x', 'X']) {
            let x = x.parse::<f64>().map_err(|_| self.invalid("pair", text))?;
            let y = y.parse::<f64>().map_err(|_| self.invalid("pair", text))?;
            return Ok(Value::pair(x, y));
        }
        if text.contains(':') {
            return self.time(text);
        }
        if text[1..].contains('-') && !text.contains(['e', 'E']) {
            return self.date(text);
        }
        if text.matches('.').count() >= 2 {
            let parts: Option<Vec<u8>> = text.split('.').map(|part| part.parse::<u8>().ok()).collect();
            return parts
                .and_then(|parts| Tuple::new(&parts))
                .map(Value::tuple)
                .ok_or_else(|| self.invalid("tuple", text));
        }
        if text.contains(['.', 'e', 'E']) {
            let normalized = text.strip_suffix('.').unwrap_or(text);
            return normalized
                .parse::<f64>()
                .map(Value::decimal)
                .map_err(|_| self.invalid("decimal", text));
        }
        text.parse::<i64>()
            .map(Value::integer)
            .map_err(|_| self.invalid("integer", text))
    }

    fn time(&self, text: &str) -> std::result::Result<Value, ScanError> {
        let bad = || self.invalid("time", text);
        let (negative, body) = match text.strip_prefix('-') {
            Some(body) => (true, body),
            None => (false, text),
        };
        let parts: Vec<&str> = body.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(bad());
        }
        let hours: i64 = parts[0].parse().map_err(|_| bad())?;
        let minutes: i64 = parts[1].parse().map_err(|_| bad())?;
        let seconds: f64 = match parts.get(2) {
            Some(s) => s.parse().map_err(|_| bad())?,
            None => 0.0,
        };
        if minutes >= 60 || seconds >= 60.0 || seconds < 0.0 {
            return Err(bad());
        }
        let nanos = (hours * 3600 + minutes * 60) * 1_000_000_000 + (seconds * 1e9).round() as i64;
        Ok(Value::time(if negative { -nanos } else { nanos }))
    }

    fn date(&self, text: &str) -> std::result::Result<Value, ScanError> {
        let bad = || self.invalid("date", text);
        let parts: Vec<&str> = text.split('-').collect();
        let [year, month, day] = parts.as_slice() else {
            return Err(bad());
        };
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u8 = month.parse().map_err(|_| bad())?;
        let day: u8 = day.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(bad());
        }
        Ok(Value::date(Date { year, month, day }))
    }
}

pub fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapSettings;
    use crate::signal::SignalHandle;
    use crate::value::Payload;

    fn scan_text(text: &str) -> (Heap, SymbolTable, std::result::Result<SeriesId, ScanError>) {
        let mut heap = Heap::new(HeapSettings::default(), 64, SignalHandle::new(100));
        let mut symbols = SymbolTable::new();
        let result = scan(&mut heap, &mut symbols, text);
        (heap, symbols, result)
    }

    fn kinds(text: &str) -> Vec<Kind> {
        let (heap, _, result) = scan_text(text);
        heap.array(result.unwrap()).unwrap().iter().map(|v| v.kind).collect()
    }

    #[test]
    fn word_forms() {
        assert_eq!(
            kinds("a b: :c 'd /e #f | _"),
            vec![
                Kind::Word,
                Kind::SetWord,
                Kind::GetWord,
                Kind::LitWord,
                Kind::Refinement,
                Kind::Issue,
                Kind::Bar,
                Kind::Blank,
            ]
        );
    }

    #[test]
    fn scalar_forms() {
        let (heap, _, result) = scan_text("12 -3 1.5 3x4 1.2.3 10:30 2024-02-29 #\"a\" 1e3");
        let cells = heap.array(result.unwrap()).unwrap().to_vec();
        assert_eq!(cells[0], Value::integer(12));
        assert_eq!(cells[1], Value::integer(-3));
        assert_eq!(cells[2], Value::decimal(1.5));
        assert_eq!(cells[3], Value::pair(3.0, 4.0));
        assert_eq!(cells[4].kind, Kind::Tuple);
        assert_eq!(cells[5], Value::time((10 * 3600 + 30 * 60) * 1_000_000_000));
        assert_eq!(
            cells[6],
            Value::date(Date {
                year: 2024,
                month: 2,
                day: 29
            })
        );
        assert_eq!(cells[7], Value::char('a'));
        assert_eq!(cells[8], Value::decimal(1000.0));
    }

    #[test]
    fn string_forms() {
        let (heap, _, result) = scan_text(r#""a^/b" {x {y} z} #{DEAD beef} %dir/file.txt http://example.com/x <tag>"#);
        let cells = heap.array(result.unwrap()).unwrap().to_vec();
        let text = |v: Value| heap.string(v.as_series().unwrap().series).unwrap();
        assert_eq!(text(cells[0]), "a\nb");
        assert_eq!(text(cells[1]), "x {y} z");
        assert_eq!(heap.bytes(cells[2].as_series().unwrap().series).unwrap(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!((cells[3].kind, text(cells[3])), (Kind::File, "dir/file.txt".to_string()));
        assert_eq!(cells[4].kind, Kind::Url);
        assert_eq!((cells[5].kind, text(cells[5])), (Kind::Tag, "tag".to_string()));
    }

    #[test]
    fn comparison_words_are_not_tags() {
        assert_eq!(
            kinds("a < b a <= b a <> b a > b <local>"),
            vec![
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Word,
                Kind::Tag,
            ]
        );
    }

    #[test]
    fn path_forms() {
        assert_eq!(
            kinds("a/b :a/b 'a/b a/b: b/:i b/(1) / //"),
            vec![
                Kind::Path,
                Kind::GetPath,
                Kind::LitPath,
                Kind::SetPath,
                Kind::Path,
                Kind::Path,
                Kind::Word,
                Kind::Word,
            ]
        );
        let (heap, _, result) = scan_text("o/2:");
        let path = heap.cell(result.unwrap(), 0);
        let elements = heap.array(path.as_series().unwrap().series).unwrap();
        assert_eq!(elements[1], Value::integer(2));
    }

    #[test]
    fn nesting_and_newlines() {
        let (heap, _, result) = scan_text("[a (b)\n c] ; comment\n d");
        let top = heap.array(result.unwrap()).unwrap().to_vec();
        assert_eq!(top.len(), 2);
        assert!(top[1].has_flag(CellFlags::NEWLINE_BEFORE));
        let inner = heap.array(top[0].as_series().unwrap().series).unwrap();
        assert_eq!(inner[1].kind, Kind::Group);
        assert!(inner[2].has_flag(CellFlags::NEWLINE_BEFORE));
        assert!(!inner[1].has_flag(CellFlags::NEWLINE_BEFORE));
    }

    #[test]
    fn unbalanced_input_reports_line() {
        let (_, _, result) = scan_text("a\n[b\nc");
        assert_eq!(result.unwrap_err(), ScanError::Missing { expected: ']', opened: 2 });
        let (_, _, result) = scan_text("a ]");
        assert!(matches!(result, Err(ScanError::Unexpected { found: ']', line: 1 })));
    }

    #[test]
    fn invalid_dates_rejected() {
        let (_, _, result) = scan_text("2023-02-29");
        assert!(matches!(result, Err(ScanError::Invalid { kind: "date", .. })));
    }

    #[test]
    fn words_share_symbols() {
        let (heap, symbols, result) = scan_text("Foo foo");
        let cells = heap.array(result.unwrap()).unwrap();
        let (Payload::Word(a), Payload::Word(b)) = (cells[0].payload, cells[1].payload) else {
            panic!("expected words");
        };
        assert!(symbols.same(a.spelling, b.spelling));
    }
}
