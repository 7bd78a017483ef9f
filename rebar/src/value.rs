use bitflags::bitflags;

use crate::{SeriesId, Symbol};

/// Datatype tag of a cell.
///
/// `End` and `Trash` are not user-visible datatypes: `End` terminates arrays
/// and feeds, `Trash` poisons released slots in debug builds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    End = 0,
    Trash,
    Void,
    Blank,
    Bar,
    Logic,
    Integer,
    Decimal,
    Char,
    Pair,
    Tuple,
    Time,
    Date,
    Datatype,
    Typeset,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Issue,
    String,
    File,
    Url,
    Tag,
    Binary,
    Block,
    Group,
    Path,
    SetPath,
    GetPath,
    LitPath,
    Object,
    Module,
    Error,
    Port,
    Frame,
    Function,
    Varargs,
    Handle,
}

pub const KINDS: [Kind; 40] = [
    Kind::End,
    Kind::Trash,
    Kind::Void,
    Kind::Blank,
    Kind::Bar,
    Kind::Logic,
    Kind::Integer,
    Kind::Decimal,
    Kind::Char,
    Kind::Pair,
    Kind::Tuple,
    Kind::Time,
    Kind::Date,
    Kind::Datatype,
    Kind::Typeset,
    Kind::Word,
    Kind::SetWord,
    Kind::GetWord,
    Kind::LitWord,
    Kind::Refinement,
    Kind::Issue,
    Kind::String,
    Kind::File,
    Kind::Url,
    Kind::Tag,
    Kind::Binary,
    Kind::Block,
    Kind::Group,
    Kind::Path,
    Kind::SetPath,
    Kind::GetPath,
    Kind::LitPath,
    Kind::Object,
    Kind::Module,
    Kind::Error,
    Kind::Port,
    Kind::Frame,
    Kind::Function,
    Kind::Varargs,
    Kind::Handle,
];

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::End => "end!",
            Kind::Trash => "trash!",
            Kind::Void => "void!",
            Kind::Blank => "blank!",
            Kind::Bar => "bar!",
            Kind::Logic => "logic!",
            Kind::Integer => "integer!",
            Kind::Decimal => "decimal!",
            Kind::Char => "char!",
            Kind::Pair => "pair!",
            Kind::Tuple => "tuple!",
            Kind::Time => "time!",
            Kind::Date => "date!",
            Kind::Datatype => "datatype!",
            Kind::Typeset => "typeset!",
            Kind::Word => "word!",
            Kind::SetWord => "set-word!",
            Kind::GetWord => "get-word!",
            Kind::LitWord => "lit-word!",
            Kind::Refinement => "refinement!",
            Kind::Issue => "issue!",
            Kind::String => "string!",
            Kind::File => "file!",
            Kind::Url => "url!",
            Kind::Tag => "tag!",
            Kind::Binary => "binary!",
            Kind::Block => "block!",
            Kind::Group => "group!",
            Kind::Path => "path!",
            Kind::SetPath => "set-path!",
            Kind::GetPath => "get-path!",
            Kind::LitPath => "lit-path!",
            Kind::Object => "object!",
            Kind::Module => "module!",
            Kind::Error => "error!",
            Kind::Port => "port!",
            Kind::Frame => "frame!",
            Kind::Function => "function!",
            Kind::Varargs => "varargs!",
            Kind::Handle => "handle!",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        KINDS
            .iter()
            .copied()
            .filter(|kind| !matches!(kind, Kind::End | Kind::Trash))
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn is_any_word(self) -> bool {
        matches!(
            self,
            Kind::Word
                | Kind::SetWord
                | Kind::GetWord
                | Kind::LitWord
                | Kind::Refinement
                | Kind::Issue
        )
    }

    #[inline]
    pub fn is_any_path(self) -> bool {
        matches!(
            self,
            Kind::Path | Kind::SetPath | Kind::GetPath | Kind::LitPath
        )
    }

    #[inline]
    pub fn is_any_array(self) -> bool {
        matches!(self, Kind::Block | Kind::Group) || self.is_any_path()
    }

    #[inline]
    pub fn is_any_string(self) -> bool {
        matches!(self, Kind::String | Kind::File | Kind::Url | Kind::Tag)
    }

    #[inline]
    pub fn is_any_series(self) -> bool {
        self.is_any_array() || self.is_any_string() || self == Kind::Binary
    }

    #[inline]
    pub fn is_any_context(self) -> bool {
        matches!(
            self,
            Kind::Object | Kind::Module | Kind::Error | Kind::Port | Kind::Frame
        )
    }

    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self, Kind::Integer | Kind::Decimal)
    }

    /// Kinds the evaluator copies to the output without further action.
    #[inline]
    pub fn is_inert(self) -> bool {
        !matches!(
            self,
            Kind::End
                | Kind::Bar
                | Kind::Word
                | Kind::SetWord
                | Kind::GetWord
                | Kind::LitWord
                | Kind::Group
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::LitPath
                | Kind::Function
        )
    }
}

/// Bitset over [`Kind`], used by typesets and parameter type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TypeBits(pub u64);

const fn bits_of(kinds: &[Kind]) -> u64 {
    let mut bits = 0u64;
    let mut i = 0;
    while i < kinds.len() {
        bits |= 1u64 << (kinds[i] as u8);
        i += 1;
    }
    bits
}

impl TypeBits {
    pub const NONE: TypeBits = TypeBits(0);

    pub const ANY_WORD: TypeBits = TypeBits(bits_of(&[
        Kind::Word,
        Kind::SetWord,
        Kind::GetWord,
        Kind::LitWord,
        Kind::Refinement,
        Kind::Issue,
    ]));

    pub const ANY_PATH: TypeBits = TypeBits(bits_of(&[
        Kind::Path,
        Kind::SetPath,
        Kind::GetPath,
        Kind::LitPath,
    ]));

    pub const ANY_ARRAY: TypeBits = TypeBits(
        bits_of(&[Kind::Block, Kind::Group]) | Self::ANY_PATH.0,
    );

    pub const ANY_STRING: TypeBits = TypeBits(bits_of(&[
        Kind::String,
        Kind::File,
        Kind::Url,
        Kind::Tag,
    ]));

    pub const ANY_SERIES: TypeBits = TypeBits(
        Self::ANY_ARRAY.0 | Self::ANY_STRING.0 | bits_of(&[Kind::Binary]),
    );

    pub const ANY_NUMBER: TypeBits =
        TypeBits(bits_of(&[Kind::Integer, Kind::Decimal]));

    pub const ANY_SCALAR: TypeBits = TypeBits(
        Self::ANY_NUMBER.0
            | bits_of(&[
                Kind::Char,
                Kind::Pair,
                Kind::Tuple,
                Kind::Time,
                Kind::Date,
            ]),
    );

    pub const ANY_CONTEXT: TypeBits = TypeBits(bits_of(&[
        Kind::Object,
        Kind::Module,
        Kind::Error,
        Kind::Port,
        Kind::Frame,
    ]));

    /// Every user-visible kind except void.
    pub const ANY_VALUE: TypeBits = TypeBits(
        !bits_of(&[Kind::End, Kind::Trash, Kind::Void]) & ((1u64 << 40) - 1),
    );

    #[inline]
    pub const fn of(kind: Kind) -> TypeBits {
        TypeBits(1u64 << (kind as u8))
    }

    #[inline]
    pub const fn with(self, kind: Kind) -> TypeBits {
        TypeBits(self.0 | (1u64 << (kind as u8)))
    }

    #[inline]
    pub const fn union(self, other: TypeBits) -> TypeBits {
        TypeBits(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, kind: Kind) -> bool {
        self.0 & (1u64 << (kind as u8)) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn kinds(self) -> impl Iterator<Item = Kind> {
        KINDS.into_iter().filter(move |&kind| self.contains(kind))
    }

    pub fn from_typeset_name(name: &str) -> Option<TypeBits> {
        let bits = match name.to_ascii_lowercase().as_str() {
            "any-value!" => Self::ANY_VALUE,
            "any-word!" => Self::ANY_WORD,
            "any-path!" => Self::ANY_PATH,
            "any-array!" | "any-block!" => Self::ANY_ARRAY,
            "any-string!" => Self::ANY_STRING,
            "any-series!" => Self::ANY_SERIES,
            "any-number!" | "number!" => Self::ANY_NUMBER,
            "any-scalar!" | "scalar!" => Self::ANY_SCALAR,
            "any-context!" | "any-object!" => Self::ANY_CONTEXT,
            _ => return None,
        };
        Some(bits)
    }
}

/// How a parameter is fulfilled at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamClass {
    Normal,
    Tight,
    HardQuote,
    SoftQuote,
    Refinement,
    Local,
    Return,
}

bitflags! {
    /// Flags on a key (context key or function parameter).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u8 {
        const VARIADIC = 1 << 0;
        const ENDABLE = 1 << 1;
        const HIDDEN = 1 << 2;
        const UNBINDABLE = 1 << 3;
        const PROTECTED = 1 << 4;
        /// accepts void in addition to its typeset
        const OPTIONAL = 1 << 5;
        /// filled from a specialization exemplar, never from the call site
        const SPECIALIZED = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        const NEWLINE_BEFORE = 1 << 0;
        /// function value takes its first argument from the left
        const ENFIXED = 1 << 1;
        const PROTECTED = 1 << 2;
    }
}

/// Key cell payload: a typeset optionally carrying a parameter name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key {
    pub bits: TypeBits,
    pub spelling: Option<Symbol>,
    pub class: ParamClass,
    pub flags: ParamFlags,
}

impl Key {
    pub fn new(spelling: Symbol, class: ParamClass, bits: TypeBits) -> Self {
        Self {
            bits,
            spelling: Some(spelling),
            class,
            flags: ParamFlags::empty(),
        }
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(ParamFlags::HIDDEN)
    }

    #[inline]
    pub fn accepts(&self, kind: Kind) -> bool {
        if kind == Kind::Void {
            return self.flags.intersects(ParamFlags::OPTIONAL | ParamFlags::ENDABLE);
        }
        self.bits.contains(kind)
    }
}

/// Specifier used to resolve relative bindings: the varlist of a frame.
pub type Specifier = Option<SeriesId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Unbound,
    /// bound to a concrete context's varlist
    Specific(SeriesId),
    /// bound relative to a function's paramlist; needs a specifier
    Relative(SeriesId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordRef {
    pub spelling: Symbol,
    pub binding: Binding,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesRef {
    pub series: SeriesId,
    pub index: usize,
    pub specifier: Specifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub paramlist: SeriesId,
    /// frame a definitional RETURN/LEAVE targets, or None
    pub binding: Option<SeriesId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple {
    pub len: u8,
    pub bytes: [u8; 10],
}

impl Tuple {
    pub fn new(parts: &[u8]) -> Option<Self> {
        if parts.len() > 10 {
            return None;
        }
        let mut bytes = [0u8; 10];
        bytes[..parts.len()].copy_from_slice(parts);
        Some(Self {
            len: parts.len() as u8,
            bytes,
        })
    }

    pub fn parts(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Char(char),
    Pair(f64, f64),
    Tuple(Tuple),
    /// nanoseconds
    Time(i64),
    Date(Date),
    Datatype(Kind),
    Typeset(Key),
    Word(WordRef),
    Series(SeriesRef),
    Context(SeriesId),
    Function(FunctionRef),
    Varargs(SeriesId),
    Handle(SeriesId),
}

/// A fixed-width value cell.
///
/// Cells never own heap memory; composite data lives in series referenced by
/// the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    pub kind: Kind,
    pub flags: CellFlags,
    pub payload: Payload,
}

impl Value {
    #[inline]
    const fn simple(kind: Kind, payload: Payload) -> Self {
        Self {
            kind,
            flags: CellFlags::empty(),
            payload,
        }
    }

    pub const END: Value = Value::simple(Kind::End, Payload::None);
    pub const VOID: Value = Value::simple(Kind::Void, Payload::None);
    pub const BLANK: Value = Value::simple(Kind::Blank, Payload::None);
    pub const BAR: Value = Value::simple(Kind::Bar, Payload::None);
    pub const TRUE: Value = Value::simple(Kind::Logic, Payload::Logic(true));
    pub const FALSE: Value = Value::simple(Kind::Logic, Payload::Logic(false));

    #[inline]
    pub const fn end() -> Self {
        Self::END
    }

    #[inline]
    pub const fn void() -> Self {
        Self::VOID
    }

    #[inline]
    pub const fn blank() -> Self {
        Self::BLANK
    }

    #[inline]
    pub const fn bar() -> Self {
        Self::BAR
    }

    #[inline]
    pub const fn trash() -> Self {
        Self::simple(Kind::Trash, Payload::None)
    }

    #[inline]
    pub const fn logic(flag: bool) -> Self {
        Self::simple(Kind::Logic, Payload::Logic(flag))
    }

    #[inline]
    pub const fn integer(n: i64) -> Self {
        Self::simple(Kind::Integer, Payload::Integer(n))
    }

    #[inline]
    pub const fn decimal(d: f64) -> Self {
        Self::simple(Kind::Decimal, Payload::Decimal(d))
    }

    #[inline]
    pub const fn char(c: char) -> Self {
        Self::simple(Kind::Char, Payload::Char(c))
    }

    #[inline]
    pub const fn pair(x: f64, y: f64) -> Self {
        Self::simple(Kind::Pair, Payload::Pair(x, y))
    }

    #[inline]
    pub const fn tuple(tuple: Tuple) -> Self {
        Self::simple(Kind::Tuple, Payload::Tuple(tuple))
    }

    #[inline]
    pub const fn time(nanos: i64) -> Self {
        Self::simple(Kind::Time, Payload::Time(nanos))
    }

    #[inline]
    pub const fn date(date: Date) -> Self {
        Self::simple(Kind::Date, Payload::Date(date))
    }

    #[inline]
    pub const fn datatype(kind: Kind) -> Self {
        Self::simple(Kind::Datatype, Payload::Datatype(kind))
    }

    pub const fn typeset(bits: TypeBits) -> Self {
        Self::simple(
            Kind::Typeset,
            Payload::Typeset(Key {
                bits,
                spelling: None,
                class: ParamClass::Normal,
                flags: ParamFlags::empty(),
            }),
        )
    }

    #[inline]
    pub const fn key(key: Key) -> Self {
        Self::simple(Kind::Typeset, Payload::Typeset(key))
    }

    /// An unbound word of the given any-word kind.
    pub const fn word(kind: Kind, spelling: Symbol) -> Self {
        Self::simple(
            kind,
            Payload::Word(WordRef {
                spelling,
                binding: Binding::Unbound,
                index: 0,
            }),
        )
    }

    pub const fn bound_word(
        kind: Kind,
        spelling: Symbol,
        binding: Binding,
        index: usize,
    ) -> Self {
        Self::simple(
            kind,
            Payload::Word(WordRef {
                spelling,
                binding,
                index,
            }),
        )
    }

    pub const fn series(kind: Kind, series: SeriesId, index: usize) -> Self {
        Self::simple(
            kind,
            Payload::Series(SeriesRef {
                series,
                index,
                specifier: None,
            }),
        )
    }

    #[inline]
    pub const fn block(series: SeriesId) -> Self {
        Self::series(Kind::Block, series, 0)
    }

    #[inline]
    pub const fn context(kind: Kind, varlist: SeriesId) -> Self {
        Self::simple(kind, Payload::Context(varlist))
    }

    #[inline]
    pub const fn function(paramlist: SeriesId, binding: Option<SeriesId>) -> Self {
        Self::simple(
            Kind::Function,
            Payload::Function(FunctionRef { paramlist, binding }),
        )
    }

    #[inline]
    pub const fn varargs(state: SeriesId) -> Self {
        Self::simple(Kind::Varargs, Payload::Varargs(state))
    }

    #[inline]
    pub const fn handle(series: SeriesId) -> Self {
        Self::simple(Kind::Handle, Payload::Handle(series))
    }

    // ── predicates ─────────────────────────────────────────────────

    #[inline]
    pub fn is_end(&self) -> bool {
        self.kind == Kind::End
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.kind == Kind::Void
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.kind == Kind::Blank
    }

    #[inline]
    pub fn is_bar(&self) -> bool {
        self.kind == Kind::Bar
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        self.kind == Kind::Function
    }

    #[inline]
    pub fn is_enfixed(&self) -> bool {
        self.kind == Kind::Function && self.flags.contains(CellFlags::ENFIXED)
    }

    /// Conditional truth: everything but `false`, blank and void is true.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(
            (self.kind, self.payload),
            (Kind::Logic, Payload::Logic(false)) | (Kind::Blank, _) | (Kind::Void, _)
        )
    }

    #[inline]
    pub fn has_flag(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn with_flag(mut self, flag: CellFlags) -> Self {
        self.flags.insert(flag);
        self
    }

    #[inline]
    pub fn without_flag(mut self, flag: CellFlags) -> Self {
        self.flags.remove(flag);
        self
    }

    /// Same payload under another kind (e.g. SET-WORD! to WORD!).
    #[inline]
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    // ── accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn as_logic(&self) -> Option<bool> {
        match self.payload {
            Payload::Logic(flag) => Some(flag),
            _ => None,
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(n) if self.kind == Kind::Integer => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_decimal(&self) -> Option<f64> {
        match self.payload {
            Payload::Decimal(d) => Some(d),
            Payload::Integer(n) if self.kind == Kind::Integer => Some(n as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_char(&self) -> Option<char> {
        match self.payload {
            Payload::Char(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn as_word(&self) -> Option<WordRef> {
        match self.payload {
            Payload::Word(word) => Some(word),
            _ => None,
        }
    }

    #[inline]
    pub fn symbol(&self) -> Option<Symbol> {
        self.as_word().map(|word| word.spelling)
    }

    #[inline]
    pub fn as_series(&self) -> Option<SeriesRef> {
        match self.payload {
            Payload::Series(series) => Some(series),
            _ => None,
        }
    }

    #[inline]
    pub fn as_context(&self) -> Option<SeriesId> {
        match self.payload {
            Payload::Context(varlist) => Some(varlist),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<FunctionRef> {
        match self.payload {
            Payload::Function(function) => Some(function),
            _ => None,
        }
    }

    #[inline]
    pub fn as_key(&self) -> Option<Key> {
        match self.payload {
            Payload::Typeset(key) => Some(key),
            _ => None,
        }
    }

    #[inline]
    pub fn as_datatype(&self) -> Option<Kind> {
        match self.payload {
            Payload::Datatype(kind) => Some(kind),
            _ => None,
        }
    }

    #[inline]
    pub fn as_handle(&self) -> Option<SeriesId> {
        match self.payload {
            Payload::Handle(series) => Some(series),
            _ => None,
        }
    }

    #[inline]
    pub fn as_varargs(&self) -> Option<SeriesId> {
        match self.payload {
            Payload::Varargs(state) => Some(state),
            _ => None,
        }
    }

    /// Moves an any-series value to another position.
    pub fn at_index(mut self, index: usize) -> Self {
        if let Payload::Series(ref mut series) = self.payload {
            series.index = index;
        }
        self
    }

    /// Attaches a specifier to an array value that does not carry one yet.
    pub fn with_specifier(mut self, specifier: Specifier) -> Self {
        if let Payload::Series(ref mut series) = self.payload
            && series.specifier.is_none()
        {
            series.specifier = specifier;
        }
        self
    }

    /// Series referenced by this cell, for the collector.
    pub fn referenced_series(&self) -> Option<SeriesId> {
        match self.payload {
            Payload::Series(series) => Some(series.series),
            Payload::Context(varlist) => Some(varlist),
            Payload::Function(function) => Some(function.paramlist),
            Payload::Varargs(state) => Some(state),
            Payload::Handle(series) => Some(series),
            _ => None,
        }
    }

    /// Second referenced series (specifier, binding), for the collector.
    pub fn referenced_binding(&self) -> Option<SeriesId> {
        match self.payload {
            Payload::Series(series) => series.specifier,
            Payload::Function(function) => function.binding,
            Payload::Word(word) => match word.binding {
                Binding::Unbound => None,
                Binding::Specific(series) | Binding::Relative(series) => {
                    Some(series)
                }
            },
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::VOID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in KINDS.into_iter().skip(2) {
            assert_eq!(Kind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(Kind::from_name("INTEGER!"), Some(Kind::Integer));
        assert_eq!(Kind::from_name("end!"), None);
    }

    #[test]
    fn typesets_cover_families() {
        assert!(TypeBits::ANY_SERIES.contains(Kind::Block));
        assert!(TypeBits::ANY_SERIES.contains(Kind::Binary));
        assert!(TypeBits::ANY_SERIES.contains(Kind::Tag));
        assert!(!TypeBits::ANY_SERIES.contains(Kind::Integer));
        assert!(TypeBits::ANY_VALUE.contains(Kind::Handle));
        assert!(!TypeBits::ANY_VALUE.contains(Kind::Void));
        assert!(!TypeBits::ANY_VALUE.contains(Kind::End));
        assert_eq!(TypeBits::of(Kind::Integer).kinds().count(), 1);
    }

    #[test]
    fn truthiness() {
        assert!(Value::integer(0).is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(!Value::BLANK.is_truthy());
        assert!(!Value::VOID.is_truthy());
    }

    #[test]
    fn key_accepts_void_only_when_optional() {
        let mut key = Key::new(Symbol(1), ParamClass::Normal, TypeBits::ANY_VALUE);
        assert!(!key.accepts(Kind::Void));
        key.flags.insert(ParamFlags::OPTIONAL);
        assert!(key.accepts(Kind::Void));
        assert!(key.accepts(Kind::Integer));
    }

    #[test]
    fn end_is_distinct_from_trash_and_void() {
        assert!(Value::end().is_end());
        assert!(!Value::trash().is_end());
        assert_ne!(Value::trash(), Value::void());
    }
}
