//! Interned identifiers.
//!
//! Every spelling is interned once. Case variants of one name share a
//! *canon*: the first spelling interned for that name. Word equality in the
//! language is canon equality. The hash table is keyed by the case-folded
//! spelling and only ever holds canons; variants hang off their canon.
//!
//! Built-in symbols are interned at construction, before anything else, so
//! their symbol index doubles as a small switch id (see [`SymId`]).

use ahash::RandomState;

/// Handle to an interned spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

macro_rules! builtin_symbols {
    ($($variant:ident => $text:literal,)*) => {
        /// Symbols known to native code.
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SymId {
            $($variant,)*
        }

        const BUILTINS: &[(SymId, &str)] = &[$((SymId::$variant, $text),)*];
    };
}

builtin_symbols! {
    SelfWord => "self",
    Return => "return",
    Local => "local",
    Opt => "opt",
    End => "end",
    Ellipsis => "...",
    Deep => "deep",
    Only => "only",
    Part => "part",
    Hide => "hide",
    Name => "name",
    Gzip => "gzip",
    Zlib => "zlib",
    Detect => "detect",
    Envelope => "envelope",
    Max => "max",
    Code => "code",
    Type => "type",
    Id => "id",
    Message => "message",
    Arg1 => "arg1",
    Arg2 => "arg2",
    Arg3 => "arg3",
    Near => "near",
    Where => "where",
    Scheme => "scheme",
    Spec => "spec",
    State => "state",
    Path => "path",
    Lib => "lib",
    True => "true",
    False => "false",
    On => "on",
    Off => "off",
    Yes => "yes",
    No => "no",
    Blank => "blank",
    Bar => "bar",
    File => "file",
    Clipboard => "clipboard",
    Value => "value",
    Values => "values",
    Words => "words",
    Body => "body",
    Args => "args",
    Catch => "catch",
    OptimizedOut => "--optimized-out--",
    Anonymous => "anonymous",
}

/// Number of built-in symbols; symbol indices `1..=BUILTIN_COUNT` are theirs.
pub const BUILTIN_COUNT: usize = BUILTINS.len();

impl SymId {
    #[inline]
    pub const fn symbol(self) -> Symbol {
        Symbol(self as u32 + 1)
    }

    pub fn spelling(self) -> &'static str {
        BUILTINS[self as usize].1
    }
}

impl From<SymId> for Symbol {
    fn from(id: SymId) -> Self {
        id.symbol()
    }
}

#[derive(Debug)]
struct Entry {
    spelling: Box<str>,
    canon: Symbol,
    /// other spellings sharing this canon (only populated on canons)
    synonyms: Vec<Symbol>,
    marked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Tombstone,
    Occupied(Symbol),
}

const MIN_SLOTS: usize = 64;

pub struct SymbolTable {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    slots: Vec<Slot>,
    canons: usize,
    tombstones: usize,
    hasher: RandomState,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn fold(spelling: &str) -> String {
    spelling.to_lowercase()
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            // index 0 is never a valid symbol
            entries: vec![None],
            free: Vec::new(),
            slots: vec![Slot::Empty; MIN_SLOTS.max((BUILTIN_COUNT * 2).next_power_of_two())],
            canons: 0,
            tombstones: 0,
            hasher: RandomState::with_seeds(
                0x5eed_0001,
                0x5eed_0002,
                0x5eed_0003,
                0x5eed_0004,
            ),
        };
        for (id, text) in BUILTINS {
            let sym = table.intern(text);
            debug_assert_eq!(sym, id.symbol(), "builtin {text} interned out of order");
        }
        table
    }

    #[inline]
    fn hash(&self, folded: &str) -> usize {
        self.hasher.hash_one(folded) as usize
    }

    fn entry(&self, sym: Symbol) -> &Entry {
        self.entries[sym.0 as usize]
            .as_ref()
            .expect("symbol used after it was swept")
    }

    fn entry_mut(&mut self, sym: Symbol) -> &mut Entry {
        self.entries[sym.0 as usize]
            .as_mut()
            .expect("symbol used after it was swept")
    }

    fn new_entry(&mut self, entry: Entry) -> Symbol {
        match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(entry);
                Symbol(index)
            }
            None => {
                self.entries.push(Some(entry));
                Symbol((self.entries.len() - 1) as u32)
            }
        }
    }

    /// Slot index holding the canon for `folded`, or the first free slot.
    fn probe(&self, folded: &str) -> (usize, Option<Symbol>) {
        let mask = self.slots.len() - 1;
        let mut index = self.hash(folded) & mask;
        let mut first_free = None;
        loop {
            match self.slots[index] {
                Slot::Empty => return (first_free.unwrap_or(index), None),
                Slot::Tombstone => {
                    first_free.get_or_insert(index);
                }
                Slot::Occupied(sym) => {
                    if fold(&self.entry(sym).spelling) == folded {
                        return (index, Some(sym));
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Returns the symbol for `spelling`, interning it if needed.
    pub fn intern(&mut self, spelling: &str) -> Symbol {
        let folded = fold(spelling);
        let (slot, found) = self.probe(&folded);
        if let Some(canon) = found {
            let entry = self.entry(canon);
            if &*entry.spelling == spelling {
                return canon;
            }
            if let Some(&variant) = entry
                .synonyms
                .iter()
                .find(|&&s| &*self.entry(s).spelling == spelling)
            {
                return variant;
            }
            let variant = self.new_entry(Entry {
                spelling: spelling.into(),
                canon,
                synonyms: Vec::new(),
                marked: false,
            });
            self.entry_mut(canon).synonyms.push(variant);
            return variant;
        }

        let canon = self.new_entry(Entry {
            spelling: spelling.into(),
            canon: Symbol(0),
            synonyms: Vec::new(),
            marked: false,
        });
        self.entry_mut(canon).canon = canon;
        if self.slots[slot] == Slot::Tombstone {
            self.tombstones -= 1;
        }
        self.slots[slot] = Slot::Occupied(canon);
        self.canons += 1;
        if (self.canons + self.tombstones) * 4 >= self.slots.len() * 3 {
            self.rehash();
        }
        canon
    }

    /// Finds an already interned spelling without interning it.
    pub fn lookup(&self, spelling: &str) -> Option<Symbol> {
        let (_, canon) = self.probe(&fold(spelling));
        let canon = canon?;
        let entry = self.entry(canon);
        if &*entry.spelling == spelling {
            return Some(canon);
        }
        entry
            .synonyms
            .iter()
            .copied()
            .find(|&s| &*self.entry(s).spelling == spelling)
    }

    /// Rebuilds the slot array sized to the live canon count. Tombstones are
    /// dropped.
    fn rehash(&mut self) {
        let size = (self.canons * 2).next_power_of_two().max(MIN_SLOTS);
        let canons: Vec<Symbol> = self
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(sym) => Some(*sym),
                _ => None,
            })
            .collect();
        self.slots = vec![Slot::Empty; size];
        self.tombstones = 0;
        let mask = size - 1;
        for canon in canons {
            let mut index = self.hash(&fold(&self.entry(canon).spelling)) & mask;
            while self.slots[index] != Slot::Empty {
                index = (index + 1) & mask;
            }
            self.slots[index] = Slot::Occupied(canon);
        }
        log::trace!("symbol table rehashed to {size} slots ({} canons)", self.canons);
    }

    #[inline]
    pub fn canon(&self, sym: Symbol) -> Symbol {
        self.entry(sym).canon
    }

    #[inline]
    pub fn same(&self, a: Symbol, b: Symbol) -> bool {
        a == b || self.canon(a) == self.canon(b)
    }

    pub fn spelling(&self, sym: Symbol) -> &str {
        &self.entry(sym).spelling
    }

    /// Small integer id of a built-in symbol (or of a variant spelling of
    /// one), 0 otherwise.
    pub fn symbol_id(&self, sym: Symbol) -> u16 {
        let canon = self.canon(sym).0 as usize;
        if (1..=BUILTIN_COUNT).contains(&canon) {
            canon as u16
        } else {
            0
        }
    }

    pub fn sym_id(&self, sym: Symbol) -> Option<SymId> {
        match self.symbol_id(sym) {
            0 => None,
            id => Some(BUILTINS[id as usize - 1].0),
        }
    }

    #[inline]
    pub fn is(&self, sym: Symbol, id: SymId) -> bool {
        self.canon(sym) == id.symbol()
    }

    /// Number of live spellings (canons and variants).
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn canon_count(&self) -> usize {
        self.canons
    }

    // ── collection ────────────────────────────────────────────────

    pub(crate) fn clear_marks(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.marked = false;
        }
    }

    /// Marks a spelling and its canon live.
    pub(crate) fn mark(&mut self, sym: Symbol) {
        let Some(Some(entry)) = self.entries.get_mut(sym.0 as usize) else {
            return;
        };
        entry.marked = true;
        let canon = entry.canon;
        if let Some(Some(canon)) = self.entries.get_mut(canon.0 as usize) {
            canon.marked = true;
        }
    }

    /// Frees unmarked non-builtin spellings. Returns the number freed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for index in BUILTIN_COUNT + 1..self.entries.len() {
            let dead = matches!(&self.entries[index], Some(entry) if !entry.marked);
            if !dead {
                continue;
            }
            let Some(entry) = self.entries[index].take() else {
                continue;
            };
            let sym = Symbol(index as u32);
            if entry.canon == sym {
                if let Some(slot) = self.probe_occupied(sym, &entry.spelling) {
                    self.slots[slot] = Slot::Tombstone;
                    self.tombstones += 1;
                }
                self.canons -= 1;
            } else if let Some(Some(canon)) = self.entries.get_mut(entry.canon.0 as usize) {
                canon.synonyms.retain(|&s| s != sym);
            }
            self.free.push(index as u32);
            freed += 1;
        }
        freed
    }

    fn probe_occupied(&self, sym: Symbol, spelling: &str) -> Option<usize> {
        let mask = self.slots.len() - 1;
        let mut index = self.hash(&fold(spelling)) & mask;
        for _ in 0..self.slots.len() {
            match self.slots[index] {
                Slot::Empty => return None,
                Slot::Occupied(s) if s == sym => return Some(index),
                _ => {}
            }
            index = (index + 1) & mask;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_have_ids() {
        let table = SymbolTable::new();
        let ret = table.lookup("return").unwrap();
        assert_eq!(ret, SymId::Return.symbol());
        assert_eq!(table.sym_id(ret), Some(SymId::Return));
        assert!(table.symbol_id(ret) > 0);
    }

    #[test]
    fn case_variants_share_canon() {
        let mut table = SymbolTable::new();
        let a = table.intern("Foo");
        let b = table.intern("FOO");
        let c = table.intern("foo");
        assert_ne!(a, b);
        assert!(table.same(a, b));
        assert!(table.same(b, c));
        assert_eq!(table.canon(b), a);
        assert_eq!(table.spelling(b), "FOO");
        assert_eq!(table.intern("FOO"), b);
        let other = table.intern("bar-baz");
        assert!(!table.same(a, other));
    }

    #[test]
    fn variant_of_builtin_keeps_id() {
        let mut table = SymbolTable::new();
        let upper = table.intern("RETURN");
        assert_eq!(table.sym_id(upper), Some(SymId::Return));
        let other = table.intern("my-word");
        assert_eq!(table.symbol_id(other), 0);
    }

    #[test]
    fn sweep_leaves_tombstones_and_reuses() {
        let mut table = SymbolTable::new();
        let keep = table.intern("keep-me");
        let gone = table.intern("drop-me");
        let _variant = table.intern("DROP-ME");
        table.clear_marks();
        table.mark(keep);
        assert_eq!(table.sweep(), 2);
        assert!(table.lookup("drop-me").is_none());
        assert_eq!(table.lookup("keep-me"), Some(keep));
        // builtins survive without marks
        assert!(table.lookup("self").is_some());
        let again = table.intern("drop-me");
        assert_eq!(table.canon(again), again);
        let _ = gone;
    }

    #[test]
    fn grows_past_initial_slots() {
        let mut table = SymbolTable::new();
        let syms: Vec<Symbol> = (0..1000).map(|i| table.intern(&format!("word-{i}"))).collect();
        for (i, sym) in syms.iter().enumerate() {
            assert_eq!(table.lookup(&format!("WORD-{i}")), None);
            assert_eq!(table.lookup(&format!("word-{i}")), Some(*sym));
        }
    }
}
