use std::io::Write;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::boot;
use crate::chunk::ChunkSlots;
use crate::config::Settings;
use crate::device::DeviceTable;
use crate::error::{Error, ErrorId, Result};
use crate::eval::Evaluated;
use crate::gc::{self, GcStats, InterpRoots, RootProvider};
use crate::scan;
use crate::series::{Heap, SeriesId};
use crate::signal::SignalHandle;
use crate::symbol::SymbolTable;
use crate::value::{Kind, Value};
use crate::Symbol;

/// One live call, as seen by its dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub varlist: SeriesId,
    /// paramlist the frame was built for; the varlist's keylist
    pub keylist: SeriesId,
    /// paramlist whose dispatcher is running now
    pub phase: SeriesId,
    /// target frame of a definitional RETURN, if this is one
    pub binding: Option<SeriesId>,
    pub slots: ChunkSlots,
    pub label: Option<Symbol>,
    /// where in the caller's source the call was made
    pub near: Option<(SeriesId, usize)>,
}

/// Paramlists the evaluator recognises by identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct Specials {
    pub return_: Option<SeriesId>,
    pub break_: Option<SeriesId>,
    pub continue_: Option<SeriesId>,
    pub quit: Option<SeriesId>,
    pub error_keylist: Option<SeriesId>,
    pub port_keylist: Option<SeriesId>,
}

impl Specials {
    pub fn is(&self, label: Value, special: Option<SeriesId>) -> bool {
        match (label.as_function(), special) {
            (Some(f), Some(p)) => label.kind == Kind::Function && f.paramlist == p,
            _ => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EvalStats {
    pub steps: u64,
    pub calls: u64,
    pub recycles: u64,
}

pub type BreakpointHook = Box<dyn FnMut(&mut Interp) -> Result<Value>>;

/// Byte sink that can be read back after the interpreter wrote to it.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct Interp {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub settings: Settings,
    pub signals: SignalHandle,
    pub(crate) frames: Vec<Frame>,
    pub(crate) guards: Vec<Value>,
    pub(crate) data_stack: Vec<Value>,
    /// process-wide roots: lib, natives, boot leftovers
    pub(crate) root: SeriesId,
    /// per-task roots
    pub(crate) task: SeriesId,
    pub lib: SeriesId,
    pub(crate) specials: Specials,
    pub(crate) devices: DeviceTable,
    pub(crate) breakpoint: Option<BreakpointHook>,
    pub(crate) output: Box<dyn Write>,
    pub stats: EvalStats,
}

impl Interp {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate().map_err(|msg| Error::Panic(msg.to_string()))?;
        let signals = SignalHandle::new(settings.eval_dose);
        let mut heap = Heap::new(settings.heap.clone(), settings.chunk_cells, signals.clone());
        // nothing is rooted until boot finishes
        heap.disable_gc();
        let root = heap.make_array(&[]);
        let task = heap.make_array(&[]);
        let mut interp = Self {
            heap,
            symbols: SymbolTable::new(),
            settings,
            signals,
            frames: Vec::new(),
            guards: Vec::new(),
            data_stack: Vec::new(),
            root,
            task,
            lib: root,
            specials: Specials::default(),
            devices: DeviceTable::standard(),
            breakpoint: None,
            output: Box::new(std::io::stdout()),
            stats: EvalStats::default(),
        };
        interp.lib = interp.make_context(Kind::Module, &[]);
        interp.add_root(Value::context(Kind::Module, interp.lib))?;
        boot::boot(&mut interp)?;
        interp.heap.enable_gc();
        info!(
            "boot complete: {} series, {} symbols",
            interp.heap.live_count(),
            interp.symbols.len()
        );
        Ok(interp)
    }

    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub fn set_breakpoint_hook(&mut self, hook: BreakpointHook) {
        self.breakpoint = Some(hook);
    }

    pub fn write_out(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|err| Error::raised(ErrorId::WriteError).with_message(err.to_string()))
    }

    // ── roots and guards ─────────────────────────────────────────

    /// Keeps `value` alive for the life of the interpreter.
    pub fn add_root(&mut self, value: Value) -> Result<()> {
        self.heap.append(self.root, value)
    }

    pub fn add_task_root(&mut self, value: Value) -> Result<()> {
        self.heap.append(self.task, value)
    }

    /// Runs `body` with `value` on the guard stack.
    pub fn with_guard<R>(&mut self, value: Value, body: impl FnOnce(&mut Self) -> R) -> R {
        let mark = self.guards.len();
        self.guards.push(value);
        let result = body(self);
        self.guards.truncate(mark);
        result
    }

    pub fn guard_depth(&self) -> usize {
        self.guards.len()
    }

    pub fn push_guard(&mut self, value: Value) {
        self.guards.push(value);
    }

    pub fn drop_guards(&mut self, depth: usize) {
        self.guards.truncate(depth);
    }

    pub fn data_depth(&self) -> usize {
        self.data_stack.len()
    }

    pub fn push_data(&mut self, value: Value) {
        self.data_stack.push(value);
    }

    /// Pops everything above `depth` into a new block.
    pub fn pop_data_to_array(&mut self, depth: usize) -> SeriesId {
        let array = self.heap.make_array(&self.data_stack[depth..]);
        self.data_stack.truncate(depth);
        array
    }

    pub fn recycle(&mut self) -> GcStats {
        let mut seeds = Vec::with_capacity(256);
        InterpRoots {
            root: self.root,
            task: self.task,
            frames: &self.frames,
            guards: &self.guards,
            data_stack: &self.data_stack,
            chunks: &self.heap.chunks,
        }
        .visit_roots(&mut |value| seeds.push(*value));
        let stats = gc::recycle(&mut self.heap, &mut self.symbols, &seeds);
        self.heap.reset_ballast();
        self.stats.recycles += 1;
        debug!(
            "recycle: {} series swept, {} live, {} symbols freed",
            stats.swept, stats.live, stats.symbols_swept
        );
        stats
    }

    // ── frames ───────────────────────────────────────────────────

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Argument `n` (1-based) of a frame.
    #[inline]
    pub fn arg(&self, frame: &Frame, n: usize) -> Value {
        self.heap.chunks.get(frame.slots, n)
    }

    /// Whether refinement `n` was used.
    #[inline]
    pub fn refine(&self, frame: &Frame, n: usize) -> bool {
        self.arg(frame, n).is_truthy()
    }

    pub fn set_arg(&mut self, frame: &Frame, n: usize, value: Value) {
        self.heap.chunks.set(frame.slots, n, value);
    }

    // ── top level ────────────────────────────────────────────────

    /// Loads source text as a block bound into `lib`, adding fields for
    /// any words `lib` lacks.
    pub fn load(&mut self, text: &str) -> Result<SeriesId> {
        let block = scan::load(self, text)?;
        self.bind_adding(block, self.lib)?;
        Ok(block)
    }

    pub fn do_text(&mut self, text: &str) -> Result<Value> {
        let block = self.load(text)?;
        self.with_guard(Value::block(block), |interp| interp.run(block))
    }

    /// Evaluates a block to completion at the top level. Throws that escape
    /// become errors (or a quit request).
    pub fn run(&mut self, block: SeriesId) -> Result<Value> {
        let guards = self.guards.len();
        let data = self.data_stack.len();
        let result = self.do_array(block, 0, None);
        if result.is_err() {
            self.guards.truncate(guards);
            self.data_stack.truncate(data);
        }
        match result? {
            Evaluated::Value(value) => Ok(value),
            Evaluated::End => Ok(Value::VOID),
            Evaluated::Thrown { label, arg } => Err(self.uncaught(label, arg)),
        }
    }

    /// Evaluates values supplied by the host.
    pub fn run_values(&mut self, values: &[Value]) -> Result<Value> {
        let block = self.heap.make_array(values);
        self.with_guard(Value::block(block), |interp| interp.run(block))
    }

    pub(crate) fn uncaught(&self, label: Value, arg: Value) -> Error {
        if self.specials.is(label, self.specials.quit) {
            let code = match arg.kind {
                Kind::Integer => arg.as_integer().unwrap_or(0) as i32,
                Kind::Void | Kind::Blank => 0,
                _ if arg.is_truthy() => 0,
                _ => 1,
            };
            return Error::Quit(code);
        }
        Error::with_args(ErrorId::NoCatch, vec![label, arg])
    }

    /// Looks up a word in `lib` by spelling.
    pub fn lib_value(&self, name: &str) -> Option<Value> {
        let sym = self.symbols.lookup(name)?;
        let index = self.find_in_context(self.lib, sym)?;
        self.heap.at(self.lib, index).ok()
    }

    /// Sets (adding if needed) a word in `lib`.
    pub fn set_lib(&mut self, name: &str, value: Value) -> Result<()> {
        let sym = self.symbols.intern(name);
        let index = self.append_context(self.lib, sym)?;
        self.set_context_var(self.lib, index, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_and_evaluates() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        assert_eq!(interp.do_text("1 + 2").unwrap(), Value::integer(3));
        assert!(interp.lib_value("append").is_some());
    }

    #[test]
    fn guards_are_scoped() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        let depth = interp.guard_depth();
        interp.with_guard(Value::BLANK, |interp| {
            assert_eq!(interp.guard_depth(), depth + 1);
        });
        assert_eq!(interp.guard_depth(), depth);
    }

    #[test]
    fn print_goes_to_output() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        let out = OutputBuffer::new();
        interp.set_output(Box::new(out.clone()));
        interp.do_text("print 42").unwrap();
        assert_eq!(out.contents(), "42\n");
    }

    #[test]
    fn quit_becomes_exit_request() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        let err = interp.do_text("quit/return 3").unwrap_err();
        assert!(matches!(err, Error::Quit(3)));
    }
}
