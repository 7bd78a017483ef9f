//! Error taxonomy.
//!
//! Language-level failures travel as [`Error::Raised`] and become ERROR!
//! contexts when trapped. `Halt` unwinds to the outermost trap only and
//! `Panic` is never caught.

use thiserror::Error;

use crate::chunk::ChunkError;
use crate::compress::CompressError;
use crate::device::DeviceError;
use crate::scan::ScanError;
use crate::value::Value;
use crate::{SeriesId, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Syntax,
    Script,
    Math,
    Access,
    User,
    Internal,
}

impl ErrorCategory {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Script => "script",
            ErrorCategory::Math => "math",
            ErrorCategory::Access => "access",
            ErrorCategory::User => "user",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "Syntax",
            ErrorCategory::Script => "Script",
            ErrorCategory::Math => "Math",
            ErrorCategory::Access => "Access",
            ErrorCategory::User => "User",
            ErrorCategory::Internal => "Internal",
        }
    }

    fn base(self) -> u32 {
        match self {
            ErrorCategory::Syntax => 200,
            ErrorCategory::Script => 300,
            ErrorCategory::Math => 400,
            ErrorCategory::Access => 500,
            ErrorCategory::User => 800,
            ErrorCategory::Internal => 900,
        }
    }
}

macro_rules! error_ids {
    ($($category:ident {
        $($variant:ident = $n:literal, $name:literal, $template:literal;)*
    })*) => {
        /// Every error the runtime can raise.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorId {
            $($($variant,)*)*
        }

        impl ErrorId {
            pub fn category(self) -> ErrorCategory {
                match self {
                    $($(ErrorId::$variant => ErrorCategory::$category,)*)*
                }
            }

            /// The id word, as seen by `error/id`.
            pub fn name(self) -> &'static str {
                match self {
                    $($(ErrorId::$variant => $name,)*)*
                }
            }

            pub fn code(self) -> u32 {
                match self {
                    $($(ErrorId::$variant => ErrorCategory::$category.base() + $n,)*)*
                }
            }

            /// Message with `:arg1` `:arg2` `:arg3` placeholders.
            pub fn template(self) -> &'static str {
                match self {
                    $($(ErrorId::$variant => $template,)*)*
                }
            }

            pub fn from_name(name: &str) -> Option<ErrorId> {
                match name {
                    $($($name => Some(ErrorId::$variant),)*)*
                    _ => None,
                }
            }
        }
    };
}

error_ids! {
    Syntax {
        Invalid = 0, "invalid", "invalid :arg1 -- :arg2";
        Missing = 1, "missing", "missing :arg1 at :arg2";
    }
    Script {
        NoValue = 0, "no-value", ":arg1 has no value";
        NotBound = 1, "not-bound", ":arg1 word is not bound to a context";
        NoArg = 2, "no-arg", ":arg1 is missing its :arg2 argument";
        ExpectArg = 3, "expect-arg", ":arg1 does not allow :arg2 for its :arg3 argument";
        NeedValue = 4, "need-value", ":arg1 needs a value";
        NoCatch = 5, "no-catch", "no catch for throw: :arg1";
        Protected = 6, "protected", "protected value or series - cannot modify";
        Locked = 7, "locked-word", "locked word or series - cannot modify: :arg1";
        BadRefine = 8, "bad-refine", "incompatible or invalid refinement: :arg1";
        BadMake = 9, "bad-make-arg", "cannot MAKE/TO :arg1 from: :arg2";
        BadPathPick = 10, "bad-path-pick", "cannot access :arg1 in path :arg2";
        BadPathSet = 11, "bad-path-set", "cannot set :arg1 in path :arg2";
        BadPathType = 12, "bad-path-type", "path :arg1 is not valid for :arg2 type";
        OutOfRange = 13, "out-of-range", "value out of range: :arg1";
        InvalidArg = 14, "invalid-arg", "invalid argument: :arg1";
        InvalidType = 15, "invalid-type", ":arg1 type is not allowed here";
        CannotUse = 16, "cannot-use", "cannot use :arg1 on :arg2 value";
        ExpressionBarrier = 17, "expression-barrier", "expression barrier hit while fulfilling argument";
        NotInContext = 18, "not-in-context", ":arg1 is not in the specified context";
        FrameNotOnStack = 19, "frame-not-on-stack", "frame is no longer running";
        InvalidVarargs = 20, "varargs-no-stack", "call made to VARARGS! whose frame has ended";
        BadResume = 21, "bad-resume", "breakpoint resumed with a value but no expression awaits it";
        StackOverflow = 22, "stack-overflow", "stack overflow";
        BadFuncDef = 23, "bad-func-def", "invalid function definition: :arg1";
        Hidden = 24, "hidden", "not allowed to access hidden field";
        NotDone = 25, "not-done", "reserved for future use (or not yet implemented)";
        ApplyTooMany = 26, "apply-too-many", "too many arguments in apply";
        BadCompression = 27, "bad-compression", "invalid compressed data: :arg1";
        SizeLimit = 28, "size-limit", "maximum limit reached: :arg1";
        Unwind = 29, "unwind", "non-local exit :arg1 reached a frame that is not running";
    }
    Math {
        ZeroDivide = 0, "zero-divide", "attempt to divide by zero";
        Overflow = 1, "overflow", "math or number overflow";
        Positive = 2, "positive", "positive number required";
    }
    Access {
        CannotOpen = 0, "cannot-open", "cannot open: :arg1 reason: :arg2";
        NotOpen = 1, "not-open", "port is not open: :arg1";
        ReadError = 2, "read-error", "read failed: :arg1 reason: :arg2";
        WriteError = 3, "write-error", "write failed: :arg1 reason: :arg2";
        NoScheme = 4, "no-scheme", "missing port scheme: :arg1";
        Security = 5, "security", "security violation: :arg1";
        NoPortAction = 6, "no-port-action", "this port does not support: :arg1";
    }
    User {
        Message = 0, "message", ":arg1";
    }
    Internal {
        Misc = 0, "misc", "RESERVED ERROR (should never happen): :arg1";
        NoMemory = 1, "no-memory", "not enough memory: :arg1 bytes";
    }
}

/// A raised language error before it has been turned into an ERROR! context.
#[derive(Debug, Clone)]
pub struct Raised {
    pub id: ErrorId,
    pub args: Vec<Value>,
    /// label of the function that was running
    pub label: Option<Symbol>,
    /// source position: array and index
    pub near: Option<(SeriesId, usize)>,
    /// an ERROR! varlist made by user code (`fail make error! ...`)
    pub context: Option<SeriesId>,
    /// host-side text used instead of the template (I/O, codec, loader)
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{} error: {}", .0.id.category().title(), .0.id.name())]
    Raised(Box<Raised>),
    #[error("halted")]
    Halt,
    /// Process exit requested by QUIT.
    #[error("quit with status {0}")]
    Quit(i32),
    #[error("panic: {0}")]
    Panic(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn raised(id: ErrorId) -> Self {
        Self::with_args(id, Vec::new())
    }

    pub fn with_args(id: ErrorId, args: Vec<Value>) -> Self {
        Error::Raised(Box::new(Raised {
            id,
            args,
            label: None,
            near: None,
            context: None,
            message: None,
        }))
    }

    pub fn arg(id: ErrorId, arg: Value) -> Self {
        Self::with_args(id, vec![arg])
    }

    pub fn from_context(varlist: SeriesId, id: ErrorId) -> Self {
        Error::Raised(Box::new(Raised {
            id,
            args: Vec::new(),
            label: None,
            near: None,
            context: Some(varlist),
            message: None,
        }))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Error::Raised(ref mut raised) = self {
            raised.message = Some(message.into());
        }
        self
    }

    pub fn id(&self) -> Option<ErrorId> {
        match self {
            Error::Raised(raised) => Some(raised.id),
            _ => None,
        }
    }

    /// Fills in where/near if no inner frame has done so already.
    pub fn annotate(mut self, label: Option<Symbol>, near: Option<(SeriesId, usize)>) -> Self {
        if let Error::Raised(ref mut raised) = self {
            if raised.label.is_none() {
                raised.label = label;
            }
            if raised.near.is_none() {
                raised.near = near;
            }
        }
        self
    }

    /// Process exit status for this error when it reaches the host.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Raised(_) | Error::Halt => 1,
            Error::Quit(code) => *code,
            Error::Panic(_) => 255,
        }
    }
}

impl From<ChunkError> for Error {
    fn from(err: ChunkError) -> Self {
        Error::Panic(err.to_string())
    }
}

impl From<CompressError> for Error {
    fn from(err: CompressError) -> Self {
        match err {
            CompressError::SizeLimit(max) => {
                Error::arg(ErrorId::SizeLimit, Value::integer(max as i64))
            }
            other => Error::raised(ErrorId::BadCompression).with_message(other.to_string()),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        let id = match err {
            DeviceError::Unsupported(_) => ErrorId::NoPortAction,
            DeviceError::NotOpen => ErrorId::NotOpen,
            DeviceError::Open { .. } => ErrorId::CannotOpen,
            DeviceError::Write { .. } => ErrorId::WriteError,
            DeviceError::Read { .. } | DeviceError::Io(_) => ErrorId::ReadError,
        };
        Error::raised(id).with_message(err.to_string())
    }
}

impl From<ScanError> for Error {
    fn from(err: ScanError) -> Self {
        let id = match err {
            ScanError::Missing { .. } => ErrorId::Missing,
            _ => ErrorId::Invalid,
        };
        Error::raised(id).with_message(err.to_string())
    }
}
