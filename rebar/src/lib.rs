pub mod boot;
pub mod chunk;
pub mod compress;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod eval;
pub mod feed;
pub mod function;
pub mod gc;
pub mod handle;
pub mod interp;
pub mod mold;
pub mod natives;
pub mod path;
pub mod scan;
pub mod series;
pub mod signal;
pub mod symbol;
pub mod value;

pub use config::{HeapSettings, Settings};
pub use device::SecurityPolicy;
pub use error::{Error, ErrorId, Result};
pub use eval::Evaluated;
pub use interp::{Interp, OutputBuffer};
pub use series::SeriesId;
pub use symbol::Symbol;
pub use value::{Kind, Value};

/// Version reported by `--version` and `system`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
