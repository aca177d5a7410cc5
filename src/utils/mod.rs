//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod error;
mod oncemap;

pub use error::P4PerfError;
pub use print::logger_init;

pub(crate) use oncemap::OnceMap;
