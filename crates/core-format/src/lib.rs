//! Format compiler: parses a one-line template into a fixed execution
//! plan of output slots and the tag handlers that fill them.
//!
//! This crate owns the closed formatter-letter table and produces a
//! [`compile::Program`] that `core-dispatch` and `core-render` consume;
//! it never touches live tag traffic itself.

mod compile;
mod error;
mod grammar;
mod handler;
mod letters;
mod slot;
mod tag;

pub use compile::{compile, CompiledTemplate, Program, KEY, MAIN};
pub use error::CompileError;
pub use handler::{Handler, Parser};
pub use slot::{DynamicSlot, Slot, Synthetic, ValueKind};
pub use tag::{origin, TagId, TagRecord, END_OF_TRANSACTION, TAG_COUNT};
