//! Binary serialization primitives.
//!
//! Wire and checkpoint formats in this workspace are hand-written,
//! deterministic byte layouts: little-endian integers, var-ints with the
//! standard 0xFD/0xFE/0xFF prefixes, and length-prefixed byte strings.
//! This crate provides the writer, the bounds-checked reader, and the
//! [`Serializable`] trait the rest of the stack implements.

pub mod binary_writer;
pub mod error;
pub mod memory_reader;
pub mod serializable;

pub use binary_writer::BinaryWriter;
pub use error::{IoError, IoResult};
pub use memory_reader::MemoryReader;
pub use serializable::{helper, Serializable, SerializableExt};
