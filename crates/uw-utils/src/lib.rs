//! Low-level byte and bit plumbing shared by the archive codecs.

pub mod bits;
pub mod reader;
pub mod writer;
