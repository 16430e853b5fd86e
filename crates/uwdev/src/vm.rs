//! The conversation bytecode VM: a stack machine over a flat 16-bit
//! memory, with host-provided "imported functions" reached through the
//! `CALLI` opcode.

pub mod globals;
pub mod imports;
pub mod machine;
pub mod subst;

pub use imports::{ImportHost, ImportTable, StandardImports};
pub use machine::{MemoryLayout, Vm, VmError, VmState, DEFAULT_STEP_BUDGET};
