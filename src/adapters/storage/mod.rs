//! Trade journal adapters
//!
//! - `FileJournal`: one JSON document per trade on local disk
//! - `MemoryJournal`: in-process journal with write history, for tests and
//!   dry runs

mod file;
mod memory;

pub use file::FileJournal;
pub use memory::MemoryJournal;
