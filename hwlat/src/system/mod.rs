//! Host resources owned by a detector for the duration of a session
//!
//! - debugfs mount and control-file I/O
//! - detector kernel module
//! - C-state suppression handle
//! - SMI counters (optional)
//! - cooperative interrupt flag

pub mod cstate;
pub mod debugfs;
pub mod interrupt;
pub mod kmod;
pub mod smi;

// Re-export common types
pub use cstate::CStateGuard;
pub use debugfs::DebugFs;
pub use interrupt::Interrupt;
pub use kmod::{ModuleLoader, ModuleOrigin};
pub use smi::{SmiCounter, SmiDelta};
