//! OS virtual memory primitives. Only the virtual space layer talks to this module.

mod memory;

pub use self::memory::*;
