//! Utilities shared by the allocator: address arithmetic, constants, options, logging and OS memory.

pub mod address;
pub mod constants;
pub mod conversions;
pub mod logger;
pub mod options;
pub mod os;

#[cfg(test)]
pub mod test_util;

pub use self::address::Address;
