//! Positioning and transfer primitives for sequential tape media.
//!
//! [`SequentialDrive`] is the capability the block remapper drives. [`TapeDevice`] implements
//! it with the Linux `mtio` ioctls, while [`FileTape`] and [`MemoryTape`] emulate a drive for
//! testing and for running without hardware.

mod device;
mod drive;
mod emulated;

pub use device::{Operation, TapeDevice};
pub use drive::SequentialDrive;
pub use emulated::{FileTape, MemoryTape};
