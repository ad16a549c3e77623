//! Serve a tape drive as a random-access block device.
//!
//! Tapes can only append at end-of-data and seek to whole blocks. The [`Remapper`] turns that
//! into arbitrary-offset reads and writes: every written block is appended to the tape and an
//! [`index`] remembers where the newest copy of each logical block lives.

pub mod backend;
pub mod error;
pub mod index;
pub mod nbd;
pub mod remap;
pub mod session;

pub use backend::{Aligned, BlockBackend};
pub use error::{Error, Result};
pub use index::{LocationIndex, MemoryIndex, SqliteIndex};
pub use remap::{Direction, Remapper};
pub use session::{Config, Session};
