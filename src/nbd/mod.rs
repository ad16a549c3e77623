//! Minimal server side of the NBD protocol (fixed newstyle negotiation, simple replies).

mod proto;
mod server;

use std::io;
use thiserror::Error;

pub use server::{handle, Export, Options};

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic {got:#x}, expected {expected:#x}")]
    BadMagic { expected: u64, got: u64 },
    #[error("option data of {0} bytes is too large")]
    OptionTooLarge(u32),
    #[error("request of {0} bytes is too large")]
    RequestTooLarge(u32),
    #[error("no export named {0:?}")]
    UnknownExport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
