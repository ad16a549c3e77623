use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The logical block has never been written. Callers of the index treat this as zeroes.
    #[error("location does not exist")]
    NotExists,
    #[error("tape I/O error: {0}")]
    Hardware(#[source] io::Error),
    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("corrupt index entry for block {0}")]
    CorruptEntry(u64),
    /// A stored key is not an 8-byte block number, so there is no block to name.
    #[error("corrupt index key of {0} bytes")]
    CorruptKey(usize),
    #[error("invalid index namespace {0:?}")]
    InvalidNamespace(String),
    #[error("chunk of {len} bytes does not match block size {block_size}")]
    ChunkSizeMismatch { len: usize, block_size: u64 },
    #[error("offset {offset} is not a multiple of block size {block_size}")]
    UnalignedOffset { offset: u64, block_size: u64 },
    #[error("invalid block size {0}")]
    InvalidBlockSize(u64),
    #[error("range of {len} bytes at offset {offset} is not addressable")]
    OutOfRange { offset: u64, len: usize },
}

impl Error {
    /// Whether this error comes from the index's backing store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_)
                | Error::CorruptEntry(_)
                | Error::CorruptKey(_)
                | Error::InvalidNamespace(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
