//! Owns the opened drive and index for as long as the device is served.

use crate::backend::{Aligned, BlockBackend};
use crate::index::SqliteIndex;
use crate::remap::Remapper;
use anyhow::{bail, Context, Result};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::sync::Arc;
use tape::{FileTape, SequentialDrive, TapeDevice};

/// Block size of an emulated tape when none is configured.
pub const DEFAULT_FILE_BLOCK_SIZE: u64 = 4096;

type Drive = Box<dyn SequentialDrive>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Tape drive, or a regular file to emulate one
    pub drive: PathBuf,
    /// Logical capacity in bytes
    pub size: u64,
    /// Overrides the block size reported by the drive
    pub block_size: Option<u64>,
    /// Index database file
    pub index: PathBuf,
    /// Namespace inside the index database
    pub namespace: String,
    pub read_only: bool,
    /// Use a regular file as the tape, created if missing
    pub emulate: bool,
    /// Only accept single, block-aligned blocks
    pub strict: bool,
}

fn open_drive(config: &Config) -> Result<(Drive, u64)> {
    let path = &config.drive;
    let is_tape = match std::fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_char_device() => true,
        Ok(metadata) if metadata.is_file() => false,
        Ok(_) => bail!("{} is neither a tape drive nor a regular file", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && config.emulate => false,
        Err(e) if e.kind() == io::ErrorKind::NotFound => bail!(
            "drive {} does not exist, pass --emulate to create a file emulating one",
            path.display()
        ),
        Err(e) => return Err(e).with_context(|| format!("unable to open drive {}", path.display())),
    };

    if !is_tape {
        let block_size = config.block_size.unwrap_or(DEFAULT_FILE_BLOCK_SIZE);
        log::info!("emulating a tape drive in {} with block size {block_size}", path.display());

        let tape = FileTape::open(path, block_size, config.read_only)
            .with_context(|| format!("unable to open {}", path.display()))?;
        return Ok((Box::new(tape), block_size));
    }

    let tape = TapeDevice::open(path, config.read_only)
        .with_context(|| format!("unable to open tape drive {}", path.display()))?;
    if let Some(size) = config.block_size {
        let size = u32::try_from(size).with_context(|| format!("block size {size} is too large"))?;
        tape.set_block_size(size).with_context(|| format!("unable to set block size {size}"))?;
    }
    let block_size = tape
        .native_block_size()
        .with_context(|| format!("unable to query block size of {}", path.display()))?;

    log::info!("opened tape drive {} with block size {block_size}", path.display());
    Ok((Box::new(tape), block_size))
}

pub struct Session {
    remapper: Arc<Remapper<Drive, SqliteIndex>>,
    backend: Arc<dyn BlockBackend>,
    block_size: u64,
}

impl Session {
    pub fn open(config: &Config) -> Result<Self> {
        let (drive, block_size) = open_drive(config)?;
        if config.size % block_size != 0 {
            bail!("size {} is not a multiple of block size {block_size}", config.size);
        }

        let index = SqliteIndex::open(&config.index, &config.namespace)
            .with_context(|| format!("unable to open index {}", config.index.display()))?;
        let remapper = Arc::new(Remapper::new(drive, index, config.size, block_size)?);

        let backend: Arc<dyn BlockBackend> = if config.strict {
            Arc::new(Aligned::new(remapper.clone(), block_size))
        } else {
            remapper.clone()
        };

        Ok(Self {
            remapper,
            backend,
            block_size,
        })
    }

    /// Shared handle for the serving layer.
    pub fn backend(&self) -> Arc<dyn BlockBackend> {
        self.backend.clone()
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Release the drive and close the index.
    ///
    /// Fails if a handle from [`Session::backend`] is still alive; the index is then closed
    /// whenever the last handle goes away.
    pub fn close(self) -> Result<()> {
        let Self { remapper, backend, .. } = self;
        drop(backend);

        let remapper = match Arc::try_unwrap(remapper) {
            Ok(remapper) => remapper,
            Err(_) => bail!("device is still in use"),
        };
        let (_drive, index) = remapper.into_parts();
        index.close().context("unable to close index")
    }
}
