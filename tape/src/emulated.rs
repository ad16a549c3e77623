//! Drives without tape hardware behind them.

use crate::SequentialDrive;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

fn check_len(len: usize, block_size: u64) -> io::Result<()> {
    if len as u64 != block_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("transfer of {len} bytes does not match block size {block_size}"),
        ));
    }
    Ok(())
}

/// A regular file used as tape: physical block `n` lives at byte `n * block_size`, and
/// end-of-data is the end of the file.
pub struct FileTape {
    file: File,
    block_size: u64,
}

impl FileTape {
    pub fn open<P: AsRef<Path>>(path: P, block_size: u64, read_only: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;
        Ok(Self::from_file(file, block_size))
    }

    pub fn from_file(file: File, block_size: u64) -> Self {
        Self { file, block_size }
    }
}

impl SequentialDrive for FileTape {
    fn native_block_size(&self) -> io::Result<u64> {
        Ok(self.block_size)
    }

    fn seek_to_block(&mut self, block: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(block * self.block_size)).map(|_| ())
    }

    fn seek_to_end_of_data(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::End(0)).map(|_| ())
    }

    fn tell(&mut self) -> io::Result<u64> {
        let position = self.file.stream_position()?;
        Ok(position / self.block_size)
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        check_len(buf.len(), self.block_size)?;
        self.file.read_exact(buf)
    }

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        check_len(buf.len(), self.block_size)?;
        self.file.write_all(buf)
    }
}

/// An in-memory tape.
///
/// Unlike [`FileTape`] it keeps the one property of real media that matters to callers:
/// writing anywhere but at end-of-data discards everything behind the written block.
#[derive(Debug)]
pub struct MemoryTape {
    blocks: Vec<Vec<u8>>,
    head: usize,
    block_size: u64,
}

impl MemoryTape {
    pub fn new(block_size: u64) -> Self {
        Self {
            blocks: Vec::new(),
            head: 0,
            block_size,
        }
    }

    /// A tape that already holds `blocks`, head at BOT.
    pub fn with_blocks(block_size: u64, blocks: Vec<Vec<u8>>) -> Self {
        Self {
            blocks,
            head: 0,
            block_size,
        }
    }

    /// Everything between BOT and end-of-data.
    pub fn blocks(&self) -> &[Vec<u8>] {
        &self.blocks
    }
}

impl SequentialDrive for MemoryTape {
    fn native_block_size(&self) -> io::Result<u64> {
        Ok(self.block_size)
    }

    fn seek_to_block(&mut self, block: u64) -> io::Result<()> {
        if block > self.blocks.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {block} is beyond end-of-data ({})", self.blocks.len()),
            ));
        }
        self.head = block as usize;
        Ok(())
    }

    fn seek_to_end_of_data(&mut self) -> io::Result<()> {
        self.head = self.blocks.len();
        Ok(())
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.head as u64)
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        check_len(buf.len(), self.block_size)?;
        let block = self
            .blocks
            .get(self.head)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "blank check: read at end-of-data")
            })?;

        buf.copy_from_slice(block);
        self.head += 1;
        Ok(())
    }

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        check_len(buf.len(), self.block_size)?;
        self.blocks.truncate(self.head);
        self.blocks.push(buf.to_vec());
        self.head += 1;
        Ok(())
    }
}
