use crate::TapeDevice;
use std::io::{self, Read, Write};

/// Minimal set of primitives a sequential medium has to offer.
///
/// Transfers always move exactly one block and advance the head by one block. A write is only
/// valid at end-of-data: on real media, writing anywhere else makes that spot the new end and
/// everything behind it unreachable.
pub trait SequentialDrive: Send {
    /// Transfer unit of the medium, in bytes.
    fn native_block_size(&self) -> io::Result<u64>;

    /// Place the head at physical block `block`, for a following read.
    fn seek_to_block(&mut self, block: u64) -> io::Result<()>;

    /// Place the head right after the last block ever written.
    fn seek_to_end_of_data(&mut self) -> io::Result<()>;

    /// Physical block the head is at.
    fn tell(&mut self) -> io::Result<u64>;

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl<T: SequentialDrive + ?Sized> SequentialDrive for Box<T> {
    fn native_block_size(&self) -> io::Result<u64> {
        (**self).native_block_size()
    }

    fn seek_to_block(&mut self, block: u64) -> io::Result<()> {
        (**self).seek_to_block(block)
    }

    fn seek_to_end_of_data(&mut self) -> io::Result<()> {
        (**self).seek_to_end_of_data()
    }

    fn tell(&mut self) -> io::Result<u64> {
        (**self).tell()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_block(buf)
    }

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_block(buf)
    }
}

fn short_transfer(what: &str, done: usize, expected: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("short {what}: {done} of {expected} bytes"),
    )
}

impl SequentialDrive for TapeDevice {
    fn native_block_size(&self) -> io::Result<u64> {
        match self.block_size()? {
            0 => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "drive is in variable-block mode, set a fixed block size first",
            )),
            size => Ok(size as u64),
        }
    }

    fn seek_to_block(&mut self, block: u64) -> io::Result<()> {
        TapeDevice::seek_to_block(self, block)
    }

    fn seek_to_end_of_data(&mut self) -> io::Result<()> {
        TapeDevice::seek_to_end_of_data(self)
    }

    fn tell(&mut self) -> io::Result<u64> {
        TapeDevice::tell(self)
    }

    // In fixed-block mode one read(2) of one block length transfers exactly one tape block,
    // so a partial result means a filemark or blank tape, not a retryable short read.
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let count = self.file().read(buf)?;
        if count != buf.len() {
            return Err(short_transfer("read", count, buf.len()));
        }
        Ok(())
    }

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        let count = self.file().write(buf)?;
        if count != buf.len() {
            return Err(short_transfer("write", count, buf.len()));
        }
        Ok(())
    }
}
