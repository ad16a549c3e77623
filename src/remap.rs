//! Random access on top of an append-only medium.
//!
//! Every logical block write lands at the current end-of-data and the index is pointed at it;
//! older copies stay on tape and are never reused. Reads follow the index and fill blocks that
//! were never written with zeroes.

use crate::index::LocationIndex;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::borrow::Cow;
use tape::SequentialDrive;

/// Which kind of transfer last moved the head.
///
/// Writes are only valid at end-of-data. A read parks the head somewhere inside the recorded
/// area, so the next write must seek to end-of-data first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Logical blocks touched by a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// First logical block
    first: u64,
    /// Number of blocks, at least one
    count: u64,
    /// Offset of the range inside the first block
    lower: usize,
}

impl Span {
    fn new(offset: u64, len: usize, block_size: u64) -> Result<Self> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::OutOfRange { offset, len })?;
        let first = offset / block_size;
        let last = (end - 1) / block_size;

        Ok(Self {
            first,
            count: last - first + 1,
            lower: (offset % block_size) as usize,
        })
    }

    /// Whether the range starts and ends on block boundaries.
    fn is_aligned(&self, len: usize, block_size: u64) -> bool {
        self.lower == 0 && len as u64 % block_size == 0
    }
}

/// The drive, the index and where the head was left. Only ever touched under the lock.
struct State<D, I> {
    drive: D,
    index: I,
    direction: Direction,
}

impl<D: SequentialDrive, I: LocationIndex> State<D, I> {
    /// Read the whole blocks of `span` into one buffer, zeroes for blocks never written.
    fn read_span(&mut self, span: Span, block_size: u64) -> Result<Vec<u8>> {
        let mut scratch = vec![0u8; (span.count * block_size) as usize];
        self.direction = Direction::Read;

        for (block, chunk) in (span.first..).zip(scratch.chunks_exact_mut(block_size as usize)) {
            let location = match self.index.get_location(block) {
                Ok(location) => location,
                Err(Error::NotExists) => {
                    log::trace!("block {block} was never written");
                    continue;
                }
                Err(e) => return Err(e),
            };

            log::trace!("reading block {block} from tape block {location}");
            self.drive.seek_to_block(location).map_err(Error::Hardware)?;
            self.drive.read_block(chunk).map_err(Error::Hardware)?;
        }

        Ok(scratch)
    }

    /// Append whole blocks starting at logical block `first`.
    fn append(&mut self, first: u64, data: &[u8], block_size: u64) -> Result<()> {
        if self.direction == Direction::Read {
            log::debug!("seeking to end-of-data before writing");
            self.drive.seek_to_end_of_data().map_err(Error::Hardware)?;
        }
        self.direction = Direction::Write;

        for (block, chunk) in (first..).zip(data.chunks_exact(block_size as usize)) {
            let location = self.drive.tell().map_err(Error::Hardware)?;
            log::trace!("writing block {block} to tape block {location}");

            // Not atomic: if the write below fails, the index already points at a tape block
            // that never received this data.
            self.index.set_location(block, location)?;
            self.drive.write_block(chunk).map_err(Error::Hardware)?;
        }

        Ok(())
    }
}

/// Byte-addressable device on top of a sequential drive and a location index.
///
/// All operations are serialised through one lock: the drive has a single head, and the head
/// position and the index have to agree for the whole duration of a call.
pub struct Remapper<D, I> {
    state: Mutex<State<D, I>>,
    size: u64,
    block_size: u64,
}

impl<D: SequentialDrive, I: LocationIndex> Remapper<D, I> {
    /// `size` is the logical capacity in bytes that gets advertised to clients.
    pub fn new(drive: D, index: I, size: u64, block_size: u64) -> Result<Self> {
        if block_size == 0 || usize::try_from(block_size).is_err() {
            return Err(Error::InvalidBlockSize(block_size));
        }

        Ok(Self {
            state: Mutex::new(State {
                drive,
                index,
                // The head position after open is unknown, so the first write has to look for
                // end-of-data.
                direction: Direction::Read,
            }),
            size,
            block_size,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    pub fn into_parts(self) -> (D, I) {
        let state = self.state.into_inner();
        (state.drive, state.index)
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        log::debug!("read_at: offset = {offset}, len = {}", buf.len());

        let span = Span::new(offset, buf.len(), self.block_size)?;
        let mut state = self.state.lock();
        let scratch = state.read_span(span, self.block_size)?;

        let upper = (span.lower + buf.len()).min(scratch.len());
        let count = upper - span.lower;
        buf[..count].copy_from_slice(&scratch[span.lower..upper]);
        Ok(count)
    }

    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        log::debug!("write_at: offset = {offset}, len = {}", buf.len());

        let span = Span::new(offset, buf.len(), self.block_size)?;
        let mut state = self.state.lock();

        let data = if span.is_aligned(buf.len(), self.block_size) {
            Cow::Borrowed(buf)
        } else {
            // Tape cannot take partial blocks: merge the caller's bytes into the current
            // content of the span and write the blocks back whole.
            let mut merged = state.read_span(span, self.block_size)?;
            merged[span.lower..span.lower + buf.len()].copy_from_slice(buf);
            Cow::Owned(merged)
        };

        state.append(span.first, &data, self.block_size)?;
        Ok(buf.len())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Tapes are unbuffered at this layer.
    pub fn sync(&self) -> Result<()> {
        Ok(())
    }
}
