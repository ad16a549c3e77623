use crate::index::LocationIndex;
use crate::remap::Remapper;
use crate::{Error, Result};
use tape::SequentialDrive;

/// What a block-device server needs from the storage behind an export.
pub trait BlockBackend: Send + Sync {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;
    /// Logical capacity in bytes.
    fn size(&self) -> u64;
    fn sync(&self) -> Result<()>;
}

impl<D, I> BlockBackend for Remapper<D, I>
where
    D: SequentialDrive,
    I: LocationIndex,
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Remapper::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        Remapper::write_at(self, buf, offset)
    }

    fn size(&self) -> u64 {
        Remapper::size(self)
    }

    fn sync(&self) -> Result<()> {
        Remapper::sync(self)
    }
}

/// Strict variant of a backend: only single, block-aligned blocks go through.
///
/// Requests of any other shape fail before anything reaches the inner backend.
pub struct Aligned<B> {
    inner: B,
    block_size: u64,
}

impl<B: BlockBackend> Aligned<B> {
    pub fn new(inner: B, block_size: u64) -> Self {
        Self { inner, block_size }
    }

    fn check(&self, len: usize, offset: u64) -> Result<()> {
        if len as u64 != self.block_size {
            return Err(Error::ChunkSizeMismatch {
                len,
                block_size: self.block_size,
            });
        }
        if offset % self.block_size != 0 {
            return Err(Error::UnalignedOffset {
                offset,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

impl<B: BlockBackend> BlockBackend for Aligned<B> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.check(buf.len(), offset)?;
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        self.check(buf.len(), offset)?;
        self.inner.write_at(buf, offset)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

impl<B: BlockBackend + ?Sized> BlockBackend for std::sync::Arc<B> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        (**self).write_at(buf, offset)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use tape::MemoryTape;

    const BLOCK_SIZE: u64 = 512;

    fn aligned() -> Aligned<Remapper<MemoryTape, MemoryIndex>> {
        let tape = MemoryTape::new(BLOCK_SIZE);
        let remapper = Remapper::new(tape, MemoryIndex::new(), 8 * BLOCK_SIZE, BLOCK_SIZE).unwrap();
        Aligned::new(remapper, BLOCK_SIZE)
    }

    #[test]
    fn passes_whole_blocks() {
        let backend = aligned();
        let data = vec![3u8; BLOCK_SIZE as usize];

        assert_eq!(backend.write_at(&data, BLOCK_SIZE).unwrap(), data.len());
        let mut buf = vec![0u8; BLOCK_SIZE as usize];
        assert_eq!(backend.read_at(&mut buf, BLOCK_SIZE).unwrap(), buf.len());
        assert_eq!(buf, data);
        assert_eq!(backend.size(), 8 * BLOCK_SIZE);
    }

    #[test]
    fn rejects_wrong_chunk_size() {
        let backend = aligned();

        let err = backend.write_at(&[1u8; 13], 0).unwrap_err();
        assert!(matches!(err, Error::ChunkSizeMismatch { len: 13, block_size: BLOCK_SIZE }));

        let mut buf = vec![0u8; 2 * BLOCK_SIZE as usize];
        let err = backend.read_at(&mut buf, 0).unwrap_err();
        assert!(matches!(err, Error::ChunkSizeMismatch { .. }));
    }

    #[test]
    fn rejects_unaligned_offset() {
        let backend = aligned();
        let data = vec![1u8; BLOCK_SIZE as usize];

        let err = backend.write_at(&data, 2).unwrap_err();
        assert!(matches!(err, Error::UnalignedOffset { offset: 2, .. }));

        // Nothing reached the tape.
        let (tape, index) = backend.inner.into_parts();
        assert!(tape.blocks().is_empty());
        assert!(index.is_empty());
    }
}
