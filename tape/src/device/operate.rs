use super::TapeDevice;
use std::io;

/// Tape operations issued through `MTIOCTOP`, numbered as in `<sys/mtio.h>`.
#[derive(Debug, Clone, Copy, strum::IntoStaticStr)]
#[repr(i16)]
pub enum Operation {
    /// Space to end of recorded media
    EndOfData = 12,
    /// Set block length, 0 selects variable-block mode
    SetBlockSize = 20,
    /// Seek to a logical block number
    Seek = 22,
}

#[repr(C)]
pub struct MtOp {
    /// One of the operations above
    op: libc::c_short,
    /// Count or argument of the operation
    count: libc::c_int,
}

mod ioctl_func {
    use super::MtOp;

    nix::ioctl_write_ptr!(tape_op, b'm', 1u8, MtOp);
}

impl TapeDevice {
    fn do_tape_op(&self, op: Operation, count: libc::c_int) -> io::Result<()> {
        let name: &'static str = op.into();
        log::trace!("{}: MTIOCTOP {name} count = {count}", self.path().display());

        let mt_op = MtOp {
            op: op as libc::c_short,
            count,
        };
        unsafe { ioctl_func::tape_op(self.fd(), &mt_op)? };
        Ok(())
    }

    pub fn seek_to_block(&self, block: u64) -> io::Result<()> {
        let count = libc::c_int::try_from(block).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {block} is out of the drive's addressable range"),
            )
        })?;
        self.do_tape_op(Operation::Seek, count)
    }

    pub fn seek_to_end_of_data(&self) -> io::Result<()> {
        self.do_tape_op(Operation::EndOfData, 1)
    }

    pub fn set_block_size(&self, size: u32) -> io::Result<()> {
        let size = libc::c_int::try_from(size).map_err(|_| {
            let message = format!("block size {size} is too large");
            io::Error::new(io::ErrorKind::InvalidInput, message)
        })?;
        self.do_tape_op(Operation::SetBlockSize, size)
    }
}
