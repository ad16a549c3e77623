use super::TapeDevice;
use std::io;

const MT_ST_BLKSIZE_MASK: libc::c_long = 0xffffff;
const MT_ST_BLKSIZE_SHIFT: u32 = 0;

/// structure for MTIOCGET - mag tape get status command
#[repr(C)]
#[derive(Debug, Default)]
pub struct MtGet {
    /// type of magtape device
    mt_type: libc::c_long,
    /// residual count
    mt_resid: libc::c_long,
    /// device dependent status register, holds the block size and density
    mt_dsreg: libc::c_long,
    /// device independent status
    mt_gstat: libc::c_long,
    /// error register
    mt_erreg: libc::c_long,
    /// number of current file on tape
    mt_fileno: libc::c_int,
    /// current block number
    mt_blkno: libc::c_int,
}

/// structure for MTIOCPOS - mag tape get position command
#[repr(C)]
#[derive(Debug, Default)]
pub struct MtPos {
    mt_blkno: libc::c_long,
}

mod ioctl_func {
    use super::{MtGet, MtPos};

    nix::ioctl_read!(get_status, b'm', 2u8, MtGet);
    nix::ioctl_read!(get_position, b'm', 3u8, MtPos);
}

impl TapeDevice {
    /// Block size the driver currently transfers in. Zero means variable-block mode.
    pub fn block_size(&self) -> io::Result<u32> {
        let mut status = MtGet::default();
        unsafe { ioctl_func::get_status(self.fd(), &mut status)? };

        let size = (status.mt_dsreg & MT_ST_BLKSIZE_MASK) >> MT_ST_BLKSIZE_SHIFT;
        Ok(size as u32)
    }

    /// Logical block number the head is currently at, as reported by the drive.
    pub fn tell(&self) -> io::Result<u64> {
        let mut position = MtPos::default();
        unsafe { ioctl_func::get_position(self.fd(), &mut position)? };

        u64::try_from(position.mt_blkno).map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "drive reported a negative block position")
        })
    }
}
