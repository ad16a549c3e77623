mod operate;
mod status;

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};

pub use operate::Operation;

/// An opened tape drive, e.g. `/dev/nst0`.
///
/// Always open the non-rewinding node: the rewinding one moves the head back to BOT on every
/// close, which would defeat the position bookkeeping above this layer.
pub struct TapeDevice {
    file: File,
    path: PathBuf,
}

impl TapeDevice {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> io::Result<Self> {
        use nix::fcntl::OFlag;
        use nix::sys::stat::Mode;

        let path = path.as_ref();
        let flag = if read_only { OFlag::O_RDONLY } else { OFlag::O_RDWR };
        let fd = nix::fcntl::open(path, flag, Mode::empty())?;
        // The descriptor was just opened and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };

        log::debug!("opened tape drive {} (read_only = {read_only})", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn file(&mut self) -> &mut File {
        &mut self.file
    }
}
