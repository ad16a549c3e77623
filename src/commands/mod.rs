pub mod index;
pub mod probe;
pub mod serve;

use clap::Args;
use std::path::PathBuf;
use tapisk::index::DEFAULT_NAMESPACE;
use tapisk::Config;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Path to the index database
    #[arg(long, default_value = "tapisk.db")]
    pub index: PathBuf,

    /// Namespace inside the index database
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Tape drive to use (a non-rewinding node), or a regular file to emulate one
    #[arg(long, default_value = "/dev/nst0")]
    pub drive: PathBuf,

    /// Size of the device to expose in bytes (native size, not compressed size)
    #[arg(long, default_value_t = 500 * 1024 * 1024)]
    pub size: u64,

    /// Block size to use instead of the one reported by the drive
    #[arg(long)]
    pub block_size: Option<u64>,

    #[command(flatten)]
    pub index: IndexArgs,

    /// Open the drive read-only
    #[arg(long)]
    pub read_only: bool,

    /// Treat --drive as a regular file emulating a tape, creating it if missing
    #[arg(long)]
    pub emulate: bool,
}

impl DeviceArgs {
    pub fn config(&self, strict: bool) -> Config {
        Config {
            drive: self.drive.clone(),
            size: self.size,
            block_size: self.block_size,
            index: self.index.index.clone(),
            namespace: self.index.namespace.clone(),
            read_only: self.read_only,
            emulate: self.emulate,
            strict,
        }
    }
}
