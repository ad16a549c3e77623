use super::DeviceArgs;
use anyhow::{bail, Result};
use clap::Args;
use tapisk::Session;

const MESSAGES: [&str; 2] = ["First message body", "Second message body"];

/// Overwrites one logical block of the device, so only point it at scratch media.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Logical block to write the messages to
    #[arg(long, default_value_t = 0)]
    block: u64,
}

pub fn run(args: ProbeArgs) -> Result<()> {
    let session = Session::open(&args.device.config(false))?;
    let backend = session.backend();
    let block_size = session.block_size() as usize;
    let offset = args.block * session.block_size();

    let mut failed = 0;
    for message in MESSAGES {
        if message.len() > block_size {
            bail!("block size {block_size} is too small for the probe messages");
        }

        let mut input = vec![0u8; block_size];
        input[..message.len()].copy_from_slice(message.as_bytes());
        backend.write_at(&input, offset)?;

        let mut output = vec![0u8; block_size];
        backend.read_at(&mut output, offset)?;

        let matched = input == output;
        println!("{message:?}: read back {}", if matched { "ok" } else { "MISMATCH" });
        if !matched {
            failed += 1;
        }
    }

    drop(backend);
    session.close()?;

    if failed > 0 {
        bail!("{failed} of {} messages did not read back", MESSAGES.len());
    }
    Ok(())
}
