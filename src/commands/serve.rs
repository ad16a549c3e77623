use super::DeviceArgs;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tapisk::nbd::{self, Export, Options};
use tapisk::Session;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Network {
    Tcp,
    Unix,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Listen address, or socket path for `--network unix`
    #[arg(long, default_value = "0.0.0.0:10809")]
    listen: String,

    /// Listen network
    #[arg(long, value_enum, default_value_t = Network::Tcp)]
    network: Network,

    /// Export name
    #[arg(long, default_value = "default")]
    name: String,

    /// Export description
    #[arg(long, default_value = "The default export")]
    description: String,

    /// Only accept single, block-aligned blocks from clients
    #[arg(long)]
    strict: bool,
}

pub fn run(args: ServeArgs) -> Result<()> {
    let session = Session::open(&args.device.config(args.strict))?;
    let block_size =
        u32::try_from(session.block_size()).context("block size is too large for NBD")?;

    let exports: Arc<[Export]> = Arc::from(vec![Export {
        name: args.name,
        description: args.description,
        backend: session.backend(),
    }]);
    let options = Options::for_block_size(block_size, args.device.read_only);

    match args.network {
        Network::Tcp => {
            let listener = TcpListener::bind(&args.listen)
                .with_context(|| format!("unable to listen on {}", args.listen))?;
            log::info!("listening on {}", listener.local_addr()?);
            accept_loop(listener.incoming(), exports, options);
        }
        Network::Unix => {
            let listener = UnixListener::bind(&args.listen)
                .with_context(|| format!("unable to listen on {}", args.listen))?;
            log::info!("listening on {}", args.listen);
            accept_loop(listener.incoming(), exports, options);
        }
    }
    Ok(())
}

fn accept_loop<I, S>(incoming: I, exports: Arc<[Export]>, options: Options)
where
    I: Iterator<Item = io::Result<S>>,
    S: Read + Write + Send + 'static,
{
    let clients = Arc::new(AtomicUsize::new(0));

    for conn in incoming {
        let conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("could not accept connection, continuing: {e}");
                continue;
            }
        };

        let count = clients.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("{count} clients connected");

        let exports = exports.clone();
        let options = options.clone();
        let clients = clients.clone();
        thread::spawn(move || {
            if let Err(e) = nbd::handle(conn, &exports, &options) {
                log::warn!("client disconnected with error: {e}");
            }

            let count = clients.fetch_sub(1, Ordering::SeqCst) - 1;
            log::info!("{count} clients connected");
        });
    }
}
