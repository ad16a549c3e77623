use super::IndexArgs;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tapisk::{Error, LocationIndex, SqliteIndex};

#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(flatten)]
    index: IndexArgs,

    #[command(subcommand)]
    action: IndexAction,
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    /// Show where a logical block lives on tape
    Get { block: u64 },
    /// Point a logical block at a tape block
    Set { block: u64, location: u64 },
    /// Print every entry
    List,
}

pub fn run(args: IndexCommand) -> Result<()> {
    let path = &args.index.index;
    let mut index = SqliteIndex::open(path, &args.index.namespace)
        .with_context(|| format!("unable to open index {}", path.display()))?;

    match args.action {
        IndexAction::Get { block } => match index.get_location(block) {
            Ok(location) => println!("{block} -> {location}"),
            Err(Error::NotExists) => println!("{block} was never written"),
            Err(e) => return Err(e).with_context(|| format!("unable to look up block {block}")),
        },
        IndexAction::Set { block, location } => {
            index
                .set_location(block, location)
                .with_context(|| format!("unable to set block {block}"))?;
            log::info!("block {block} now points to tape block {location}");
        }
        IndexAction::List => {
            for (block, location) in index.entries()? {
                println!("{block} -> {location}");
            }
        }
    }

    index.close().context("unable to close index")
}
