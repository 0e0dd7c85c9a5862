#![cfg(not(tarpaulin_include))]

use std::path::PathBuf;

use bcache::{csum_set, logging, BcResult, DiskFile, SbFlags, Superblock};
use clap::{ArgAction, Parser};
use colored::*;

#[derive(Parser, Debug)]
#[command(name = "bcache-super-show")]
#[command(about = "Print the bcache superblock of a device")]
struct Args {
    /// Print the superblock even if its checksum is wrong
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// More output, repeat for more
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Device or image to read
    device: PathBuf,
}

fn show(args: &Args) -> BcResult<()> {
    let region = DiskFile::open_shared(&args.device)?.read_sb_region()?;
    let sb = if args.force {
        Superblock::decode_unchecked(&region)?
    } else {
        Superblock::decode(&region)?
    };
    let computed = csum_set(&region)?;

    println!("{}", format!("{}", args.device.display()).bold());
    println!("sb.magic\t\t{}", "ok".green());
    println!("sb.first_sector\t\t{}", sb.offset);
    if sb.csum == computed {
        println!("sb.csum\t\t\t{:016X} [{}]", sb.csum, "match".green());
    } else {
        println!(
            "sb.csum\t\t\t{:016X} [{} {:016X}]",
            sb.csum,
            "expected".red(),
            computed
        );
    }
    println!("sb.version\t\t{} [{}]", sb.version, sb.role());
    println!("sb.seq\t\t\t{}", sb.seq);
    println!("sb.features\t\t{:#x} {:#x} {:#x}", sb.feature_compat, sb.feature_incompat, sb.feature_ro_compat);
    match sb.flags {
        SbFlags::Cache {
            sync,
            discard,
            replacement,
        } => {
            println!("cset.sync\t\t{}", sync);
            println!("cset.discard\t\t{}", discard);
            println!("cset.replacement\t{}", replacement);
        }
        SbFlags::Backing { cache_mode, state } => {
            println!("dev.cache_mode\t\t{}", cache_mode);
            println!("dev.state\t\t{}", state);
        }
    }
    println!("journal.buckets\t\t{}", sb.journal.len());
    println!();
    print!("{}", sb.summary(&args.device.display().to_string()));
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = logging::init(logging::level_for(args.verbose)) {
        eprintln!("can't set up logging: {}", e);
    }
    if let Err(e) = show(&args) {
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
}
