#![cfg(not(tarpaulin_include))]

use std::path::PathBuf;

use bcache::{
    logging,
    operations::{format_with, BackingRequest, FormatConfig, Transport},
    size, CacheMode, Label, LinuxHost, ReplacementPolicy, Uuid,
};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use colored::*;

#[derive(Parser, Debug)]
#[command(name = "make-bcache")]
#[command(about = "Format devices for use with bcache")]
struct Args {
    /// Format the following devices as cache devices
    #[arg(short = 'C', long = "cache", action = ArgAction::Count)]
    cache: u8,

    /// Format the following devices as backing devices
    #[arg(short = 'B', long = "bdev", action = ArgAction::Count)]
    bdev: u8,

    /// Bucket size
    #[arg(short = 'b', long = "bucket", value_parser = size::parse_bucket_size)]
    bucket: Option<u32>,

    /// Block size (hard sector size of SSD, often 2k)
    #[arg(short = 'w', long = "block", value_parser = size::parse_block_size)]
    block: Option<u16>,

    /// Data offset in sectors
    #[arg(short = 'o', long = "data-offset", alias = "data_offset", value_parser = size::parse_data_offset)]
    data_offset: Option<u64>,

    /// UUID for the cache set
    #[arg(long = "cset-uuid", value_parser = Uuid::parse)]
    cset_uuid: Option<Uuid>,

    /// Enable writeback on the backing devices of the -B group it appears in,
    /// or on all of them when given outside any -B group
    #[arg(long, action = ArgAction::Count)]
    writeback: u8,

    /// Enable discards
    #[arg(long)]
    discard: bool,

    /// Reformat a bcache device even if it is running
    #[arg(long)]
    force: bool,

    /// Overwrite an existing bcache superblock
    #[arg(long = "wipe-bcache")]
    wipe_bcache: bool,

    /// Set label for device
    #[arg(short = 'l', long = "label", value_parser = Label::new)]
    label: Option<Label>,

    /// Cache replacement policy (lru, fifo or random)
    #[arg(
        long = "cache-replacement-policy",
        alias = "cache_replacement_policy",
        value_parser = ReplacementPolicy::parse
    )]
    cache_replacement_policy: Option<ReplacementPolicy>,

    /// Communicate via ioctl with the control device
    #[arg(long)]
    ioctl: bool,

    /// More output, repeat for more
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Devices, each formatted in the role of the closest -C or -B before it
    devices: Vec<PathBuf>,
}

/// Role flags and `--writeback` flags, by command line index.
struct RoleFlags<'a> {
    cache:     &'a [usize],
    bdev:      &'a [usize],
    writeback: &'a [usize],
}

impl RoleFlags<'_> {
    // The -B flag governing `idx`, or None under -C or before any role flag.
    fn bdev_group(&self, idx: usize) -> Option<usize> {
        let last_cache = self.cache.iter().filter(|i| **i < idx).max();
        let last_bdev = self.bdev.iter().filter(|i| **i < idx).max();
        match (last_cache, last_bdev) {
            (Some(c), Some(b)) if b > c => Some(*b),
            (None, Some(b)) => Some(*b),
            _ => None,
        }
    }
    fn cache_mode(&self, group: usize) -> CacheMode {
        let writeback = self
            .writeback
            .iter()
            .any(|w| self.bdev_group(*w).map_or(true, |g| g == group));
        if writeback {
            CacheMode::Writeback
        } else {
            CacheMode::Writethrough
        }
    }
}

/// Splits positional devices into cache paths and backing requests by the
/// role flag preceding each.
fn assign_roles(
    flags: &RoleFlags,
    devices: &[(usize, PathBuf)],
) -> Result<(Vec<PathBuf>, Vec<BackingRequest>), String> {
    let mut cache = Vec::new();
    let mut backing = Vec::new();
    for (idx, path) in devices {
        if let Some(group) = flags.bdev_group(*idx) {
            backing.push(BackingRequest::new(path.clone(), flags.cache_mode(group)));
        } else if flags.cache.iter().any(|i| i < idx) {
            cache.push(path.clone());
        } else {
            return Err(format!("please specify -C or -B before {}", path.display()));
        }
    }
    Ok((cache, backing))
}

fn indices(matches: &ArgMatches, id: &str) -> Vec<usize> {
    matches.indices_of(id).map(|i| i.collect()).unwrap_or_default()
}

fn config(args: &Args, matches: &ArgMatches) -> Result<FormatConfig, String> {
    let devices: Vec<(usize, PathBuf)> = indices(matches, "devices")
        .into_iter()
        .zip(args.devices.iter().cloned())
        .collect();
    let (cache, bdev, writeback) = (
        indices(matches, "cache"),
        indices(matches, "bdev"),
        indices(matches, "writeback"),
    );
    let flags = RoleFlags {
        cache:     &cache,
        bdev:      &bdev,
        writeback: &writeback,
    };
    let (cache_devices, backing_devices) = assign_roles(&flags, &devices)?;

    let defaults = FormatConfig::default();
    Ok(FormatConfig {
        cache_devices,
        backing_devices,
        block_size: args.block,
        bucket_size: args.bucket.unwrap_or(defaults.bucket_size),
        data_offset: args.data_offset.unwrap_or(defaults.data_offset),
        discard: args.discard,
        wipe_bcache: args.wipe_bcache,
        force: args.force,
        replacement: args.cache_replacement_policy.unwrap_or(defaults.replacement),
        set_uuid: args.cset_uuid.unwrap_or(defaults.set_uuid),
        label: args.label.unwrap_or(defaults.label),
        transport: if args.ioctl {
            Transport::IoctlHandoff
        } else {
            Transport::DirectWrite
        },
    })
}

fn main() {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if let Err(e) = logging::init(logging::level_for(args.verbose)) {
        eprintln!("can't set up logging: {}", e);
    }

    let cfg = match config(&args, &matches) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e.red());
            std::process::exit(1);
        }
    };

    log::debug!("{:?}", cfg);

    let print = |dev: &bcache::operations::FormattedDevice| {
        println!("{}", dev.sb.summary(&dev.path.display().to_string()));
    };
    if let Err(e) = format_with(&LinuxHost::new(), &cfg, print) {
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
}

#[cfg(test)]
fn flags<'a>(cache: &'a [usize], bdev: &'a [usize], writeback: &'a [usize]) -> RoleFlags<'a> {
    RoleFlags {
        cache,
        bdev,
        writeback,
    }
}

#[test]
fn roles_follow_the_last_flag() {
    #![allow(clippy::unwrap_used)]
    let devices = vec![
        (2, PathBuf::from("/dev/nvme0n1")),
        (4, PathBuf::from("/dev/sdb")),
        (5, PathBuf::from("/dev/sdc")),
    ];
    // make-bcache -C /dev/nvme0n1 -B /dev/sdb /dev/sdc
    let (cache, backing) = assign_roles(&flags(&[1], &[3], &[]), &devices).unwrap();
    assert_eq!(cache, vec![PathBuf::from("/dev/nvme0n1")]);
    assert_eq!(
        backing,
        vec![
            BackingRequest::new("/dev/sdb", CacheMode::Writethrough),
            BackingRequest::new("/dev/sdc", CacheMode::Writethrough),
        ]
    );

    // make-bcache -B /dev/sdb -C /dev/nvme0n1
    let devices = vec![(2, PathBuf::from("/dev/sdb")), (4, PathBuf::from("/dev/nvme0n1"))];
    let (cache, backing) = assign_roles(&flags(&[3], &[1], &[]), &devices).unwrap();
    assert_eq!(cache, vec![PathBuf::from("/dev/nvme0n1")]);
    assert_eq!(backing, vec![BackingRequest::new("/dev/sdb", CacheMode::Writethrough)]);
}

#[test]
fn writeback_binds_to_its_group() {
    #![allow(clippy::unwrap_used)]
    // make-bcache -B /dev/sdb --writeback -B /dev/sdc
    let devices = vec![(2, PathBuf::from("/dev/sdb")), (5, PathBuf::from("/dev/sdc"))];
    let (_, backing) = assign_roles(&flags(&[], &[1, 4], &[3]), &devices).unwrap();
    assert_eq!(backing[0].cache_mode, CacheMode::Writeback);
    assert_eq!(backing[1].cache_mode, CacheMode::Writethrough);

    // make-bcache --writeback -B /dev/sdb -B /dev/sdc
    let devices = vec![(3, PathBuf::from("/dev/sdb")), (5, PathBuf::from("/dev/sdc"))];
    let (_, backing) = assign_roles(&flags(&[], &[2, 4], &[1]), &devices).unwrap();
    assert!(backing.iter().all(|r| r.cache_mode == CacheMode::Writeback));

    // make-bcache -C /dev/nvme0n1 --writeback -B /dev/sdb
    let devices = vec![(2, PathBuf::from("/dev/nvme0n1")), (5, PathBuf::from("/dev/sdb"))];
    let (cache, backing) = assign_roles(&flags(&[1], &[4], &[3]), &devices).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(backing[0].cache_mode, CacheMode::Writeback);
}

#[test]
fn device_before_any_role_is_refused() {
    let devices = vec![(1, PathBuf::from("/dev/sdb"))];
    assert!(assign_roles(&flags(&[2], &[], &[]), &devices).is_err());
}

#[test]
fn command_line_to_config() {
    #![allow(clippy::unwrap_used)]
    let argv = [
        "make-bcache", "--bucket", "512k", "-C", "/dev/nvme0n1", "-B", "/dev/sdb", "--writeback",
        "--data_offset", "4096", "--cache_replacement_policy", "fifo", "--ioctl",
    ];
    let matches = Args::command().try_get_matches_from(argv).unwrap();
    let args = Args::from_arg_matches(&matches).unwrap();
    let cfg = config(&args, &matches).unwrap();
    assert_eq!(cfg.cache_devices, vec![PathBuf::from("/dev/nvme0n1")]);
    assert_eq!(cfg.backing_devices, vec![BackingRequest::new("/dev/sdb", CacheMode::Writeback)]);
    assert_eq!(cfg.bucket_size, 1024);
    assert_eq!(cfg.data_offset, 4096);
    assert_eq!(cfg.replacement, ReplacementPolicy::Fifo);
    assert_eq!(cfg.transport, Transport::IoctlHandoff);

    assert!(Args::command().try_get_matches_from(["make-bcache", "-C", "-w", "3k", "/dev/sdb"]).is_err());
}

#[test]
fn cli_definition() {
    Args::command().debug_assert();
}
