#![warn(missing_docs)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::print_stdout)]
#![deny(clippy::cast_possible_truncation)]

//! Formatting and registration of bcache cache and backing devices.

#[macro_use]
extern crate more_asserts;

#[macro_use]
extern crate log;

#[macro_use]
extern crate bcache_macros;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate derivative;

/// Size of a sector. Every on-disk quantity is counted in these.
pub const SECTOR_SIZE: u64 = 512;

/// Sector at which the superblock is written.
pub const SB_SECTOR: u64 = 8;

/// Byte offset of the superblock. Everything before it is zeroed on format.
pub const SB_START: u64 = SB_SECTOR * SECTOR_SIZE;

/// The superblock's signature. Identifies a bcache device.
pub const BCACHE_MAGIC: &[u8; 16] = &[
    0xc6, 0x85, 0x73, 0xf6, 0x4e, 0x1a, 0x45, 0xca, 0x82, 0x65, 0xf5, 0x7f, 0x48, 0xba, 0x6d, 0x81,
];

/// Capacity of the label field, including the terminating NUL.
pub const SB_LABEL_SIZE: usize = 32;

/// Number of journal bucket slots in the superblock.
pub const SB_JOURNAL_BUCKETS: usize = 256;

/// Default start of data on a backing device, in sectors.
pub const BDEV_DATA_START_DEFAULT: u64 = 16;

/// Default bucket size, in sectors.
pub const DEFAULT_BUCKET_SIZE: u32 = 1024;

/// A cache device with fewer buckets than this is refused.
pub const MIN_BUCKETS: u64 = 1 << 7;

pub use self::{
    disk::{Disk, DiskFile, DiskMem, DiskObj},
    error::{BcError, BcResult, SizeProblem},
    host::{Host, LinuxHost},
    ondisk::*,
    operations::{BackingRequest, FormatConfig, FormatReport, Notice, Transport},
    probe::{InstanceKind, Sysfs},
};

mod disk;
mod error;
mod host;
mod ondisk;
mod sys;

/// Size string parsing and validation.
pub mod size;

/// Device geometry, signature and live-instance probing.
pub mod probe;

/// Formatting flows: direct write, ioctl registration, teardown, orchestration.
pub mod operations;

/// Console logging setup for the binaries.
#[cfg(feature = "log4rs")]
pub mod logging;

/// Functions useful for testing
pub mod test;

/// Documentation-only module
pub mod doc;
