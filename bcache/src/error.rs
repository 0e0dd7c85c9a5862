use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias used throughout the crate.
pub type BcResult<T> = Result<T, BcError>;

/// Why a size argument was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeProblem {
    /// Not a number with an optional k/m/g/t suffix.
    Unparsable,
    /// The byte count is not a power of two.
    NotPowerOfTwo,
    /// The sector count exceeds the field it is stored in.
    TooLarge,
    /// Less than one sector.
    TooSmall,
}

/// Every way formatting a device can fail.
///
/// Validation errors are raised before any device is touched. Conflict errors
/// leave the device unchanged. I/O errors after the first write leave the
/// device in an undefined state.
#[derive(Debug, Error)]
pub enum BcError {
    /// A size argument was rejected.
    #[error("{what} is invalid: {problem:?}")]
    InvalidSize {
        /// Which argument.
        what:    &'static str,
        /// What is wrong with it.
        problem: SizeProblem,
    },

    /// Bucket size smaller than block size.
    #[error("bucket size ({bucket} sectors) cannot be smaller than block size ({block} sectors)")]
    InvalidSizeRelationship {
        /// Block size in sectors.
        block:  u64,
        /// Bucket size in sectors.
        bucket: u64,
    },

    /// Data offset below the minimum.
    #[error("bad data offset {0}; minimum {} sectors", crate::BDEV_DATA_START_DEFAULT)]
    BadDataOffset(u64),

    /// Unknown cache replacement policy name.
    #[error("unknown cache replacement policy '{0}'")]
    InvalidPolicy(String),

    /// Malformed UUID string.
    #[error("bad uuid '{0}'")]
    InvalidUuid(String),

    /// Label does not fit the fixed-size field.
    #[error("label is too long ({0} bytes, at most {})", crate::SB_LABEL_SIZE - 1)]
    LabelTooLong(usize),

    /// No device of either role was requested.
    #[error("please supply a device")]
    NoDevicesSpecified,

    /// More than one cache device was requested.
    #[error("please specify only one cache device ({0} given)")]
    MultipleCacheDevices(usize),

    /// The path does not exist.
    #[error("device {} not found", .0.display())]
    DeviceNotFound(PathBuf),

    /// The path exists but could not be opened.
    #[error("can't open device {}: {source}", .path.display())]
    NotOpenable {
        /// Device path.
        path:   PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Exclusive open failed because the device is in use.
    #[error("device {} is busy; use --force to stop the running bcache instance", .0.display())]
    DeviceBusy(PathBuf),

    /// Busy, but no bcache instance is holding it.
    #[error("device {} is busy and is not a bcache device", .0.display())]
    NotABcacheDevice(PathBuf),

    /// A stopped instance did not release the device in time.
    #[error("bcache device {} has not completely closed after {attempts} attempts, try again later", .path.display())]
    FailedRelease {
        /// Device path.
        path:     PathBuf,
        /// Number of reacquisition attempts made.
        attempts: u32,
    },

    /// The device already carries a bcache superblock.
    #[error("already a bcache device on {}, overwrite with --wipe-bcache or --force", .0.display())]
    AlreadyFormatted(PathBuf),

    /// The device carries some other filesystem or partition table.
    #[error("device {} already has a non-bcache superblock, remove it using wipefs and wipefs -a", .0.display())]
    ForeignSignaturePresent(PathBuf),

    /// Not enough buckets for a cache device.
    #[error("not enough buckets on {}: {nbuckets}, need {}", .path.display(), crate::MIN_BUCKETS)]
    DeviceTooSmall {
        /// Device path.
        path:     PathBuf,
        /// Buckets that would fit.
        nbuckets: u64,
    },

    /// The ioctl transport only registers block devices.
    #[error("core object {} is not supported, it is not a block device", .0.display())]
    UnsupportedTarget(PathBuf),

    /// The bcache control device could not be opened.
    #[error("unable to open {}: {source}", .path.display())]
    ControlDeviceUnavailable {
        /// Control device path.
        path:   PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The kernel rejected the registration ioctl.
    #[error("error during ioctl registration of {}: {source}", .path.display())]
    Registration {
        /// Device path.
        path:   PathBuf,
        /// Error reported by the kernel.
        source: io::Error,
    },

    /// Discard is not possible on this target.
    #[error("discard not supported: {0}")]
    DiscardUnsupported(&'static str),

    /// The external signature probe could not be run.
    #[error("signature probe failed on {}: {detail}", .path.display())]
    Probe {
        /// Device path.
        path:   PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// Buffer does not start with the bcache magic.
    #[error("bad magic, not a bcache superblock")]
    BadMagic,

    /// Checksum stored in a superblock does not match its contents.
    #[error("bad checksum: stored {stored:#018x}, computed {computed:#018x}")]
    BadChecksum {
        /// Value read from disk.
        stored:   u64,
        /// Value computed over the read bytes.
        computed: u64,
    },

    /// Superblock version this crate does not know.
    #[error("unsupported superblock version {0}")]
    UnknownVersion(u64),

    /// Buffer too short to hold a superblock.
    #[error("short superblock buffer: need {need} bytes, got {got}")]
    ShortBuffer {
        /// Bytes required.
        need: usize,
        /// Bytes provided.
        got:  usize,
    },

    /// Operating system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
