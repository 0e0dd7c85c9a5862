use std::{fmt, path::PathBuf};

pub mod format;
pub mod ioctl;
pub mod teardown;
pub mod write;

pub use self::{
    format::{format, format_with, BackingRequest, FormatConfig, FormatReport, FormattedDevice, Transport},
    ioctl::register_sb_ioctl,
    teardown::{Teardown, TeardownState},
    write::{write_sb, WriteOptions},
};

/// A correction applied while formatting. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Writeback was requested for a zoned backing device.
    ZonedWritethrough {
        /// Device path.
        path: PathBuf,
    },
    /// The data offset of a zoned backing device was aligned to its zone size.
    ZonedDataOffset {
        /// Device path.
        path:   PathBuf,
        /// Offset now used, in sectors.
        offset: u64,
    },
    /// The ioctl transport requires a zero data offset.
    DataOffsetForced {
        /// Device path.
        path:      PathBuf,
        /// Offset that was asked for, in sectors.
        requested: u64,
    },
    /// Cache devices are always written directly.
    IoctlIgnoredForCache {
        /// Device path.
        path: PathBuf,
    },
    /// Discarding the cache device did not work.
    DiscardSkipped {
        /// Device path.
        path:   PathBuf,
        /// Why.
        reason: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Notice::ZonedWritethrough { path } => write!(
                f,
                "zoned device {} detected: convert to writethrough mode",
                path.display()
            ),
            Notice::ZonedDataOffset { path, offset } => write!(
                f,
                "zoned device {} detected: data offset aligned to zone size, now {} sectors",
                path.display(),
                offset
            ),
            Notice::DataOffsetForced { path, requested } => write!(
                f,
                "{}: data offset must be 0 when using ioctl registration, ignoring {}",
                path.display(),
                requested
            ),
            Notice::IoctlIgnoredForCache { path } => write!(
                f,
                "{}: cache devices are always formatted directly, not via ioctl",
                path.display()
            ),
            Notice::DiscardSkipped { path, reason } => {
                write!(f, "{}: discard skipped: {}", path.display(), reason)
            }
        }
    }
}

/// Logs a notice and records it.
pub(crate) fn notify(notices: &mut Vec<Notice>, notice: Notice) {
    warn!("{}", notice);
    notices.push(notice);
}
