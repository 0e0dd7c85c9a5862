use std::{cell::RefCell, convert::TryFrom, rc::Rc};

use crate::{BcResult, SB_DISK_SIZE, SB_START, SECTOR_SIZE};

/// A handle to a disk
#[derive(Clone)]
pub struct Disk(pub Rc<RefCell<dyn DiskObj>>);

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Disk")
    }
}

impl Disk {
    /// Reads `buffer.len()` bytes at byte `offset`.
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> BcResult<()> {
        self.0.borrow_mut().read_at(offset, buffer)
    }
    /// Writes `buffer` at byte `offset`.
    pub fn write_at(&mut self, offset: u64, buffer: &[u8]) -> BcResult<()> {
        self.0.borrow_mut().write_at(offset, buffer)
    }
    /// Returns the size of the disk in sectors.
    pub fn sectors(&self) -> BcResult<u64> {
        self.0.borrow().sectors()
    }
    /// Returns the logical block size in bytes.
    pub fn logical_block_size(&self) -> BcResult<u32> {
        self.0.borrow().logical_block_size()
    }
    /// Whether the disk is a block device rather than an image file.
    pub fn is_block_device(&self) -> bool {
        self.0.borrow().is_block_device()
    }
    /// Discards the whole device.
    pub fn discard_all(&mut self) -> BcResult<()> {
        self.0.borrow_mut().discard_all()
    }
    /// Flushes written data to stable storage.
    pub fn sync(&mut self) -> BcResult<()> {
        self.0.borrow_mut().sync()
    }

    /// Reads the bytes where a superblock would be.
    pub fn read_sb_region(&mut self) -> BcResult<Vec<u8>> {
        let mut buf = vec![0u8; SB_DISK_SIZE];
        self.read_at(SB_START, &mut buf)?;
        Ok(buf)
    }
    /// `(sectors, logical block size in sectors)`.
    pub fn geometry(&self) -> BcResult<(u64, u32)> {
        let lbs = u64::from(self.logical_block_size()?) / SECTOR_SIZE;
        Ok((self.sectors()?, u32::try_from(lbs).unwrap_or(u32::MAX)))
    }
}

/// A disk object. Has a size, supports reading/writing at byte offsets.
pub trait DiskObj {
    /// Reads `buffer.len()` bytes at byte `offset`.
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> BcResult<()>;
    /// Writes `buffer` at byte `offset`.
    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> BcResult<()>;
    /// Returns the size of the disk in sectors.
    fn sectors(&self) -> BcResult<u64>;
    /// Returns the logical block size in bytes.
    fn logical_block_size(&self) -> BcResult<u32>;
    /// Whether the disk is a block device rather than an image file.
    fn is_block_device(&self) -> bool;
    /// Discards the whole device.
    fn discard_all(&mut self) -> BcResult<()>;
    /// Syncs the content to disk.
    fn sync(&mut self) -> BcResult<()>;
}

/// The byte range to discard on a device of `dev_bytes` with sector size `secsize`.
///
/// Covers the device from zero, cut down to whole sectors.
pub fn discard_range(dev_bytes: u64, secsize: u64) -> (u64, u64) {
    let secsize = secsize.max(1);
    (0, dev_bytes - dev_bytes % secsize)
}

pub use file::DiskFile;
pub use mem::DiskMem;

pub mod file;
pub mod mem;

#[test]
fn discard_range_clamps_to_device() {
    assert_eq!(discard_range(1 << 30, 512), (0, 1 << 30));
    assert_eq!(discard_range(1 << 30, 4096), (0, 1 << 30));
    assert_eq!(discard_range(0, 512), (0, 0));
    assert_eq!(discard_range(4096 + 1000, 4096), (0, 4096));
}
