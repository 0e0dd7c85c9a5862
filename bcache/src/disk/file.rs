use std::{
    cell::RefCell,
    convert::TryFrom,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    disk::{discard_range, DiskObj},
    sys, BcError, BcResult, SECTOR_SIZE,
};

/// A disk object backed by a block device node or an image file.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DiskFile {
    #[derivative(Debug = "ignore")]
    f:            File,
    path:         PathBuf,
    block_device: bool,
    size:         u64,
    blksize:      u64,
}

impl DiskFile {
    /// Opens a device read-write with `O_EXCL`, so that a mounted or
    /// bcache-claimed device is refused with [`BcError::DeviceBusy`].
    pub fn open_exclusive(path: &Path) -> BcResult<super::Disk> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_EXCL)
            .open(path)
            .map_err(|e| open_error(path, e))?;
        DiskFile::open_file(path, file)
    }
    /// Opens a device read-only, without claiming it.
    pub fn open_shared(path: &Path) -> BcResult<super::Disk> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;
        DiskFile::open_file(path, file)
    }
    /// Creates a disk object using an already open file.
    pub fn open_file(path: &Path, file: File) -> BcResult<super::Disk> {
        let meta = file.metadata()?;
        let block_device = meta.file_type().is_block_device();
        let size = if block_device {
            sys::blk_size_bytes(&file)?
        } else {
            meta.len()
        };
        Ok(super::Disk(Rc::new(RefCell::new(DiskFile {
            f: file,
            path: path.to_path_buf(),
            block_device,
            size,
            blksize: meta.blksize(),
        }))))
    }
}

/// Maps an `open(2)` failure to the error the formatting flow acts on.
fn open_error(path: &Path, e: io::Error) -> BcError {
    if e.kind() == io::ErrorKind::NotFound {
        BcError::DeviceNotFound(path.to_path_buf())
    } else if e.raw_os_error() == Some(libc::EBUSY) {
        BcError::DeviceBusy(path.to_path_buf())
    } else {
        BcError::NotOpenable {
            path:   path.to_path_buf(),
            source: e,
        }
    }
}

impl DiskObj for DiskFile {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> BcResult<()> {
        self.f.seek(SeekFrom::Start(offset))?;
        self.f.read_exact(buffer)?;
        Ok(())
    }
    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> BcResult<()> {
        self.f.seek(SeekFrom::Start(offset))?;
        self.f.write_all(buffer)?;
        Ok(())
    }
    fn sectors(&self) -> BcResult<u64> {
        Ok(self.size / SECTOR_SIZE)
    }
    fn logical_block_size(&self) -> BcResult<u32> {
        if self.block_device {
            Ok(sys::blk_logical_sector_size(&self.f)?)
        } else {
            Ok(u32::try_from(self.blksize).unwrap_or(u32::MAX))
        }
    }
    fn is_block_device(&self) -> bool {
        self.block_device
    }
    fn discard_all(&mut self) -> BcResult<()> {
        assert_or_err!(self.block_device, BcError::DiscardUnsupported("not a block device"));
        let secsize = u64::from(sys::blk_logical_sector_size(&self.f)?);
        let (start, len) = discard_range(self.size, secsize);
        trace!("{}: discarding {} bytes at {}", self.path.display(), len, start);
        sys::blk_discard(&self.f, start, len)?;
        Ok(())
    }
    fn sync(&mut self) -> BcResult<()> {
        self.f.sync_all()?;
        Ok(())
    }
}

#[test]
fn image_file_geometry() {
    #![allow(clippy::unwrap_used)]
    let image = tempfile::NamedTempFile::new().unwrap();
    image.as_file().set_len(64 << 20).unwrap();
    let mut d = DiskFile::open_exclusive(image.path()).unwrap();
    assert!(!d.is_block_device());
    assert_eq!(d.sectors().unwrap(), (64 << 20) / SECTOR_SIZE);
    assert_gt!(d.logical_block_size().unwrap(), 0);

    d.write_at(4096, b"bcache").unwrap();
    let mut back = [0u8; 6];
    d.read_at(4096, &mut back).unwrap();
    assert_eq!(&back, b"bcache");
    assert!(matches!(d.discard_all(), Err(BcError::DiscardUnsupported(_))));
}

#[test]
fn missing_device_is_not_found() {
    let path = Path::new("/nonexistent/bcache-test-device");
    assert!(matches!(
        DiskFile::open_shared(path),
        Err(BcError::DeviceNotFound(_))
    ));
}

#[test]
fn ebusy_maps_to_device_busy() {
    let e = io::Error::from_raw_os_error(libc::EBUSY);
    assert!(matches!(
        open_error(Path::new("/dev/sdz"), e),
        BcError::DeviceBusy(_)
    ));
    let e = io::Error::from_raw_os_error(libc::EACCES);
    assert!(matches!(
        open_error(Path::new("/dev/sdz"), e),
        BcError::NotOpenable { .. }
    ));
}
