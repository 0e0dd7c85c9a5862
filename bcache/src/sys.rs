//! Raw kernel interfaces: block device ioctls and the bcache control ioctl.

use std::{convert::TryFrom, fs::File, io, os::unix::io::AsRawFd};

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Builds an ioctl request number the way `<asm-generic/ioctl.h>` does.
#[allow(clippy::cast_possible_truncation)]
pub const fn ioc(dir: u32, ty: u32, nr: u32, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT) | (ty << IOC_TYPESHIFT) | (nr << IOC_NRSHIFT) | ((size as u32) << IOC_SIZESHIFT)
}

/// `BLKSSZGET`: logical sector size, `int`.
pub const BLKSSZGET: u32 = ioc(IOC_NONE, 0x12, 104, 0);
/// `BLKGETSIZE64`: device size in bytes, `u64`.
pub const BLKGETSIZE64: u32 = ioc(IOC_READ, 0x12, 114, std::mem::size_of::<usize>());
/// `BLKDISCARD`: discard a `[start, len]` byte range.
pub const BLKDISCARD: u32 = ioc(IOC_NONE, 0x12, 119, 0);

/// Magic of the bcache control ioctls.
pub const BCH_IOCTL_MAGIC: u32 = 0xBC;

/// Length of the device name field of a registration request.
pub const BDEVNAME_SIZE: usize = 32;

/// Size of `struct bch_register_device`.
pub const REGISTER_DEVICE_SIZE: usize = BDEVNAME_SIZE + crate::SB_NATIVE_SIZE;

/// `BCH_IOCTL_REGISTER_DEVICE`: `_IOWR(0xBC, 1, struct bch_register_device)`.
pub const BCH_IOCTL_REGISTER_DEVICE: u32 = ioc(IOC_READ | IOC_WRITE, BCH_IOCTL_MAGIC, 1, REGISTER_DEVICE_SIZE);

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Size of a block device in bytes.
pub fn blk_size_bytes(f: &File) -> io::Result<u64> {
    let mut size: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes one u64 through the pointer.
    check(unsafe { libc::ioctl(f.as_raw_fd(), BLKGETSIZE64 as _, &mut size as *mut u64) })?;
    Ok(size)
}

/// Logical sector size of a block device in bytes.
pub fn blk_logical_sector_size(f: &File) -> io::Result<u32> {
    let mut size: libc::c_int = 0;
    // SAFETY: BLKSSZGET writes one int through the pointer.
    check(unsafe { libc::ioctl(f.as_raw_fd(), BLKSSZGET as _, &mut size as *mut libc::c_int) })?;
    u32::try_from(size).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative sector size"))
}

/// Discards `len` bytes starting at `start`.
pub fn blk_discard(f: &File, start: u64, len: u64) -> io::Result<()> {
    let mut range: [u64; 2] = [start, len];
    // SAFETY: BLKDISCARD reads two u64 through the pointer.
    check(unsafe { libc::ioctl(f.as_raw_fd(), BLKDISCARD as _, range.as_mut_ptr()) })
}

/// Sends a `struct bch_register_device` to the control device.
pub fn bch_register_device(ctrl: &File, request: &mut [u8]) -> io::Result<()> {
    if request.len() != REGISTER_DEVICE_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad register request size"));
    }
    // SAFETY: the buffer has exactly the size encoded in the request number, and
    // the kernel reads and writes at most that many bytes.
    check(unsafe {
        libc::ioctl(ctrl.as_raw_fd(), BCH_IOCTL_REGISTER_DEVICE as _, request.as_mut_ptr())
    })
}

#[test]
fn request_numbers() {
    assert_eq!(BLKSSZGET, 0x1268);
    assert_eq!(BLKDISCARD, 0x1277);
    #[cfg(target_pointer_width = "64")]
    assert_eq!(BLKGETSIZE64, 0x8008_1272);
    assert_eq!(REGISTER_DEVICE_SIZE, 2296);
    assert_eq!(BCH_IOCTL_REGISTER_DEVICE, 0xc8f8_bc01);
}
