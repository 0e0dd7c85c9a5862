//! Registration of a backing device through the bcache control device.
//!
//! Instead of writing a superblock the kernel reads back, the superblock is
//! handed over in a `struct bch_register_device`:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 32 | device name, NUL-terminated |
//! | 32 | 2264 | `struct cache_sb`, native byte order |

use std::path::Path;

use crate::{
    operations::{notify, write::build_sb, Notice},
    sys::{BDEVNAME_SIZE, REGISTER_DEVICE_SIZE},
    BcError, BcResult, Host, Role, SbParams, Superblock,
};

/// Builds the registration record for `path`.
///
/// The name is cut to 31 bytes so that it stays NUL-terminated.
pub fn register_request(path: &Path, sb: &Superblock) -> Vec<u8> {
    let mut request = vec![0u8; REGISTER_DEVICE_SIZE];
    let name = path.to_string_lossy();
    let len = name.len().min(BDEVNAME_SIZE - 1);
    request[..len].copy_from_slice(&name.as_bytes()[..len]);
    request[BDEVNAME_SIZE..].copy_from_slice(&sb.encode_native());
    request
}

/// Registers a backing device with the kernel, which writes the superblock itself.
///
/// Only block devices are accepted. The data offset is always 0 here; any
/// other request is overridden with a notice.
pub fn register_sb_ioctl(
    host: &dyn Host,
    path: &Path,
    params: &SbParams,
    notices: &mut Vec<Notice>,
) -> BcResult<Superblock> {
    let sectors = {
        let disk = host.open_shared(path)?;
        assert_or_err!(disk.is_block_device(), BcError::UnsupportedTarget(path.to_path_buf()));
        disk.sectors()?
    };

    let mut params = params.clone();
    if params.data_offset != 0 {
        notify(
            notices,
            Notice::DataOffsetForced {
                path:      path.to_path_buf(),
                requested: params.data_offset,
            },
        );
        params.data_offset = 0;
    }
    params.nbuckets = sectors / u64::from(params.bucket_size.max(1));

    let mut sb = build_sb(host, path, Role::Backing, &params, notices);
    sb.update_checksum();
    let mut request = register_request(path, &sb);
    host.register_device(path, &mut request)?;
    info!("{}: registered through the control device", path.display());
    Ok(sb)
}

#[test]
fn request_layout() {
    let sb = Superblock::new(Role::Backing);
    let long = "/dev/disk/by-id/wwn-0x5000c500a1b2c3d4-part1";
    let request = register_request(Path::new(long), &sb);
    assert_eq!(request.len(), REGISTER_DEVICE_SIZE);
    assert_eq!(&request[..BDEVNAME_SIZE - 1], &long.as_bytes()[..BDEVNAME_SIZE - 1]);
    assert_eq!(request[BDEVNAME_SIZE - 1], 0);
    assert_eq!(&request[BDEVNAME_SIZE..], &sb.encode_native()[..]);

    let request = register_request(Path::new("/dev/sdb"), &sb);
    assert_eq!(&request[..9], b"/dev/sdb\0");
}
