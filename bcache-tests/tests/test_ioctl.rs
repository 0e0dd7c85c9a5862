use std::path::PathBuf;

use bcache::{
    operations::{format, FormatConfig, Transport},
    test::MockHost,
    BcError, CacheMode, DiskMem, Notice, Role, BCACHE_SB_VERSION_BDEV_WITH_OFFSET, SB_NATIVE_SIZE,
};
use bcache_macros::*;
use bcache_tests::{
    attach_image, backing_requests, imagegen::generators::*, name_of, read_sb, sb_region_is_blank,
};

const NVME: &str = "/dev/bcache-test/nvme0n1";
const SDB: &str = "/dev/bcache-test/sdb";

fn ioctl_config(backing: &[&str]) -> FormatConfig {
    FormatConfig {
        backing_devices: backing_requests(backing, CacheMode::Writethrough),
        transport: Transport::IoctlHandoff,
        ..FormatConfig::default()
    }
}

fn ne_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_ne_bytes(b)
}

#[test_bcache]
fn test_ioctl_forces_zero_offset() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 21);

    let cfg = FormatConfig {
        data_offset: 4096,
        ..ioctl_config(&[SDB])
    };
    let report = format(&host, &cfg).unwrap();

    let dev = &report.devices[0];
    assert_eq!(dev.role, Role::Backing);
    assert_eq!(dev.transport, Transport::IoctlHandoff);
    assert_eq!(dev.sb.data_offset, 0);
    assert_eq!(dev.sb.version, BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
    assert_eq!(
        report.notices,
        vec![Notice::DataOffsetForced {
            path:      PathBuf::from(SDB),
            requested: 4096,
        }]
    );

    let requests = host.requests();
    assert_eq!(requests.len(), 1);
    let (path, request) = &requests[0];
    assert_eq!(path, &PathBuf::from(SDB));
    assert_eq!(request.len(), 32 + SB_NATIVE_SIZE);
    assert_eq!(&request[..SDB.len()], SDB.as_bytes());
    assert_eq!(request[SDB.len()], 0);
    let sb = &request[32..];
    assert_eq!(ne_u64(sb, 16), BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
    assert_eq!(&sb[24..40], &bcache::BCACHE_MAGIC[..]);
    assert_eq!(ne_u64(sb, 184), 0);

    // The kernel writes the superblock, not us.
    assert!(sb_region_is_blank(&disk));
}

#[test_bcache]
fn test_ioctl_cache_written_directly() {
    let host = MockHost::new();
    let cache = host.add_mem_disk(NVME, 1 << 21);
    host.add_mem_disk(SDB, 1 << 21);

    let cfg = FormatConfig {
        cache_devices: vec![PathBuf::from(NVME)],
        data_offset: 16,
        ..ioctl_config(&[SDB])
    };
    let report = format(&host, &cfg).unwrap();
    assert_eq!(report.devices[0].transport, Transport::DirectWrite);
    assert!(read_sb(&cache).is_ok());
    assert_eq!(host.requests().len(), 1);
    assert_eq!(
        report.notices[0],
        Notice::IoctlIgnoredForCache {
            path: PathBuf::from(NVME)
        }
    );
    assert!(matches!(report.notices[1], Notice::DataOffsetForced { requested: 16, .. }));
}

#[test_bcache]
fn test_ioctl_needs_block_device() {
    let host = MockHost::new();
    let image = generate_image!(0);
    attach_image(&host, SDB, &image);
    assert!(matches!(
        format(&host, &ioctl_config(&[SDB])),
        Err(BcError::UnsupportedTarget(_))
    ));
    assert!(host.requests().is_empty());
}

#[test_bcache]
fn test_ioctl_missing_device() {
    let host = MockHost::new();
    let cfg = FormatConfig {
        block_size: Some(1),
        ..ioctl_config(&[SDB])
    };
    assert!(matches!(format(&host, &cfg), Err(BcError::DeviceNotFound(_))));
}

#[test_bcache]
fn test_ioctl_control_device() {
    let host = MockHost::new();
    host.add_disk(SDB, DiskMem::open(1 << 21));
    host.remove_control_device();
    assert!(matches!(
        format(&host, &ioctl_config(&[SDB])),
        Err(BcError::ControlDeviceUnavailable { .. })
    ));

    let host = MockHost::new();
    host.add_disk(SDB, DiskMem::open(1 << 21));
    host.fail_registration(libc::EINVAL);
    assert!(matches!(
        format(&host, &ioctl_config(&[SDB])),
        Err(BcError::Registration { .. })
    ));
}

#[test_bcache]
fn test_ioctl_zoned_writeback() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 24);
    host.set_zoned(&name_of(SDB), 524288);

    let cfg = FormatConfig {
        backing_devices: backing_requests(&[SDB], CacheMode::Writeback),
        ..ioctl_config(&[])
    };
    let report = format(&host, &cfg).unwrap();

    let path = PathBuf::from(SDB);
    assert_eq!(
        report.notices,
        vec![
            Notice::ZonedDataOffset {
                path:   path.clone(),
                offset: 524288,
            },
            Notice::DataOffsetForced {
                path:      path.clone(),
                requested: 524288,
            },
            Notice::ZonedWritethrough { path },
        ]
    );
    let sb = &report.devices[0].sb;
    assert_eq!(sb.data_offset, 0);
    assert_eq!(sb.cache_mode(), Some(CacheMode::Writethrough));

    let requests = host.requests();
    assert_eq!(requests.len(), 1);
    let native = &requests[0].1[32..];
    assert_eq!(ne_u64(native, 16), BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
    assert_eq!(ne_u64(native, 184), 0);
    // Cache mode lives in the low bits of the flags word.
    assert_eq!(ne_u64(native, 104) & 0xf, 0);
    assert!(sb_region_is_blank(&disk));
}
