use std::path::{Path, PathBuf};

use bcache::{
    operations::{format, format_with, BackingRequest, FormatConfig, Transport},
    test::MockHost,
    BcError, CacheMode, DiskMem, Host, Notice, Role, Uuid, BCACHE_SB_VERSION_BDEV,
    BCACHE_SB_VERSION_BDEV_WITH_OFFSET, BCACHE_SB_VERSION_CDEV,
};
use bcache_macros::*;
use bcache_tests::{attach_image, backing_requests, imagegen::generators::*, read_sb, sb_region_is_blank};
use itertools::Itertools;

const NVME: &str = "/dev/bcache-test/nvme0n1";
const SDB: &str = "/dev/bcache-test/sdb";
const SDC: &str = "/dev/bcache-test/sdc";

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

#[test_bcache]
fn test_cache_1g() {
    let host = MockHost::new();
    let image = generate_image!(4);
    let disk = attach_image(&host, NVME, &image);

    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        block_size: Some(8),
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();
    assert_eq!(report.devices.len(), 1);
    let sb = &report.devices[0].sb;
    assert_eq!(sb.version, BCACHE_SB_VERSION_CDEV);
    assert_eq!(sb.nbuckets, 2048);
    assert_eq!(sb.first_bucket, 1);
    assert_eq!(sb.nr_in_set, 1);
    assert_eq!(sb.nr_this_dev, 0);
    assert_eq!(sb.set_uuid, cfg.set_uuid);
    assert_eq!(&read_sb(&disk).unwrap(), sb);
}

#[test_bcache]
fn test_block_size_is_derived() {
    let host = MockHost::new();
    host.add_disk(NVME, DiskMem::with_geometry(1 << 21, 4096, true));
    host.add_disk(SDB, DiskMem::with_geometry(1 << 21, 512, true));

    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        backing_devices: backing_requests(&[SDB], CacheMode::Writethrough),
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();
    assert!(report.devices.iter().all(|d| d.sb.block_size == 8));
}

#[test_bcache]
fn test_cache_then_backing() {
    let host = MockHost::new();
    host.add_mem_disk(NVME, 1 << 21);
    host.add_mem_disk(SDB, 1 << 21);
    host.add_mem_disk(SDC, 1 << 21);

    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        backing_devices: backing_requests(&[SDB, SDC], CacheMode::Writethrough),
        label: bcache::Label::new("tier").unwrap(),
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();
    let order: Vec<(&Path, Role)> = report.devices.iter().map(|d| (d.path.as_path(), d.role)).collect();
    assert_eq!(
        order,
        vec![
            (Path::new(NVME), Role::Cache),
            (Path::new(SDB), Role::Backing),
            (Path::new(SDC), Role::Backing)
        ]
    );
    for dev in &report.devices {
        let sb = read_sb(&host.disk(&dev.path)).unwrap();
        assert_eq!(sb.set_uuid, cfg.set_uuid);
        assert_eq!(sb.label.text(), "tier");
        assert_eq!(dev.transport, Transport::DirectWrite);
    }
    // Every device gets its own identity.
    assert!(report.devices.iter().map(|d| d.sb.uuid).all_unique());
    assert_eq!(report.devices[1].sb.version, BCACHE_SB_VERSION_BDEV);
    assert_eq!(report.devices[1].sb.cache_mode(), Some(CacheMode::Writethrough));
}

#[test_bcache]
fn test_device_count_checks() {
    let host = MockHost::new();
    assert!(matches!(
        format(&host, &FormatConfig::default()),
        Err(BcError::NoDevicesSpecified)
    ));
    let cfg = FormatConfig {
        cache_devices: paths(&[NVME, SDB]),
        ..FormatConfig::default()
    };
    assert!(matches!(format(&host, &cfg), Err(BcError::MultipleCacheDevices(2))));
}

#[test_bcache]
fn test_size_relationship_checked_first() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(NVME, 1 << 21);
    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        block_size: Some(16),
        bucket_size: 8,
        ..FormatConfig::default()
    };
    assert!(matches!(
        format(&host, &cfg),
        Err(BcError::InvalidSizeRelationship { block: 16, bucket: 8 })
    ));
    assert!(sb_region_is_blank(&disk));
}

#[test_bcache]
fn test_bucket_grid() {
    // nbuckets is the device size over the bucket size.
    for (sectors, bucket) in [1u64 << 18, 1 << 21].iter().cartesian_product([128u32, 1024, 8192].iter()) {
        let host = MockHost::new();
        host.add_mem_disk(NVME, *sectors);
        let cfg = FormatConfig {
            cache_devices: paths(&[NVME]),
            block_size: Some(1),
            bucket_size: *bucket,
            ..FormatConfig::default()
        };
        let nbuckets = sectors / u64::from(*bucket);
        match format(&host, &cfg) {
            Ok(report) => {
                assert_eq!(report.devices[0].sb.nbuckets, nbuckets);
                assert!(nbuckets >= 128);
            }
            Err(BcError::DeviceTooSmall { nbuckets: n, .. }) => {
                assert_eq!(n, nbuckets);
                assert!(nbuckets < 128);
            }
            Err(e) => panic!("unexpected error {}", e),
        }
    }
}

#[test_bcache]
fn test_too_small_writes_nothing() {
    let host = MockHost::new();
    let image = generate_image!(3);
    let disk = attach_image(&host, NVME, &image);
    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        block_size: Some(8),
        ..FormatConfig::default()
    };
    assert!(matches!(
        format(&host, &cfg),
        Err(BcError::DeviceTooSmall { nbuckets: 127, .. })
    ));
    assert!(sb_region_is_blank(&disk));
}

#[test_bcache]
fn test_foreign_signature() {
    let host = MockHost::new();
    let cache = host.add_mem_disk(NVME, 1 << 21);
    let backing = host.add_mem_disk(SDB, 1 << 21);
    host.set_foreign(SDB);

    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        backing_devices: backing_requests(&[SDB], CacheMode::Writethrough),
        force: true,
        ..FormatConfig::default()
    };
    let mut done = Vec::new();
    assert!(matches!(
        format_with(&host, &cfg, |dev| done.push(dev.path.clone())),
        Err(BcError::ForeignSignaturePresent(_))
    ));
    // The cache device formatted before the failure stays formatted, and was reported.
    assert_eq!(done, paths(&[NVME]));
    assert!(read_sb(&cache).is_ok());
    assert!(sb_region_is_blank(&backing));
}

#[test_bcache]
fn test_zoned_backing() {
    let host = MockHost::new();
    host.add_mem_disk(SDB, 1 << 24);
    host.add_mem_disk(SDC, 1 << 24);
    host.set_zoned(&bcache_tests::name_of(SDB), 524288);

    let cfg = FormatConfig {
        backing_devices: backing_requests(&[SDB, SDC], CacheMode::Writeback),
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();

    let zoned = &report.devices[0].sb;
    assert_eq!(zoned.cache_mode(), Some(CacheMode::Writethrough));
    assert_eq!(zoned.version, BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
    assert_eq!(zoned.data_offset, 524288);

    // The next device is unaffected.
    let plain = &report.devices[1].sb;
    assert_eq!(plain.cache_mode(), Some(CacheMode::Writeback));
    assert_eq!(plain.version, BCACHE_SB_VERSION_BDEV);
    assert_eq!(plain.effective_data_offset(), 16);

    assert_eq!(
        report.notices,
        vec![
            Notice::ZonedDataOffset {
                path:   PathBuf::from(SDB),
                offset: 524288,
            },
            Notice::ZonedWritethrough { path: PathBuf::from(SDB) },
        ]
    );
    assert_eq!(read_sb(&host.disk(SDB)).unwrap(), *zoned);
}

#[test_bcache]
fn test_discard_cache() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(NVME, 1 << 21);
    disk.clone().write_at(1 << 20, b"stale").unwrap();

    let cfg = FormatConfig {
        cache_devices: paths(&[NVME]),
        discard: true,
        replacement: bcache::ReplacementPolicy::Fifo,
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();
    assert!(report.notices.is_empty());
    let mut back = [0xffu8; 5];
    disk.clone().read_at(1 << 20, &mut back).unwrap();
    assert_eq!(back, [0; 5]);

    let sb = read_sb(&disk).unwrap();
    assert_eq!(
        sb.flags,
        bcache::SbFlags::Cache {
            sync:        false,
            discard:     true,
            replacement: bcache::ReplacementPolicy::Fifo,
        }
    );
}

#[test_bcache]
fn test_set_uuid_is_kept() {
    let host = MockHost::new();
    host.add_mem_disk(SDB, 1 << 21);
    let set = Uuid::parse("5f0b9a8e-2d1c-4b3a-8f7e-6d5c4b3a2918").unwrap();
    let cfg = FormatConfig {
        backing_devices: backing_requests(&[SDB], CacheMode::Writethrough),
        set_uuid: set,
        ..FormatConfig::default()
    };
    format(&host, &cfg).unwrap();
    assert_eq!(read_sb(&host.disk(SDB)).unwrap().set_uuid, set);
    assert!(host.open_shared(Path::new(SDB)).is_ok());
}

#[test_bcache]
fn test_per_device_cache_mode() {
    let host = MockHost::new();
    let sdb = host.add_mem_disk(SDB, 1 << 21);
    let sdc = host.add_mem_disk(SDC, 1 << 21);

    let cfg = FormatConfig {
        backing_devices: vec![
            BackingRequest::new(SDB, CacheMode::Writeback),
            BackingRequest::new(SDC, CacheMode::Writethrough),
        ],
        ..FormatConfig::default()
    };
    let report = format(&host, &cfg).unwrap();
    assert!(report.notices.is_empty());

    // Low bits of the flags word at byte 104 hold the cache mode.
    let flags_word = |disk: &bcache::Disk| {
        let region = disk.clone().read_sb_region().unwrap();
        let mut word = [0u8; 8];
        word.copy_from_slice(&region[104..112]);
        u64::from_le_bytes(word)
    };
    assert_eq!(flags_word(&sdb) & 0xf, 1);
    assert_eq!(flags_word(&sdc) & 0xf, 0);
    assert_eq!(read_sb(&sdb).unwrap().cache_mode(), Some(CacheMode::Writeback));
    assert_eq!(read_sb(&sdc).unwrap().cache_mode(), Some(CacheMode::Writethrough));
}
