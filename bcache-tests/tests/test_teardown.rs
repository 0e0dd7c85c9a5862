use std::path::PathBuf;

use bcache::{
    operations::{format, teardown::RELEASE_ATTEMPTS, FormatConfig},
    test::MockHost,
    BcError, CacheMode, Uuid,
};
use bcache_macros::*;
use bcache_tests::{backing_requests, name_of, read_sb, sb_region_is_blank};

const NVME: &str = "/dev/bcache-test/nvme0n1";
const SDB: &str = "/dev/bcache-test/sdb";

fn config(cache: &[&str], backing: &[&str], force: bool) -> FormatConfig {
    FormatConfig {
        cache_devices: cache.iter().map(PathBuf::from).collect(),
        backing_devices: backing_requests(backing, CacheMode::Writethrough),
        block_size: Some(1),
        force,
        ..FormatConfig::default()
    }
}

#[test_bcache]
fn test_busy_without_force() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 21);
    host.set_backing_instance(&name_of(SDB));
    host.set_busy(SDB, 1);

    assert!(matches!(
        format(&host, &config(&[], &[SDB], false)),
        Err(BcError::DeviceBusy(_))
    ));
    assert_eq!(host.pauses(), 0);
    assert!(sb_region_is_blank(&disk));
}

#[test_bcache]
fn test_force_stops_backing() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 21);
    let name = name_of(SDB);
    host.set_backing_instance(&name);
    host.set_busy(SDB, 2);

    format(&host, &config(&[], &[SDB], true)).unwrap();
    assert_eq!(host.pauses(), 2);
    assert_eq!(
        host.sysfs_attr(&format!("class/block/{}/bcache/stop", name)).as_deref(),
        Some("1")
    );
    assert!(read_sb(&disk).is_ok());
}

#[test_bcache]
fn test_force_unregisters_cache_set() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(NVME, 1 << 21);
    let set = Uuid::generate();
    host.set_cache_instance(&name_of(NVME), &set);
    host.set_busy(NVME, 3);

    format(&host, &config(&[NVME], &[], true)).unwrap();
    assert_eq!(host.pauses(), 3);
    assert_eq!(
        host.sysfs_attr(&format!("fs/bcache/{}/unregister", set)).as_deref(),
        Some("1")
    );
    assert!(read_sb(&disk).is_ok());
}

#[test_bcache]
fn test_failed_release() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 21);
    host.set_backing_instance(&name_of(SDB));
    host.set_busy(SDB, 1 + RELEASE_ATTEMPTS);

    assert!(matches!(
        format(&host, &config(&[], &[SDB], true)),
        Err(BcError::FailedRelease { attempts: 3, .. })
    ));
    assert_eq!(host.pauses(), RELEASE_ATTEMPTS);
    assert!(sb_region_is_blank(&disk));
}

#[test_bcache]
fn test_busy_but_not_bcache() {
    let host = MockHost::new();
    host.add_mem_disk(SDB, 1 << 21);
    host.set_busy(SDB, 1);
    assert!(matches!(
        format(&host, &config(&[], &[SDB], true)),
        Err(BcError::NotABcacheDevice(_))
    ));
}

#[test_bcache]
fn test_overwrite_existing() {
    let host = MockHost::new();
    let disk = host.add_mem_disk(SDB, 1 << 21);
    format(&host, &config(&[], &[SDB], false)).unwrap();
    let first = read_sb(&disk).unwrap();

    assert!(matches!(
        format(&host, &config(&[], &[SDB], false)),
        Err(BcError::AlreadyFormatted(_))
    ));
    assert_eq!(read_sb(&disk).unwrap(), first);

    let wipe = FormatConfig {
        wipe_bcache: true,
        ..config(&[], &[SDB], false)
    };
    format(&host, &wipe).unwrap();
    let second = read_sb(&disk).unwrap();
    assert_ne!(second.uuid, first.uuid);

    // --force implies --wipe-bcache.
    format(&host, &config(&[], &[SDB], true)).unwrap();
    assert_ne!(read_sb(&disk).unwrap().uuid, second.uuid);
}
