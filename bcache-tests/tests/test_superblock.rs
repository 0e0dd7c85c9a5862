use bcache::{probe, test::MockHost, BcError, InstanceKind, Role, Superblock};
use bcache_macros::*;
use bcache_tests::{attach_image, imagegen::generators::*};

#[test_bcache]
fn test_err_magic() {
    let image = generate_image!(0);

    let mut d = bcache_tests::imagegen::get_disk(image.as_file());
    let region = d.read_sb_region().unwrap();
    assert!(!probe::has_cache_magic(&region));
    assert!(matches!(Superblock::decode(&region), Err(BcError::BadMagic)));
}

#[test_bcache]
fn test_valid_backing() {
    let image = generate_image!(1);

    let mut d = bcache_tests::imagegen::get_disk(image.as_file());
    let sb = Superblock::decode(&d.read_sb_region().unwrap()).unwrap();
    assert_eq!(sb.role(), Role::Backing);
    assert_eq!(sb.label.text(), "backing");
    assert_eq!(sb.effective_data_offset(), 16);
    assert!(sb.verify_checksum());
}

#[test_bcache]
fn test_err_checksum() {
    let image = generate_image!(2);

    let mut d = bcache_tests::imagegen::get_disk(image.as_file());
    let region = d.read_sb_region().unwrap();
    assert!(probe::has_cache_magic(&region));
    assert!(matches!(Superblock::decode(&region), Err(BcError::BadChecksum { .. })));

    let sb = Superblock::decode_unchecked(&region).unwrap();
    assert_eq!(sb.role(), Role::Cache);
    assert_eq!(sb.label.text(), "Cache");
}

#[test_bcache]
fn test_instance_from_disk() {
    let host = MockHost::new();
    let backing = generate_image!(1);
    let cache = generate_image!(2);
    let blank = generate_image!(0);
    attach_image(&host, "/dev/bcache-test/sdb", &backing);
    attach_image(&host, "/dev/bcache-test/sdc", &cache);
    attach_image(&host, "/dev/bcache-test/sdd", &blank);

    let kind = |p: &str| probe::existing_instance_kind(&host, std::path::Path::new(p)).unwrap();
    assert_eq!(kind("/dev/bcache-test/sdb"), InstanceKind::Backing);
    assert!(matches!(kind("/dev/bcache-test/sdc"), InstanceKind::Cache { .. }));
    assert_eq!(kind("/dev/bcache-test/sdd"), InstanceKind::None);

    // Sysfs wins over what is on disk.
    host.set_backing_instance("sdc");
    assert_eq!(kind("/dev/bcache-test/sdc"), InstanceKind::Backing);
}
