use std::fs::File;

use bcache::{
    CacheMode, Label, ReplacementPolicy, Role, SbParams, Superblock, Uuid, BDEV_DATA_START_DEFAULT,
    SB_START,
};

/// Sectors in a 64 MiB image.
const IMAGE_SECTORS: u64 = 64 << 11;

fn params(label: &str) -> SbParams {
    SbParams {
        block_size:  8,
        bucket_size: 1024,
        nbuckets:    0,
        cache_mode:  CacheMode::Writethrough,
        data_offset: BDEV_DATA_START_DEFAULT,
        discard:     false,
        replacement: ReplacementPolicy::Lru,
        set_uuid:    Uuid::generate(),
        label:       Label::new(label).unwrap(),
    }
}

/// Zero-filled file
pub fn generate_0000(f: &File) {
    super::utils::create_file(f, IMAGE_SECTORS)
}

/// Valid backing device superblock
pub fn generate_0001(f: &File) {
    generate_0000(f);

    let mut d = super::utils::get_disk(f);
    let mut sb = Superblock::populate(Role::Backing, &params("backing"));
    sb.update_checksum();
    d.write_at(SB_START, &sb.encode()).unwrap();
    d.sync().unwrap();
}

/// Cache device superblock with a corrupted label
pub fn generate_0002(f: &File) {
    generate_0000(f);

    let mut d = super::utils::get_disk(f);
    let mut sb = Superblock::populate(
        Role::Cache,
        &SbParams {
            nbuckets: IMAGE_SECTORS / 1024,
            ..params("cache")
        },
    );
    sb.update_checksum();
    let mut buf = sb.encode();
    // First byte of the label.
    buf[72] ^= 0x20;
    d.write_at(SB_START, &buf).unwrap();
    d.sync().unwrap();
}

/// Room for 127 buckets of 1024 sectors, one short of a cache device
pub fn generate_0003(f: &File) {
    super::utils::create_file(f, 127 * 1024)
}

/// 1 GiB sparse file
pub fn generate_0004(f: &File) {
    super::utils::create_file(f, 1 << 21)
}
