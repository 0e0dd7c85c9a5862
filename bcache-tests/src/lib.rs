#![allow(unknown_lints)]
#![allow(require_stability_comment)]

use std::path::Path;

use bcache::{test::MockHost, BackingRequest, CacheMode, Disk, Superblock};

pub mod imagegen;

/// Attaches a generated image to `host` at `path`.
pub fn attach_image(host: &MockHost, path: &str, image: &tempfile::NamedTempFile) -> Disk {
    host.add_disk(path, imagegen::get_disk(image.as_file()))
}

/// Decodes the superblock found on a disk.
pub fn read_sb(disk: &Disk) -> bcache::BcResult<Superblock> {
    Superblock::decode(&disk.clone().read_sb_region()?)
}

/// True when nothing at all was written to the superblock sector.
pub fn sb_region_is_blank(disk: &Disk) -> bool {
    disk.clone()
        .read_sb_region()
        .unwrap()
        .iter()
        .all(|b| *b == 0)
}

/// The kernel name tests use for a mock device path.
pub fn name_of(path: &str) -> String {
    bcache::probe::dev_name(Path::new(path))
}

/// Backing requests for `paths`, all in `cache_mode`.
pub fn backing_requests(paths: &[&str], cache_mode: CacheMode) -> Vec<BackingRequest> {
    paths.iter().map(|p| BackingRequest::new(*p, cache_mode)).collect()
}
