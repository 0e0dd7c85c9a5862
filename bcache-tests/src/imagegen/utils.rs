use std::{fs::File, path::Path};

use bcache::SECTOR_SIZE;

pub fn create_file(f: &File, sectors: u64) {
    f.set_len(0).unwrap();
    f.set_len(sectors * SECTOR_SIZE).unwrap();
}

pub fn get_disk(f: &File) -> bcache::Disk {
    bcache::DiskFile::open_file(Path::new("image"), f.try_clone().unwrap()).unwrap()
}
