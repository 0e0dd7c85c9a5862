use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempDir;

use crate::{BcError, BcResult, Disk, DiskMem, Host, Sysfs, Uuid};

/// An in-memory [`Host`]: disks are [`DiskMem`]s, sysfs is a scratch directory.
pub struct MockHost {
    disks:          RefCell<HashMap<PathBuf, Disk>>,
    busy:           RefCell<HashMap<PathBuf, u32>>,
    foreign:        RefCell<HashSet<PathBuf>>,
    requests:       RefCell<Vec<(PathBuf, Vec<u8>)>>,
    pauses:         Cell<u32>,
    ctrl_present:   Cell<bool>,
    register_errno: Cell<Option<i32>>,
    sysfs:          Sysfs,
    _sysfs_dir:     TempDir,
}

impl MockHost {
    pub fn new() -> MockHost {
        let dir = tempfile::tempdir().unwrap();
        MockHost {
            disks:          RefCell::new(HashMap::new()),
            busy:           RefCell::new(HashMap::new()),
            foreign:        RefCell::new(HashSet::new()),
            requests:       RefCell::new(Vec::new()),
            pauses:         Cell::new(0),
            ctrl_present:   Cell::new(true),
            register_errno: Cell::new(None),
            sysfs:          Sysfs::new(dir.path()),
            _sysfs_dir:     dir,
        }
    }

    /// Attaches `disk` at `path`.
    pub fn add_disk(&self, path: impl Into<PathBuf>, disk: Disk) -> Disk {
        self.disks.borrow_mut().insert(path.into(), disk.clone());
        disk
    }
    /// Attaches an empty block device of `sectors` at `path`.
    pub fn add_mem_disk(&self, path: impl Into<PathBuf>, sectors: u64) -> Disk {
        self.add_disk(path, DiskMem::open(sectors))
    }
    /// The next `count` exclusive opens of `path` fail as busy.
    pub fn set_busy(&self, path: impl Into<PathBuf>, count: u32) {
        self.busy.borrow_mut().insert(path.into(), count);
    }
    /// Makes the signature probe report a foreign filesystem on `path`.
    pub fn set_foreign(&self, path: impl Into<PathBuf>) {
        self.foreign.borrow_mut().insert(path.into());
    }
    /// Declares device `name` zoned with the given zone size.
    pub fn set_zoned(&self, name: &str, zone_sectors: u64) {
        let queue = self.sysfs.block_dir(name).join("queue");
        fs::create_dir_all(&queue).unwrap();
        fs::write(queue.join("zoned"), "host-managed\n").unwrap();
        fs::write(queue.join("chunk_sectors"), format!("{}\n", zone_sectors)).unwrap();
    }
    /// Declares a running backing instance on device `name`.
    pub fn set_backing_instance(&self, name: &str) {
        fs::create_dir_all(self.sysfs.block_dir(name).join("bcache")).unwrap();
    }
    /// Declares a running cache instance on device `name`, member of `set_uuid`.
    pub fn set_cache_instance(&self, name: &str, set_uuid: &Uuid) {
        let dir = self.sysfs.block_dir(name).join("bcache");
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(self.sysfs.set_dir(set_uuid)).unwrap();
        std::os::unix::fs::symlink(self.sysfs.set_dir(set_uuid), dir.join("set")).unwrap();
    }
    /// Removes the control device.
    pub fn remove_control_device(&self) {
        self.ctrl_present.set(false);
    }
    /// Makes the kernel reject registrations with `errno`.
    pub fn fail_registration(&self, errno: i32) {
        self.register_errno.set(Some(errno));
    }

    pub fn disk(&self, path: impl AsRef<Path>) -> Disk {
        self.disks.borrow()[path.as_ref()].clone()
    }
    /// Registration records handed to the control device.
    pub fn requests(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.requests.borrow().clone()
    }
    /// Number of pauses taken.
    pub fn pauses(&self) -> u32 {
        self.pauses.get()
    }
    /// Content written to a sysfs attribute, relative to the sysfs root.
    pub fn sysfs_attr(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.sysfs.root().join(rel)).ok()
    }
}

impl Host for MockHost {
    fn open_exclusive(&self, path: &Path) -> BcResult<Disk> {
        let disk = self.open_shared(path)?;
        if let Some(count) = self.busy.borrow_mut().get_mut(path) {
            if *count > 0 {
                *count -= 1;
                return Err(BcError::DeviceBusy(path.to_path_buf()));
            }
        }
        Ok(disk)
    }
    fn open_shared(&self, path: &Path) -> BcResult<Disk> {
        self.disks
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| BcError::DeviceNotFound(path.to_path_buf()))
    }
    fn has_foreign_signature(&self, path: &Path) -> BcResult<bool> {
        Ok(self.foreign.borrow().contains(path))
    }
    fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }
    fn register_device(&self, path: &Path, request: &mut [u8]) -> BcResult<()> {
        if !self.ctrl_present.get() {
            return Err(BcError::ControlDeviceUnavailable {
                path:   PathBuf::from("/dev/bcache_ctrl"),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        if let Some(errno) = self.register_errno.get() {
            return Err(BcError::Registration {
                path:   path.to_path_buf(),
                source: io::Error::from_raw_os_error(errno),
            });
        }
        self.requests.borrow_mut().push((path.to_path_buf(), request.to_vec()));
        Ok(())
    }
    fn pause(&self, duration: Duration) {
        trace!("pause {:?}", duration);
        self.pauses.set(self.pauses.get() + 1);
    }
}
