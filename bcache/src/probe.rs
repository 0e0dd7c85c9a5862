use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{BcError, BcResult, Host, Role, Superblock, Uuid};

/// What, if anything, is currently running on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    /// No bcache instance.
    None,
    /// A cache device, member of the given set.
    Cache {
        /// The set to unregister to release the device.
        set_uuid: Uuid,
    },
    /// A backing device.
    Backing,
}

/// A sysfs mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Sysfs::new("/sys")
    }
}

impl Sysfs {
    /// A sysfs tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Sysfs {
        Sysfs { root: root.into() }
    }
    /// The mount point.
    pub fn root(&self) -> &Path {
        &self.root
    }
    /// `/sys/class/block/<name>`.
    pub fn block_dir(&self, name: &str) -> PathBuf {
        self.root.join("class/block").join(name)
    }
    /// `/sys/fs/bcache/<set>`.
    pub fn set_dir(&self, set_uuid: &Uuid) -> PathBuf {
        self.root.join("fs/bcache").join(set_uuid.to_string())
    }

    // The queue attribute of a disk, or of the parent disk for a partition.
    fn queue_attr(&self, name: &str, attr: &str) -> Option<String> {
        let dir = self.block_dir(name);
        let own = dir.join("queue").join(attr);
        let path = if own.exists() {
            own
        } else {
            let real = fs::canonicalize(&dir).ok()?;
            real.parent()?.join("queue").join(attr)
        };
        let text = fs::read_to_string(&path).ok()?;
        trace!("{}: {}", path.display(), text.trim());
        Some(text.trim().to_string())
    }
    /// True when the device reports a zoned model.
    pub fn is_zoned(&self, name: &str) -> bool {
        matches!(self.queue_attr(name, "zoned"), Some(model) if model != "none")
    }
    /// Zone size in sectors, 0 when unknown.
    pub fn zone_sectors(&self, name: &str) -> u64 {
        self.queue_attr(name, "chunk_sectors")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// The running bcache instance on a device, if sysfs knows one.
    pub fn instance_kind(&self, name: &str) -> BcResult<InstanceKind> {
        let dir = self.block_dir(name).join("bcache");
        if !dir.exists() {
            return Ok(InstanceKind::None);
        }
        let set = dir.join("set");
        match fs::read_link(&set) {
            Ok(target) => {
                let uuid = target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| BcError::InvalidUuid(target.display().to_string()))?;
                Ok(InstanceKind::Cache {
                    set_uuid: Uuid::parse(uuid)?,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(InstanceKind::Backing),
            Err(e) => Err(e.into()),
        }
    }
    /// Asks the kernel to stop the backing device `name`.
    pub fn stop_backing(&self, name: &str) -> BcResult<()> {
        let path = self.block_dir(name).join("bcache/stop");
        info!("stopping backing device via {}", path.display());
        fs::write(path, "1")?;
        Ok(())
    }
    /// Asks the kernel to unregister the whole cache set.
    pub fn unregister_set(&self, set_uuid: &Uuid) -> BcResult<()> {
        let path = self.set_dir(set_uuid).join("unregister");
        info!("unregistering cache set via {}", path.display());
        fs::write(path, "1")?;
        Ok(())
    }
}

/// The kernel name of a device node, e.g. `sdb` for `/dev/sdb`.
///
/// Symlinks such as `/dev/disk/by-id/...` are resolved first.
pub fn dev_name(path: &Path) -> String {
    let real = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    real.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `(sectors, logical block size in sectors)` of a device.
pub fn geometry(host: &dyn Host, path: &Path) -> BcResult<(u64, u32)> {
    host.open_shared(path)?.geometry()
}

/// True when the device carries a non-bcache signature.
pub fn has_foreign_signature(host: &dyn Host, path: &Path) -> BcResult<bool> {
    host.has_foreign_signature(path)
}

/// True when the superblock region read from a device carries the bcache magic.
pub fn has_cache_magic(region: &[u8]) -> bool {
    crate::ondisk::has_cache_magic(region)
}

/// The bcache instance holding a device.
///
/// Sysfs is consulted first. A device sysfs knows nothing about is classified
/// from the superblock on disk, which is what the running instance was
/// registered from.
pub fn existing_instance_kind(host: &dyn Host, path: &Path) -> BcResult<InstanceKind> {
    let name = dev_name(path);
    let kind = host.sysfs().instance_kind(&name)?;
    if kind != InstanceKind::None {
        debug!("{}: sysfs reports {:?}", path.display(), kind);
        return Ok(kind);
    }
    let region = host.open_shared(path)?.read_sb_region()?;
    Ok(match Superblock::decode_unchecked(&region) {
        Ok(sb) => match sb.role() {
            Role::Backing => InstanceKind::Backing,
            Role::Cache => InstanceKind::Cache {
                set_uuid: sb.set_uuid,
            },
        },
        Err(_) => InstanceKind::None,
    })
}

#[cfg(test)]
fn fake_sysfs() -> (tempfile::TempDir, Sysfs) {
    #![allow(clippy::unwrap_used)]
    let dir = tempfile::tempdir().unwrap();
    let sysfs = Sysfs::new(dir.path());
    (dir, sysfs)
}

#[test]
fn zoned_partition_uses_parent_queue() {
    #![allow(clippy::unwrap_used)]
    let (dir, sysfs) = fake_sysfs();
    let disk = dir.path().join("devices/sdb");
    fs::create_dir_all(disk.join("queue")).unwrap();
    fs::create_dir_all(disk.join("sdb1")).unwrap();
    fs::write(disk.join("queue/zoned"), "host-managed\n").unwrap();
    fs::write(disk.join("queue/chunk_sectors"), "524288\n").unwrap();
    fs::create_dir_all(dir.path().join("class/block")).unwrap();
    std::os::unix::fs::symlink(&disk, sysfs.block_dir("sdb")).unwrap();
    std::os::unix::fs::symlink(disk.join("sdb1"), sysfs.block_dir("sdb1")).unwrap();

    assert!(sysfs.is_zoned("sdb"));
    assert!(sysfs.is_zoned("sdb1"));
    assert_eq!(sysfs.zone_sectors("sdb1"), 524288);
    assert!(!sysfs.is_zoned("sdc"));
    assert_eq!(sysfs.zone_sectors("sdc"), 0);

    fs::write(disk.join("queue/zoned"), "none\n").unwrap();
    assert!(!sysfs.is_zoned("sdb1"));
}

#[test]
fn instance_kind_from_sysfs() {
    #![allow(clippy::unwrap_used)]
    let (dir, sysfs) = fake_sysfs();
    let set = Uuid::parse("8b1c5a1e-3f5d-4c3e-9b1a-1d2e3f405162").unwrap();
    fs::create_dir_all(sysfs.block_dir("sdb").join("bcache")).unwrap();
    fs::create_dir_all(sysfs.block_dir("nvme0n1").join("bcache")).unwrap();
    fs::create_dir_all(sysfs.set_dir(&set)).unwrap();
    std::os::unix::fs::symlink(sysfs.set_dir(&set), sysfs.block_dir("nvme0n1").join("bcache/set")).unwrap();

    assert_eq!(sysfs.instance_kind("sdb").unwrap(), InstanceKind::Backing);
    assert_eq!(
        sysfs.instance_kind("nvme0n1").unwrap(),
        InstanceKind::Cache { set_uuid: set }
    );
    assert_eq!(sysfs.instance_kind("sdc").unwrap(), InstanceKind::None);

    sysfs.unregister_set(&set).unwrap();
    assert_eq!(fs::read_to_string(sysfs.set_dir(&set).join("unregister")).unwrap(), "1");
    sysfs.stop_backing("sdb").unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("class/block/sdb/bcache/stop")).unwrap(),
        "1"
    );
}

#[test]
fn dev_name_of_missing_path() {
    assert_eq!(dev_name(Path::new("/nonexistent/sdq")), "sdq");
}
