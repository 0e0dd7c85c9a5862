use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use crate::{probe::Sysfs, sys, BcError, BcResult, Disk, DiskFile};

/// Everything the formatting flows need from the operating system.
pub trait Host {
    /// Opens a device read-write, failing with [`BcError::DeviceBusy`] when it is claimed.
    fn open_exclusive(&self, path: &Path) -> BcResult<Disk>;
    /// Opens a device for reading only.
    fn open_shared(&self, path: &Path) -> BcResult<Disk>;
    /// True when the device carries a filesystem or partition table other than bcache.
    fn has_foreign_signature(&self, path: &Path) -> BcResult<bool>;
    /// The sysfs tree describing block devices and running bcache instances.
    fn sysfs(&self) -> &Sysfs;
    /// Hands a `struct bch_register_device` for `path` to the kernel.
    fn register_device(&self, path: &Path, request: &mut [u8]) -> BcResult<()>;
    /// Waits before retrying.
    fn pause(&self, duration: Duration);
}

/// The real system.
#[derive(Debug, Clone)]
pub struct LinuxHost {
    sysfs:    Sysfs,
    ctrl_dev: PathBuf,
    blkid:    PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        LinuxHost {
            sysfs:    Sysfs::default(),
            ctrl_dev: PathBuf::from("/dev/bcache_ctrl"),
            blkid:    PathBuf::from("blkid"),
        }
    }
}

impl LinuxHost {
    /// A host using `/sys`, `/dev/bcache_ctrl` and `blkid` from `PATH`.
    pub fn new() -> LinuxHost {
        LinuxHost::default()
    }
    /// Uses another sysfs mount.
    pub fn with_sysfs(mut self, sysfs: Sysfs) -> LinuxHost {
        self.sysfs = sysfs;
        self
    }
    /// Uses another control device node.
    pub fn with_control_device(mut self, path: impl Into<PathBuf>) -> LinuxHost {
        self.ctrl_dev = path.into();
        self
    }
    /// Uses another `blkid` executable.
    pub fn with_blkid(mut self, path: impl Into<PathBuf>) -> LinuxHost {
        self.blkid = path.into();
        self
    }
}

impl Host for LinuxHost {
    fn open_exclusive(&self, path: &Path) -> BcResult<Disk> {
        DiskFile::open_exclusive(path)
    }
    fn open_shared(&self, path: &Path) -> BcResult<Disk> {
        DiskFile::open_shared(path)
    }
    fn has_foreign_signature(&self, path: &Path) -> BcResult<bool> {
        // Low-level probe of superblocks and partition tables.
        let output = Command::new(&self.blkid)
            .args(&["-p", "-o", "export"])
            .arg(path)
            .output()
            .map_err(|e| BcError::Probe {
                path:   path.to_path_buf(),
                detail: format!("can't run {}: {}", self.blkid.display(), e),
            })?;
        blkid_verdict(path, output.status.code(), &output.stdout, &output.stderr)
    }
    fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }
    fn register_device(&self, path: &Path, request: &mut [u8]) -> BcResult<()> {
        let ctrl = File::open(&self.ctrl_dev).map_err(|source| BcError::ControlDeviceUnavailable {
            path: self.ctrl_dev.clone(),
            source,
        })?;
        sys::bch_register_device(&ctrl, request).map_err(|source| BcError::Registration {
            path: path.to_path_buf(),
            source,
        })
    }
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Interprets the exit status and output of `blkid -p -o export`.
pub(crate) fn blkid_verdict(path: &Path, code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> BcResult<bool> {
    match code {
        Some(0) => {
            let text = String::from_utf8_lossy(stdout);
            debug!("{}: blkid reports {:?}", path.display(), text.trim());
            Ok(foreign_in_export(&text))
        }
        // Nothing detected.
        Some(2) => Ok(false),
        // Several conflicting signatures.
        Some(8) => {
            debug!("{}: blkid found ambivalent signatures", path.display());
            Ok(true)
        }
        code => Err(BcError::Probe {
            path:   path.to_path_buf(),
            detail: format!(
                "blkid exited with {:?}: {}",
                code,
                String::from_utf8_lossy(stderr).trim()
            ),
        }),
    }
}

/// Reads `blkid -o export` output. Any type other than bcache counts as foreign.
pub(crate) fn foreign_in_export(text: &str) -> bool {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| *key == "TYPE" || *key == "PTTYPE")
        .any(|(_, value)| value.trim() != "bcache")
}

#[test]
fn blkid_export_parsing() {
    assert!(foreign_in_export("DEVNAME=/dev/sdb\nUUID=1234\nTYPE=ext4\nUSAGE=filesystem\n"));
    assert!(foreign_in_export("DEVNAME=/dev/sdb\nPTTYPE=gpt\n"));
    assert!(!foreign_in_export("DEVNAME=/dev/sdb\nTYPE=bcache\nUSAGE=other\n"));
    assert!(!foreign_in_export(""));
}

#[test]
fn blkid_exit_codes() {
    #![allow(clippy::unwrap_used)]
    let dev = Path::new("/dev/sdb");
    assert!(blkid_verdict(dev, Some(0), b"TYPE=xfs\n", b"").unwrap());
    assert!(!blkid_verdict(dev, Some(0), b"TYPE=bcache\n", b"").unwrap());
    assert!(!blkid_verdict(dev, Some(2), b"", b"").unwrap());
    assert!(blkid_verdict(dev, Some(8), b"", b"ambivalent result").unwrap());
    assert!(matches!(
        blkid_verdict(dev, Some(4), b"", b"usage"),
        Err(BcError::Probe { .. })
    ));
    assert!(matches!(blkid_verdict(dev, None, b"", b""), Err(BcError::Probe { .. })));
}

#[cfg(unix)]
#[test]
fn ambivalent_blkid_means_foreign() {
    #![allow(clippy::unwrap_used)]
    use std::{io::Write, os::unix::fs::PermissionsExt};

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("blkid");
    let mut file = File::create(&script).unwrap();
    file.write_all(b"#!/bin/sh\necho 'ambivalent result' >&2\nexit 8\n").unwrap();
    drop(file);
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let host = LinuxHost::new().with_blkid(&script);
    assert!(host.has_foreign_signature(Path::new("/dev/null")).unwrap());
}

#[test]
fn missing_control_device() {
    let host = LinuxHost::new().with_control_device("/nonexistent/bcache_ctrl");
    let mut request = vec![0u8; sys::REGISTER_DEVICE_SIZE];
    assert!(matches!(
        host.register_device(Path::new("/dev/sdb"), &mut request),
        Err(BcError::ControlDeviceUnavailable { .. })
    ));
}

#[test]
fn missing_blkid_is_a_probe_error() {
    let host = LinuxHost::new().with_blkid("/nonexistent/blkid");
    assert!(matches!(
        host.has_foreign_signature(Path::new("/dev/null")),
        Err(BcError::Probe { .. })
    ));
}
