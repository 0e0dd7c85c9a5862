use std::path::{Path, PathBuf};

use crate::{
    operations::{ioctl::register_sb_ioctl, notify, write::write_sb, Notice, WriteOptions},
    probe::{self, dev_name},
    size, BcError, BcResult, CacheMode, Host, Label, ReplacementPolicy, Role, SbParams,
    Superblock, Uuid, BDEV_DATA_START_DEFAULT, DEFAULT_BUCKET_SIZE,
};

/// How a backing device's superblock reaches the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Written to the device, registered later by the kernel reading it.
    DirectWrite,
    /// Handed to the control device, which registers the device at once.
    IoctlHandoff,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::DirectWrite
    }
}

/// A backing device to format, with the cache mode it should start in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingRequest {
    /// Device path.
    pub path:       PathBuf,
    /// Requested cache mode. Zoned devices never get writeback.
    pub cache_mode: CacheMode,
}

impl BackingRequest {
    /// Requests `path` in `cache_mode`.
    pub fn new(path: impl Into<PathBuf>, cache_mode: CacheMode) -> BackingRequest {
        BackingRequest {
            path: path.into(),
            cache_mode,
        }
    }
}

impl From<PathBuf> for BackingRequest {
    fn from(path: PathBuf) -> Self {
        BackingRequest::new(path, CacheMode::default())
    }
}

/// A complete formatting request.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    /// At most one cache device.
    pub cache_devices:   Vec<PathBuf>,
    /// Backing devices, formatted in order.
    pub backing_devices: Vec<BackingRequest>,
    /// Block size in sectors; derived from the devices when `None`.
    pub block_size:      Option<u16>,
    /// Bucket size in sectors.
    pub bucket_size:     u32,
    /// Start of data on backing devices, in sectors.
    pub data_offset:     u64,
    /// Discard the cache device and enable discards on it.
    pub discard:         bool,
    /// Overwrite existing bcache superblocks.
    pub wipe_bcache:     bool,
    /// Stop running instances and overwrite their superblocks.
    pub force:           bool,
    /// Cache replacement policy.
    pub replacement:     ReplacementPolicy,
    /// Cache set the devices join.
    pub set_uuid:        Uuid,
    /// Label of every formatted device.
    pub label:           Label,
    /// Transport used for backing devices.
    pub transport:       Transport,
}

impl Default for FormatConfig {
    fn default() -> Self {
        FormatConfig {
            cache_devices:   Vec::new(),
            backing_devices: Vec::new(),
            block_size:      None,
            bucket_size:     DEFAULT_BUCKET_SIZE,
            data_offset:     BDEV_DATA_START_DEFAULT,
            discard:         false,
            wipe_bcache:     false,
            force:           false,
            replacement:     ReplacementPolicy::default(),
            set_uuid:        Uuid::generate(),
            label:           Label::default(),
            transport:       Transport::default(),
        }
    }
}

impl FormatConfig {
    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            force:       self.force,
            wipe_bcache: self.wipe_bcache,
        }
    }
}

/// One device that was formatted.
#[derive(Debug, Clone)]
pub struct FormattedDevice {
    /// Device path.
    pub path:      PathBuf,
    /// Role given to it.
    pub role:      Role,
    /// How its superblock was delivered.
    pub transport: Transport,
    /// The superblock, as written or handed over.
    pub sb:        Superblock,
}

/// The outcome of a successful [`format`].
#[derive(Debug, Clone, Default)]
pub struct FormatReport {
    /// Devices in the order they were formatted.
    pub devices: Vec<FormattedDevice>,
    /// Corrections applied along the way.
    pub notices: Vec<Notice>,
}

/// Formats the cache device, then every backing device.
///
/// Stops at the first error. Devices formatted before it stay formatted.
pub fn format(host: &dyn Host, cfg: &FormatConfig) -> BcResult<FormatReport> {
    format_with(host, cfg, |_| {})
}

/// Like [`format`], calling `on_formatted` as soon as each device is done.
pub fn format_with<F>(host: &dyn Host, cfg: &FormatConfig, mut on_formatted: F) -> BcResult<FormatReport>
where
    F: FnMut(&FormattedDevice),
{
    assert_or_err!(
        !cfg.cache_devices.is_empty() || !cfg.backing_devices.is_empty(),
        BcError::NoDevicesSpecified
    );
    assert_or_err!(
        cfg.cache_devices.len() <= 1,
        BcError::MultipleCacheDevices(cfg.cache_devices.len())
    );
    size::check_data_offset(cfg.data_offset)?;

    let block_size = match cfg.block_size {
        Some(block) => block,
        None => {
            let mut sizes = Vec::new();
            let backing = cfg.backing_devices.iter().map(|r| &r.path);
            for path in cfg.cache_devices.iter().chain(backing) {
                sizes.push(probe::geometry(host, path)?.1);
            }
            let block = size::derive_block_size(sizes);
            debug!("derived block size: {} sectors", block);
            block
        }
    };
    size::check_relationship(block_size, cfg.bucket_size)?;

    let params = SbParams {
        block_size,
        bucket_size: cfg.bucket_size,
        nbuckets: 0,
        cache_mode: CacheMode::default(),
        data_offset: cfg.data_offset,
        discard: cfg.discard,
        replacement: cfg.replacement,
        set_uuid: cfg.set_uuid,
        label: cfg.label,
    };

    let mut report = FormatReport::default();

    for path in &cfg.cache_devices {
        if cfg.transport == Transport::IoctlHandoff {
            notify(&mut report.notices, Notice::IoctlIgnoredForCache { path: path.clone() });
        }
        let sb = write_sb(host, path, Role::Cache, &params, cfg.write_options(), &mut report.notices)?;
        let device = FormattedDevice {
            path: path.clone(),
            role: Role::Cache,
            transport: Transport::DirectWrite,
            sb,
        };
        on_formatted(&device);
        report.devices.push(device);
    }

    for request in &cfg.backing_devices {
        let path = &request.path;
        let mut params = params.clone();
        params.cache_mode = request.cache_mode;
        params.data_offset = zoned_data_offset(host, path, params.data_offset, &mut report.notices);
        let sb = match cfg.transport {
            Transport::DirectWrite => write_sb(
                host,
                path,
                Role::Backing,
                &params,
                cfg.write_options(),
                &mut report.notices,
            )?,
            Transport::IoctlHandoff => register_sb_ioctl(host, path, &params, &mut report.notices)?,
        };
        let device = FormattedDevice {
            path: path.clone(),
            role: Role::Backing,
            transport: cfg.transport,
            sb,
        };
        on_formatted(&device);
        report.devices.push(device);
    }

    Ok(report)
}

/// Data on a zoned device must start on a zone boundary.
fn zoned_data_offset(host: &dyn Host, path: &Path, offset: u64, notices: &mut Vec<Notice>) -> u64 {
    let name = dev_name(path);
    if !host.sysfs().is_zoned(&name) {
        return offset;
    }
    let aligned = size::round_to_zone(offset, host.sysfs().zone_sectors(&name));
    if aligned != offset {
        notify(
            notices,
            Notice::ZonedDataOffset {
                path:   path.to_path_buf(),
                offset: aligned,
            },
        );
    }
    aligned
}
