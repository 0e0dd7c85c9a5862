use std::path::Path;

use crate::{
    operations::{notify, teardown::Teardown, Notice},
    probe::{dev_name, has_cache_magic},
    BcError, BcResult, CacheMode, Host, Role, SbParams, Superblock, MIN_BUCKETS, SB_DISK_SIZE,
    SB_START,
};

/// Everything before the superblock is zeroed.
const HEAD_ZEROES: [u8; 4096] = [0; 4096];

/// How to treat existing state on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Stop a running instance holding the device, and overwrite its superblock.
    pub force:       bool,
    /// Overwrite an existing bcache superblock.
    pub wipe_bcache: bool,
}

/// Builds the superblock for `path`, applying device-specific corrections.
///
/// A zoned backing device cannot run in writeback mode; it is downgraded to
/// writethrough with a notice.
pub(crate) fn build_sb(
    host: &dyn Host,
    path: &Path,
    role: Role,
    params: &SbParams,
    notices: &mut Vec<Notice>,
) -> Superblock {
    let mut params = params.clone();
    if role == Role::Backing
        && params.cache_mode == CacheMode::Writeback
        && host.sysfs().is_zoned(&dev_name(path))
    {
        notify(notices, Notice::ZonedWritethrough { path: path.to_path_buf() });
        params.cache_mode = CacheMode::Writethrough;
    }
    Superblock::populate(role, &params)
}

/// Formats one device by writing its superblock directly.
///
/// Nothing is written before every conflict check has passed, except the
/// erasure of an old bcache superblock the caller asked to overwrite.
pub fn write_sb(
    host: &dyn Host,
    path: &Path,
    role: Role,
    params: &SbParams,
    opts: WriteOptions,
    notices: &mut Vec<Notice>,
) -> BcResult<Superblock> {
    let mut disk = match host.open_exclusive(path) {
        Ok(disk) => disk,
        Err(BcError::DeviceBusy(_)) if opts.force => {
            info!("{} is busy, stopping the running instance", path.display());
            Teardown::new(host, path).run()?
        }
        Err(e) => return Err(e),
    };

    let region = disk.read_sb_region()?;
    if has_cache_magic(&region) {
        assert_or_err!(
            opts.force || opts.wipe_bcache,
            BcError::AlreadyFormatted(path.to_path_buf())
        );
        info!("{}: erasing old bcache superblock", path.display());
        disk.write_at(SB_START, &[0u8; SB_DISK_SIZE])?;
    }

    assert_or_err!(
        !host.has_foreign_signature(path)?,
        BcError::ForeignSignaturePresent(path.to_path_buf())
    );

    let (sectors, _) = disk.geometry()?;
    let nbuckets = sectors / u64::from(params.bucket_size.max(1));
    if role == Role::Cache {
        assert_or_err!(
            nbuckets >= MIN_BUCKETS,
            BcError::DeviceTooSmall {
                path: path.to_path_buf(),
                nbuckets,
            }
        );
    }

    let mut sb = build_sb(host, path, role, &SbParams { nbuckets, ..params.clone() }, notices);

    if role == Role::Cache && params.discard {
        info!("{}: discarding", path.display());
        if let Err(e) = disk.discard_all() {
            notify(
                notices,
                Notice::DiscardSkipped {
                    path:   path.to_path_buf(),
                    reason: e.to_string(),
                },
            );
        }
    }

    sb.update_checksum();
    let encoded = sb.encode();
    disk.write_at(0, &HEAD_ZEROES)?;
    disk.write_at(SB_START, &encoded)?;
    disk.sync()?;
    info!("{}: wrote {} superblock, version {}", path.display(), role, sb.version);
    Ok(sb)
}

#[test]
fn head_covers_everything_before_the_superblock() {
    assert_eq!(HEAD_ZEROES.len() as u64, SB_START);
}

#[cfg(test)]
fn test_params() -> SbParams {
    SbParams {
        block_size:  1,
        bucket_size: 1024,
        nbuckets:    0,
        cache_mode:  CacheMode::Writeback,
        data_offset: crate::BDEV_DATA_START_DEFAULT,
        discard:     false,
        replacement: crate::ReplacementPolicy::Lru,
        set_uuid:    crate::Uuid::generate(),
        label:       crate::Label::default(),
    }
}

#[test]
fn cache_superblock_on_disk() {
    #![allow(clippy::unwrap_used)]
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/nvme0n1");
    let mut disk = host.add_mem_disk(path, 2 << 20);
    disk.write_at(0, &[0xff; 4096]).unwrap();

    let mut notices = Vec::new();
    let sb = write_sb(&host, path, Role::Cache, &test_params(), WriteOptions::default(), &mut notices).unwrap();
    assert_eq!(sb.nbuckets, 2048);
    assert_eq!(sb.first_bucket, 1);
    assert!(notices.is_empty());

    let mut head = [1u8; 4096];
    disk.read_at(0, &mut head).unwrap();
    assert!(head.iter().all(|b| *b == 0));
    assert_eq!(Superblock::decode(&disk.read_sb_region().unwrap()).unwrap(), sb);
}

#[test]
fn existing_superblock_needs_wipe() {
    #![allow(clippy::unwrap_used)]
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/sdb");
    host.add_mem_disk(path, 1 << 16);
    let mut notices = Vec::new();
    let first = write_sb(&host, path, Role::Backing, &test_params(), WriteOptions::default(), &mut notices).unwrap();

    assert!(matches!(
        write_sb(&host, path, Role::Backing, &test_params(), WriteOptions::default(), &mut notices),
        Err(BcError::AlreadyFormatted(_))
    ));
    let wipe = WriteOptions {
        wipe_bcache: true,
        ..WriteOptions::default()
    };
    let second = write_sb(&host, path, Role::Backing, &test_params(), wipe, &mut notices).unwrap();
    assert_ne!(first.uuid, second.uuid);
}

#[test]
fn small_cache_is_untouched() {
    #![allow(clippy::unwrap_used)]
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/sdd");
    let mut disk = host.add_mem_disk(path, 127 * 1024);
    disk.write_at(0, b"payload").unwrap();
    assert!(matches!(
        write_sb(&host, path, Role::Cache, &test_params(), WriteOptions::default(), &mut Vec::new()),
        Err(BcError::DeviceTooSmall { nbuckets: 127, .. })
    ));
    let mut back = [0u8; 7];
    disk.read_at(0, &mut back).unwrap();
    assert_eq!(&back, b"payload");
}

#[test]
fn discard_failure_is_a_notice() {
    #![allow(clippy::unwrap_used)]
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/cache.img");
    host.add_disk(path, crate::DiskMem::with_geometry(1 << 20, 4096, false));
    let params = SbParams {
        discard: true,
        ..test_params()
    };
    let mut notices = Vec::new();
    write_sb(&host, path, Role::Cache, &params, WriteOptions::default(), &mut notices).unwrap();
    assert!(matches!(notices[..], [Notice::DiscardSkipped { .. }]));
}
