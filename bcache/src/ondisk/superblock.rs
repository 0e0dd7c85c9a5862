use std::{convert::TryFrom, fmt};

use crc::{Crc, CRC_64_WE};
use strum_macros::Display;

use crate::{
    BcError, BcResult, CacheMode, ReplacementPolicy, SbFlags, Uuid, BCACHE_MAGIC,
    BDEV_DATA_START_DEFAULT, SB_JOURNAL_BUCKETS, SB_LABEL_SIZE, SB_SECTOR,
};

/// Cache device.
pub const BCACHE_SB_VERSION_CDEV: u64 = 0;
/// Backing device.
pub const BCACHE_SB_VERSION_BDEV: u64 = 1;
/// Cache device with a per-device UUID.
pub const BCACHE_SB_VERSION_CDEV_WITH_UUID: u64 = 3;
/// Backing device with an explicit data offset.
pub const BCACHE_SB_VERSION_BDEV_WITH_OFFSET: u64 = 4;
/// Cache device with feature words.
pub const BCACHE_SB_VERSION_CDEV_WITH_FEATURES: u64 = 5;
/// Backing device with feature words.
pub const BCACHE_SB_VERSION_BDEV_WITH_FEATURES: u64 = 6;

/// Incompat feature: bucket size is stored as its base-2 logarithm.
pub const FEATURE_INCOMPAT_LOG_LARGE_BUCKET_SIZE: u64 = 0x0002;

/// Size of the little-endian on-disk superblock.
pub const SB_DISK_SIZE: usize = 2264;

/// Size of the native-endian superblock the kernel takes over ioctl.
pub const SB_NATIVE_SIZE: usize = 2264;

/// Last sector of the reserved header region (superblock sector plus its size, minus one).
const HEADER_LAST_SECTOR: u16 = 23;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_WE);

/// Byte offsets of the on-disk layout.
mod disk {
    pub const CSUM: usize = 0;
    pub const OFFSET: usize = 8;
    pub const VERSION: usize = 16;
    pub const MAGIC: usize = 24;
    pub const UUID: usize = 40;
    pub const SET_UUID: usize = 56;
    pub const LABEL: usize = 72;
    pub const FLAGS: usize = 104;
    pub const SEQ: usize = 112;
    pub const FEATURE_COMPAT: usize = 120;
    pub const FEATURE_INCOMPAT: usize = 128;
    pub const FEATURE_RO_COMPAT: usize = 136;
    pub const NBUCKETS: usize = 184;
    pub const DATA_OFFSET: usize = 184;
    pub const BLOCK_SIZE: usize = 192;
    pub const BUCKET_SIZE: usize = 194;
    pub const NR_IN_SET: usize = 196;
    pub const NR_THIS_DEV: usize = 198;
    pub const LAST_MOUNT: usize = 200;
    pub const FIRST_BUCKET: usize = 204;
    pub const KEYS: usize = 206;
    pub const D: usize = 208;
}

/// Byte offsets of the in-kernel layout. Identical to [`disk`] before 184.
mod native {
    pub const NBUCKETS: usize = 184;
    pub const DATA_OFFSET: usize = 184;
    pub const BLOCK_SIZE: usize = 192;
    pub const NR_IN_SET: usize = 194;
    pub const NR_THIS_DEV: usize = 196;
    pub const BUCKET_SIZE: usize = 200;
    pub const LAST_MOUNT: usize = 208;
    pub const FIRST_BUCKET: usize = 212;
    pub const KEYS: usize = 214;
    pub const D: usize = 216;
}

/// The role a device plays in a cache set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Role {
    /// Fast device holding cached data.
    #[strum(serialize = "cache")]
    Cache,
    /// Slow device whose data is cached.
    #[strum(serialize = "data")]
    Backing,
}

/// A NUL-terminated label of at most 31 bytes.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Label([u8; SB_LABEL_SIZE]);

impl Label {
    /// Creates a label, refusing text that leaves no room for the terminator.
    pub fn new(text: &str) -> BcResult<Label> {
        assert_or_err!(text.len() < SB_LABEL_SIZE, BcError::LabelTooLong(text.len()));
        let mut res = [0u8; SB_LABEL_SIZE];
        res[..text.len()].copy_from_slice(text.as_bytes());
        Ok(Label(res))
    }
    /// The raw field.
    pub fn bytes(&self) -> &[u8; SB_LABEL_SIZE] {
        &self.0
    }
    /// The text up to the first NUL.
    pub fn text(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(SB_LABEL_SIZE);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Label({:?})", self.text())
    }
}

/// Everything [`Superblock::populate`] needs besides the role.
#[derive(Clone, Debug)]
pub struct SbParams {
    /// Block size in sectors.
    pub block_size:  u16,
    /// Bucket size in sectors.
    pub bucket_size: u32,
    /// Buckets on the device (cache only).
    pub nbuckets:    u64,
    /// Cache mode (backing only).
    pub cache_mode:  CacheMode,
    /// Data offset in sectors (backing only).
    pub data_offset: u64,
    /// Enable discard (cache only).
    pub discard:     bool,
    /// Replacement policy (cache only).
    pub replacement: ReplacementPolicy,
    /// Cache set identifier.
    pub set_uuid:    Uuid,
    /// Device label.
    pub label:       Label,
}

#[derive(Clone, PartialEq, Eq, Derivative)]
#[derivative(Debug)]
/// A bcache superblock.
///
/// Fields follow the kernel's `struct cache_sb`; the flags word is held as
/// [`SbFlags`] and only packed by [`Superblock::encode`].
pub struct Superblock {
    /// Checksum of the encoded form, see [`Superblock::update_checksum`].
    pub csum:              u64,
    /// Sector the superblock lives at.
    pub offset:            u64,
    /// Layout version.
    pub version:           u64,
    /// Signature, [`BCACHE_MAGIC`] when valid.
    pub magic:             [u8; 16],
    /// Identifier of this device.
    pub uuid:              Uuid,
    /// Identifier of the cache set.
    pub set_uuid:          Uuid,
    /// Free-form label.
    pub label:             Label,
    /// Role-specific flags.
    pub flags:             SbFlags,
    /// Sequence number, bumped by the kernel on every write.
    pub seq:               u64,
    /// Compatible feature bits.
    pub feature_compat:    u64,
    /// Incompatible feature bits.
    pub feature_incompat:  u64,
    /// Read-only compatible feature bits.
    pub feature_ro_compat: u64,
    /// Number of buckets (cache).
    pub nbuckets:          u64,
    /// Start of data in sectors (backing, versions with an offset).
    pub data_offset:       u64,
    /// Block size in sectors.
    pub block_size:        u16,
    /// Bucket size in sectors (cache).
    pub bucket_size:       u32,
    /// Devices in the cache set (cache).
    pub nr_in_set:         u16,
    /// Index of this device in the set (cache).
    pub nr_this_dev:       u16,
    /// Last mount time.
    pub last_mount:        u32,
    /// First bucket usable for data (cache).
    pub first_bucket:      u16,
    /// Journal buckets in use, at most [`SB_JOURNAL_BUCKETS`].
    #[derivative(Debug = "ignore")]
    pub journal:           Vec<u64>,
}

impl Superblock {
    /// Creates an empty superblock of the given role with fresh device UUID.
    pub fn new(role: Role) -> Superblock {
        Superblock {
            csum:              0,
            offset:            SB_SECTOR,
            version:           match role {
                Role::Cache => BCACHE_SB_VERSION_CDEV,
                Role::Backing => BCACHE_SB_VERSION_BDEV,
            },
            magic:             *BCACHE_MAGIC,
            uuid:              Uuid::generate(),
            set_uuid:          Uuid::default(),
            label:             Label::default(),
            flags:             match role {
                Role::Cache => SbFlags::Cache {
                    sync:        false,
                    discard:     false,
                    replacement: ReplacementPolicy::default(),
                },
                Role::Backing => SbFlags::Backing {
                    cache_mode: CacheMode::default(),
                    state:      crate::BdevState::None,
                },
            },
            seq:               0,
            feature_compat:    0,
            feature_incompat:  0,
            feature_ro_compat: 0,
            nbuckets:          0,
            data_offset:       0,
            block_size:        0,
            bucket_size:       0,
            nr_in_set:         0,
            nr_this_dev:       0,
            last_mount:        0,
            first_bucket:      0,
            journal:           Vec::new(),
        }
    }
    /// Builds the superblock for a freshly formatted device.
    pub fn populate(role: Role, params: &SbParams) -> Superblock {
        let mut sb = Superblock::new(role);
        sb.set_uuid = params.set_uuid;
        sb.block_size = params.block_size;
        sb.label = params.label;
        match role {
            Role::Backing => {
                sb.flags = SbFlags::Backing {
                    cache_mode: params.cache_mode,
                    state:      crate::BdevState::None,
                };
                if params.data_offset != BDEV_DATA_START_DEFAULT {
                    sb.raise_version(BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
                    sb.data_offset = params.data_offset;
                }
            }
            Role::Cache => {
                sb.set_bucket_size(params.bucket_size);
                sb.nbuckets = params.nbuckets;
                sb.nr_in_set = 1;
                sb.first_bucket = match u16::try_from(params.bucket_size) {
                    Ok(bucket) => HEADER_LAST_SECTOR / bucket + 1,
                    Err(_) => 1,
                };
                sb.flags = SbFlags::Cache {
                    sync:        false,
                    discard:     params.discard,
                    replacement: params.replacement,
                };
            }
        }
        sb
    }
    /// Raises the version. A lower value is ignored.
    pub fn raise_version(&mut self, version: u64) {
        self.version = self.version.max(version);
    }
    /// Sets the bucket size, enabling the large-bucket feature when it does not fit 16 bits.
    pub fn set_bucket_size(&mut self, bucket_size: u32) {
        if bucket_size > u32::from(u16::MAX) {
            self.raise_version(BCACHE_SB_VERSION_CDEV_WITH_FEATURES);
            self.feature_incompat |= FEATURE_INCOMPAT_LOG_LARGE_BUCKET_SIZE;
        }
        self.bucket_size = bucket_size;
    }
    /// True when the large-bucket encoding is in use.
    pub fn has_large_bucket(&self) -> bool {
        self.version >= BCACHE_SB_VERSION_CDEV_WITH_FEATURES
            && self.feature_incompat & FEATURE_INCOMPAT_LOG_LARGE_BUCKET_SIZE != 0
    }
    /// The role recorded by the version.
    pub fn role(&self) -> Role {
        if is_bdev_version(self.version) {
            Role::Backing
        } else {
            Role::Cache
        }
    }
    /// The data offset the kernel will use for a backing device.
    pub fn effective_data_offset(&self) -> u64 {
        if self.version >= BCACHE_SB_VERSION_BDEV_WITH_OFFSET {
            self.data_offset
        } else {
            BDEV_DATA_START_DEFAULT
        }
    }
    /// The cache mode of a backing device.
    pub fn cache_mode(&self) -> Option<CacheMode> {
        match self.flags {
            SbFlags::Backing { cache_mode, .. } => Some(cache_mode),
            SbFlags::Cache { .. } => None,
        }
    }
    fn keys(&self) -> u16 {
        u16::try_from(self.journal.len().min(SB_JOURNAL_BUCKETS)).unwrap_or(0)
    }

    /// Encodes to the little-endian on-disk layout, with the stored checksum.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert_le!(self.journal.len(), SB_JOURNAL_BUCKETS);
        let mut buf = vec![0u8; SB_DISK_SIZE];
        put(&mut buf, disk::CSUM, &self.csum.to_le_bytes());
        put(&mut buf, disk::OFFSET, &self.offset.to_le_bytes());
        put(&mut buf, disk::VERSION, &self.version.to_le_bytes());
        put(&mut buf, disk::MAGIC, &self.magic);
        put(&mut buf, disk::UUID, &self.uuid.0);
        put(&mut buf, disk::SET_UUID, &self.set_uuid.0);
        put(&mut buf, disk::LABEL, self.label.bytes());
        put(&mut buf, disk::FLAGS, &self.flags.pack().to_le_bytes());
        put(&mut buf, disk::SEQ, &self.seq.to_le_bytes());
        if self.version >= BCACHE_SB_VERSION_CDEV_WITH_FEATURES {
            put(&mut buf, disk::FEATURE_COMPAT, &self.feature_compat.to_le_bytes());
            put(&mut buf, disk::FEATURE_INCOMPAT, &self.feature_incompat.to_le_bytes());
            put(&mut buf, disk::FEATURE_RO_COMPAT, &self.feature_ro_compat.to_le_bytes());
        }
        match self.role() {
            Role::Backing => put(&mut buf, disk::DATA_OFFSET, &self.data_offset.to_le_bytes()),
            Role::Cache => {
                put(&mut buf, disk::NBUCKETS, &self.nbuckets.to_le_bytes());
                put(&mut buf, disk::NR_IN_SET, &self.nr_in_set.to_le_bytes());
                put(&mut buf, disk::NR_THIS_DEV, &self.nr_this_dev.to_le_bytes());
            }
        }
        put(&mut buf, disk::BLOCK_SIZE, &self.block_size.to_le_bytes());
        // The field is 16 bits wide; large buckets store their log2 instead.
        let bucket_field = if self.has_large_bucket() {
            self.bucket_size.trailing_zeros()
        } else {
            self.bucket_size
        };
        put(&mut buf, disk::BUCKET_SIZE, &bucket_field.to_le_bytes()[..2]);
        put(&mut buf, disk::LAST_MOUNT, &self.last_mount.to_le_bytes());
        put(&mut buf, disk::FIRST_BUCKET, &self.first_bucket.to_le_bytes());
        put(&mut buf, disk::KEYS, &self.keys().to_le_bytes());
        for (i, bucket) in self.journal.iter().take(SB_JOURNAL_BUCKETS).enumerate() {
            put(&mut buf, disk::D + 8 * i, &bucket.to_le_bytes());
        }
        buf
    }
    /// Encodes to the kernel's in-memory layout, in native byte order.
    pub fn encode_native(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SB_NATIVE_SIZE];
        put(&mut buf, disk::CSUM, &self.csum.to_ne_bytes());
        put(&mut buf, disk::OFFSET, &self.offset.to_ne_bytes());
        put(&mut buf, disk::VERSION, &self.version.to_ne_bytes());
        put(&mut buf, disk::MAGIC, &self.magic);
        put(&mut buf, disk::UUID, &self.uuid.0);
        put(&mut buf, disk::SET_UUID, &self.set_uuid.0);
        put(&mut buf, disk::LABEL, self.label.bytes());
        put(&mut buf, disk::FLAGS, &self.flags.pack().to_ne_bytes());
        put(&mut buf, disk::SEQ, &self.seq.to_ne_bytes());
        put(&mut buf, disk::FEATURE_COMPAT, &self.feature_compat.to_ne_bytes());
        put(&mut buf, disk::FEATURE_INCOMPAT, &self.feature_incompat.to_ne_bytes());
        put(&mut buf, disk::FEATURE_RO_COMPAT, &self.feature_ro_compat.to_ne_bytes());
        match self.role() {
            Role::Backing => put(&mut buf, native::DATA_OFFSET, &self.data_offset.to_ne_bytes()),
            Role::Cache => {
                put(&mut buf, native::NBUCKETS, &self.nbuckets.to_ne_bytes());
                put(&mut buf, native::NR_IN_SET, &self.nr_in_set.to_ne_bytes());
                put(&mut buf, native::NR_THIS_DEV, &self.nr_this_dev.to_ne_bytes());
                put(&mut buf, native::BUCKET_SIZE, &self.bucket_size.to_ne_bytes());
            }
        }
        put(&mut buf, native::BLOCK_SIZE, &self.block_size.to_ne_bytes());
        put(&mut buf, native::LAST_MOUNT, &self.last_mount.to_ne_bytes());
        put(&mut buf, native::FIRST_BUCKET, &self.first_bucket.to_ne_bytes());
        put(&mut buf, native::KEYS, &self.keys().to_ne_bytes());
        for (i, bucket) in self.journal.iter().take(SB_JOURNAL_BUCKETS).enumerate() {
            put(&mut buf, native::D + 8 * i, &bucket.to_ne_bytes());
        }
        buf
    }
    /// Recomputes the checksum from the current fields.
    pub fn update_checksum(&mut self) {
        self.csum = checksum(&self.encode());
    }
    /// Checks the stored checksum against the current fields.
    pub fn verify_checksum(&self) -> bool {
        self.csum == checksum(&self.encode())
    }

    /// Decodes an on-disk superblock, checking magic, version and checksum.
    pub fn decode(buf: &[u8]) -> BcResult<Superblock> {
        let sb = Superblock::decode_unchecked(buf)?;
        let computed = checksum(buf);
        assert_or_err!(
            sb.csum == computed,
            BcError::BadChecksum {
                stored: sb.csum,
                computed,
            }
        );
        Ok(sb)
    }
    /// Decodes an on-disk superblock without verifying its checksum.
    ///
    /// The magic and version are still checked.
    pub fn decode_unchecked(buf: &[u8]) -> BcResult<Superblock> {
        assert_or_err!(
            buf.len() >= SB_DISK_SIZE,
            BcError::ShortBuffer {
                need: SB_DISK_SIZE,
                got:  buf.len(),
            }
        );
        assert_or_err!(has_cache_magic(buf), BcError::BadMagic);
        let version = get_u64(buf, disk::VERSION);
        assert_or_err!(is_known_version(version), BcError::UnknownVersion(version));
        let backing = is_bdev_version(version);

        let mut sb = Superblock::new(if backing { Role::Backing } else { Role::Cache });
        sb.csum = get_u64(buf, disk::CSUM);
        sb.offset = get_u64(buf, disk::OFFSET);
        sb.version = version;
        sb.magic.copy_from_slice(&buf[disk::MAGIC..disk::MAGIC + 16]);
        sb.uuid.0.copy_from_slice(&buf[disk::UUID..disk::UUID + 16]);
        sb.set_uuid.0.copy_from_slice(&buf[disk::SET_UUID..disk::SET_UUID + 16]);
        sb.label.0.copy_from_slice(&buf[disk::LABEL..disk::LABEL + SB_LABEL_SIZE]);
        sb.flags = SbFlags::unpack(get_u64(buf, disk::FLAGS), backing);
        sb.seq = get_u64(buf, disk::SEQ);
        if version >= BCACHE_SB_VERSION_CDEV_WITH_FEATURES {
            sb.feature_compat = get_u64(buf, disk::FEATURE_COMPAT);
            sb.feature_incompat = get_u64(buf, disk::FEATURE_INCOMPAT);
            sb.feature_ro_compat = get_u64(buf, disk::FEATURE_RO_COMPAT);
        }
        if backing {
            sb.data_offset = get_u64(buf, disk::DATA_OFFSET);
        } else {
            sb.nbuckets = get_u64(buf, disk::NBUCKETS);
            sb.nr_in_set = get_u16(buf, disk::NR_IN_SET);
            sb.nr_this_dev = get_u16(buf, disk::NR_THIS_DEV);
        }
        sb.block_size = get_u16(buf, disk::BLOCK_SIZE);
        let bucket_field = get_u16(buf, disk::BUCKET_SIZE);
        sb.bucket_size = if sb.has_large_bucket() {
            1u32.checked_shl(u32::from(bucket_field)).unwrap_or(0)
        } else {
            u32::from(bucket_field)
        };
        sb.last_mount = get_u32(buf, disk::LAST_MOUNT);
        sb.first_bucket = get_u16(buf, disk::FIRST_BUCKET);
        sb.journal = (0..journal_keys(buf)).map(|i| get_u64(buf, disk::D + 8 * i)).collect();
        Ok(sb)
    }

    /// A printable report of this superblock for device `name`.
    pub fn summary<'a>(&'a self, name: &'a str) -> Summary<'a> {
        Summary { name, sb: self }
    }
}

/// Printable report of a formatted device.
pub struct Summary<'a> {
    name: &'a str,
    sb:   &'a Superblock,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sb = self.sb;
        writeln!(f, "Name\t\t\t{}", self.name)?;
        writeln!(f, "Label\t\t\t{}", sb.label.text())?;
        writeln!(f, "Type\t\t\t{}", sb.role())?;
        writeln!(f, "UUID:\t\t\t{}", sb.uuid)?;
        writeln!(f, "Set UUID:\t\t{}", sb.set_uuid)?;
        writeln!(f, "version:\t\t{}", sb.version)?;
        match sb.role() {
            Role::Backing => {
                writeln!(f, "block_size_in_sectors:\t{}", sb.block_size)?;
                writeln!(f, "data_offset_in_sectors:\t{}", sb.effective_data_offset())?;
                if let Some(mode) = sb.cache_mode() {
                    writeln!(f, "cache_mode:\t\t{}", mode)?;
                }
            }
            Role::Cache => {
                writeln!(f, "nbuckets:\t\t{}", sb.nbuckets)?;
                writeln!(f, "block_size_in_sectors:\t{}", sb.block_size)?;
                writeln!(f, "bucket_size_in_sectors:\t{}", sb.bucket_size)?;
                writeln!(f, "nr_in_set:\t\t{}", sb.nr_in_set)?;
                writeln!(f, "nr_this_dev:\t\t{}", sb.nr_this_dev)?;
                writeln!(f, "first_bucket:\t\t{}", sb.first_bucket)?;
            }
        }
        Ok(())
    }
}

/// CRC-64 of an encoded superblock, excluding the checksum field itself.
///
/// Covers bytes 8 up to the end of the journal buckets in use, exactly as
/// the kernel's `csum_set` does. Fails on a buffer that ends before that.
pub fn csum_set(buf: &[u8]) -> BcResult<u64> {
    let short = |need| BcError::ShortBuffer { need, got: buf.len() };
    assert_or_err!(buf.len() >= disk::D, short(disk::D));
    let need = disk::D + 8 * journal_keys(buf);
    assert_or_err!(buf.len() >= need, short(need));
    Ok(checksum(buf))
}

// Callers guarantee a full-size buffer.
fn checksum(buf: &[u8]) -> u64 {
    CRC64.checksum(&buf[disk::OFFSET..disk::D + 8 * journal_keys(buf)])
}

fn journal_keys(buf: &[u8]) -> usize {
    usize::from(get_u16(buf, disk::KEYS)).min(SB_JOURNAL_BUCKETS)
}

/// True when `buf`, read from the superblock sector, carries the bcache magic.
pub fn has_cache_magic(buf: &[u8]) -> bool {
    buf.get(disk::MAGIC..disk::MAGIC + 16) == Some(&BCACHE_MAGIC[..])
}

fn is_bdev_version(version: u64) -> bool {
    matches!(
        version,
        BCACHE_SB_VERSION_BDEV | BCACHE_SB_VERSION_BDEV_WITH_OFFSET | BCACHE_SB_VERSION_BDEV_WITH_FEATURES
    )
}

fn is_known_version(version: u64) -> bool {
    is_bdev_version(version)
        || matches!(
            version,
            BCACHE_SB_VERSION_CDEV | BCACHE_SB_VERSION_CDEV_WITH_UUID | BCACHE_SB_VERSION_CDEV_WITH_FEATURES
        )
}

fn put(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[off..off + 2]);
    u16::from_le_bytes(b)
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
fn cache_params() -> SbParams {
    SbParams {
        block_size:  8,
        bucket_size: 1024,
        nbuckets:    2048,
        cache_mode:  CacheMode::Writethrough,
        data_offset: BDEV_DATA_START_DEFAULT,
        discard:     true,
        replacement: ReplacementPolicy::Fifo,
        set_uuid:    Uuid::generate(),
        label:       Label::default(),
    }
}

#[test]
fn crc64_matches_kernel_polynomial() {
    // CRC-64/WE check value.
    assert_eq!(CRC64.checksum(b"123456789"), 0x62ec_59e3_f1a4_f00a);
}

#[test]
fn cache_layout_offsets() {
    let mut sb = Superblock::populate(Role::Cache, &cache_params());
    sb.update_checksum();
    let buf = sb.encode();
    assert_eq!(buf.len(), SB_DISK_SIZE);
    assert_eq!(&buf[24..40], BCACHE_MAGIC);
    assert_eq!(get_u64(&buf, 8), SB_SECTOR);
    assert_eq!(get_u64(&buf, 16), BCACHE_SB_VERSION_CDEV);
    assert_eq!(get_u64(&buf, 104), 0b0110);
    assert_eq!(get_u64(&buf, 184), 2048);
    assert_eq!(get_u16(&buf, 192), 8);
    assert_eq!(get_u16(&buf, 194), 1024);
    assert_eq!(get_u16(&buf, 196), 1);
    assert_eq!(get_u16(&buf, 198), 0);
    assert_eq!(get_u16(&buf, 204), 1);
    assert_eq!(get_u64(&buf, 0), checksum(&buf));
}

#[test]
fn backing_default_offset_is_not_stored() {
    let mut params = cache_params();
    params.cache_mode = CacheMode::Writeback;
    let sb = Superblock::populate(Role::Backing, &params);
    assert_eq!(sb.version, BCACHE_SB_VERSION_BDEV);
    assert_eq!(sb.data_offset, 0);
    assert_eq!(sb.effective_data_offset(), BDEV_DATA_START_DEFAULT);
    assert_eq!(get_u64(&sb.encode(), 104), 1);

    params.data_offset = 4096;
    let sb = Superblock::populate(Role::Backing, &params);
    assert_eq!(sb.version, BCACHE_SB_VERSION_BDEV_WITH_OFFSET);
    assert_eq!(get_u64(&sb.encode(), 184), 4096);
}

#[test]
fn first_bucket_clears_header() {
    for (bucket, first) in [(1u32, 24u16), (2, 12), (8, 3), (16, 2), (32, 1), (1 << 20, 1)] {
        let mut params = cache_params();
        params.block_size = 1;
        params.bucket_size = bucket;
        let sb = Superblock::populate(Role::Cache, &params);
        assert_eq!(sb.first_bucket, first, "bucket {}", bucket);
        // Bucket `first_bucket` starts past sector 23.
        assert_gt!(u64::from(sb.first_bucket) * u64::from(bucket), 23);
    }
}

#[test]
fn large_bucket_raises_version() {
    let mut params = cache_params();
    params.bucket_size = 1 << 17;
    let mut sb = Superblock::populate(Role::Cache, &params);
    assert_eq!(sb.version, BCACHE_SB_VERSION_CDEV_WITH_FEATURES);
    assert!(sb.has_large_bucket());
    sb.raise_version(BCACHE_SB_VERSION_CDEV);
    assert_eq!(sb.version, BCACHE_SB_VERSION_CDEV_WITH_FEATURES);
    let buf = sb.encode();
    assert_eq!(get_u16(&buf, 194), 17);
    assert_eq!(get_u64(&buf, 128), FEATURE_INCOMPAT_LOG_LARGE_BUCKET_SIZE);
}

#[test]
fn checksum_detects_corruption() {
    #![allow(clippy::unwrap_used)]
    let mut sb = Superblock::populate(Role::Cache, &cache_params());
    sb.update_checksum();
    assert!(sb.verify_checksum());
    let mut buf = sb.encode();
    assert_eq!(Superblock::decode(&buf).unwrap(), sb);

    buf[disk::LABEL] ^= 0xff;
    assert!(matches!(
        Superblock::decode(&buf),
        Err(BcError::BadChecksum { .. })
    ));
    assert!(Superblock::decode_unchecked(&buf).is_ok());

    buf[disk::MAGIC] ^= 0xff;
    assert!(matches!(Superblock::decode_unchecked(&buf), Err(BcError::BadMagic)));
}

#[test]
fn checksum_ignores_bytes_past_journal() {
    let mut sb = Superblock::populate(Role::Cache, &cache_params());
    sb.update_checksum();
    let mut buf = sb.encode();
    buf[disk::D] = 0xaa;
    assert_eq!(checksum(&buf), sb.csum);
    buf[disk::KEYS] = 1;
    assert_ne!(checksum(&buf), sb.csum);
}

#[test]
fn native_layout_offsets() {
    let sb = Superblock::populate(Role::Cache, &cache_params());
    let buf = sb.encode_native();
    assert_eq!(buf.len(), SB_NATIVE_SIZE);
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[200..204]);
    assert_eq!(u32::from_ne_bytes(b), 1024);
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[212..214]);
    assert_eq!(u16::from_ne_bytes(b), 1);
}

#[test]
fn label_capacity() {
    #![allow(clippy::unwrap_used)]
    let ok = "x".repeat(SB_LABEL_SIZE - 1);
    assert_eq!(Label::new(&ok).unwrap().text(), ok);
    assert!(matches!(
        Label::new(&"x".repeat(SB_LABEL_SIZE)),
        Err(BcError::LabelTooLong(32))
    ));
    assert_eq!(Label::new("").unwrap(), Label::default());
}

#[test]
fn summary_lists_role_fields() {
    let sb = Superblock::populate(Role::Cache, &cache_params());
    let text = sb.summary("/dev/nvme0n1").to_string();
    assert!(text.contains("Type\t\t\tcache"));
    assert!(text.contains("nbuckets:\t\t2048"));
    assert!(text.contains("first_bucket:\t\t1"));
}

#[test]
fn short_buffer_checksum() {
    #![allow(clippy::unwrap_used)]
    let mut sb = Superblock::populate(Role::Cache, &cache_params());
    sb.update_checksum();
    let mut buf = sb.encode();
    assert_eq!(csum_set(&buf).unwrap(), sb.csum);
    assert!(matches!(
        csum_set(&buf[..100]),
        Err(BcError::ShortBuffer { need: 208, got: 100 })
    ));
    // Two journal buckets claimed, but the buffer stops after the first.
    buf[disk::KEYS] = 2;
    assert!(matches!(
        csum_set(&buf[..disk::D + 8]),
        Err(BcError::ShortBuffer { need: 224, .. })
    ));
}
