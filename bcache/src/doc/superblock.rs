//!
//! The superblock is the only structure written to a device when it is formatted.
//! 
//! It lives at sector 8. Everything before it is zeroed:
//! ```
//! assert_eq!(bcache::SB_START, 4096);
//! ```
//! 
//! Superblocks start with a checksum, followed by their own location and a version.
//! The version says whether the device is a cache or a backing device, and which optional fields are valid:
//! ```
//! # use bcache::{Role, Superblock, BCACHE_SB_VERSION_BDEV, BCACHE_SB_VERSION_CDEV};
//! assert_eq!(Superblock::new(Role::Cache).version, BCACHE_SB_VERSION_CDEV);
//! assert_eq!(Superblock::new(Role::Backing).version, BCACHE_SB_VERSION_BDEV);
//! ```
//! 
//! The signature at byte 24 identifies a bcache device:
//! ```
//! # use bcache::{has_cache_magic, Role, Superblock};
//! let sb = Superblock::new(Role::Cache);
//! assert!(has_cache_magic(&sb.encode()));
//! ```
//! 
//! Each superblock holds a random device UUID and the UUID of the cache set it joins.
//! Devices sharing a set UUID are bound together by the kernel.
//! 
//! A cache device is cut into buckets. The first bucket that may hold data is the first one
//! past the superblock, so small buckets skip a few:
//! ```
//! # use bcache::*;
//! let params = SbParams {
//!     block_size:  1,
//!     bucket_size: 8,
//!     nbuckets:    1 << 20,
//!     cache_mode:  CacheMode::Writethrough,
//!     data_offset: BDEV_DATA_START_DEFAULT,
//!     discard:     false,
//!     replacement: ReplacementPolicy::Lru,
//!     set_uuid:    Uuid::generate(),
//!     label:       Label::new("ssd")?,
//! };
//! let sb = Superblock::populate(Role::Cache, &params);
//! assert_eq!(sb.first_bucket, 3);
//! # Ok::<(), BcError>(())
//! ```
//! 
//! Backing devices store where their data starts only when it is not the default of 16 sectors.
//! 
//! Since nothing else on the device points to the superblock, it carries a CRC-64 over its own bytes,
//! from the location field up to the last journal bucket in use (see [csum_set](crate::csum_set)).
