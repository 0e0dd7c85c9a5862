//! Typed views of the superblock `flags` word.
//!
//! The word is packed only when a superblock is encoded and unpacked when one
//! is decoded; everything in between works with [`SbFlags`].

use bitvec::prelude::*;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{BcError, BcResult};

/// Cache replacement policy of a cache device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ReplacementPolicy {
    /// Least recently used.
    Lru    = 0,
    /// First in, first out.
    Fifo   = 1,
    /// Random eviction.
    Random = 2,
}

impl ReplacementPolicy {
    /// Looks up a policy by name, ignoring surrounding whitespace.
    pub fn parse(s: &str) -> BcResult<ReplacementPolicy> {
        s.trim()
            .parse()
            .map_err(|_| BcError::InvalidPolicy(s.to_string()))
    }
    fn from_bits(v: u8) -> ReplacementPolicy {
        match v {
            1 => ReplacementPolicy::Fifo,
            2 => ReplacementPolicy::Random,
            _ => ReplacementPolicy::Lru,
        }
    }
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        ReplacementPolicy::Lru
    }
}

/// Cache mode of a backing device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum CacheMode {
    /// Writes go to the cache and the backing device synchronously.
    Writethrough = 0,
    /// Writes complete once they are in the cache.
    Writeback    = 1,
    /// Writes bypass the cache.
    Writearound  = 2,
    /// Caching disabled.
    None         = 3,
}

impl CacheMode {
    fn from_bits(v: u8) -> CacheMode {
        match v {
            1 => CacheMode::Writeback,
            2 => CacheMode::Writearound,
            3 => CacheMode::None,
            _ => CacheMode::Writethrough,
        }
    }
}

impl Default for CacheMode {
    fn default() -> Self {
        CacheMode::Writethrough
    }
}

/// Run state of a backing device, as the kernel records it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum BdevState {
    /// Never attached.
    None  = 0,
    /// Attached, cache contents are clean.
    Clean = 1,
    /// Attached with dirty data in the cache.
    Dirty = 2,
    /// The cache was lost while dirty.
    Stale = 3,
}

impl BdevState {
    fn from_bits(v: u8) -> BdevState {
        match v {
            1 => BdevState::Clean,
            2 => BdevState::Dirty,
            3 => BdevState::Stale,
            _ => BdevState::None,
        }
    }
}

/// The superblock flags, one variant per device role.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SbFlags {
    /// Flags of a cache device.
    Cache {
        /// The cache set was cleanly shut down.
        sync:        bool,
        /// Discard freed buckets.
        discard:     bool,
        /// Bucket replacement policy.
        replacement: ReplacementPolicy,
    },
    /// Flags of a backing device.
    Backing {
        /// Requested cache mode.
        cache_mode: CacheMode,
        /// Attachment state.
        state:      BdevState,
    },
}

// Bit positions within the flags word.
const CACHE_SYNC: usize = 0;
const CACHE_DISCARD: usize = 1;
const CACHE_REPLACEMENT: std::ops::Range<usize> = 2..5;
const BDEV_CACHE_MODE: std::ops::Range<usize> = 0..4;
const BDEV_STATE: std::ops::Range<usize> = 61..63;

impl SbFlags {
    /// Packs the flags into the on-disk word.
    pub fn pack(&self) -> u64 {
        let mut word = 0u64;
        let bits = word.view_bits_mut::<Lsb0>();
        match *self {
            SbFlags::Cache {
                sync,
                discard,
                replacement,
            } => {
                bits.set(CACHE_SYNC, sync);
                bits.set(CACHE_DISCARD, discard);
                bits[CACHE_REPLACEMENT].store_le(replacement as u8);
            }
            SbFlags::Backing { cache_mode, state } => {
                bits[BDEV_CACHE_MODE].store_le(cache_mode as u8);
                bits[BDEV_STATE].store_le(state as u8);
            }
        }
        word
    }
    /// Unpacks an on-disk word for a device of the given role.
    pub fn unpack(word: u64, backing: bool) -> SbFlags {
        let bits = word.view_bits::<Lsb0>();
        if backing {
            SbFlags::Backing {
                cache_mode: CacheMode::from_bits(bits[BDEV_CACHE_MODE].load_le()),
                state:      BdevState::from_bits(bits[BDEV_STATE].load_le()),
            }
        } else {
            SbFlags::Cache {
                sync:        bits[CACHE_SYNC],
                discard:     bits[CACHE_DISCARD],
                replacement: ReplacementPolicy::from_bits(bits[CACHE_REPLACEMENT].load_le()),
            }
        }
    }
}

#[test]
fn cache_flag_bits() {
    let flags = SbFlags::Cache {
        sync:        false,
        discard:     true,
        replacement: ReplacementPolicy::Random,
    };
    assert_eq!(flags.pack(), 0b1010);
    assert_eq!(SbFlags::unpack(0b1010, false), flags);
}

#[test]
fn backing_flag_bits() {
    let flags = SbFlags::Backing {
        cache_mode: CacheMode::Writeback,
        state:      BdevState::Dirty,
    };
    assert_eq!(flags.pack(), 1 | (2 << 61));
    assert_eq!(SbFlags::unpack(flags.pack(), true), flags);
}

#[test]
fn policy_names() {
    #![allow(clippy::unwrap_used)]
    use strum::IntoEnumIterator;
    let names: Vec<String> = ReplacementPolicy::iter().map(|p| p.to_string()).collect();
    assert_eq!(names, ["lru", "fifo", "random"]);
    assert_eq!(ReplacementPolicy::parse(" fifo ").unwrap(), ReplacementPolicy::Fifo);
    assert!(matches!(
        ReplacementPolicy::parse("clock"),
        Err(BcError::InvalidPolicy(_))
    ));
}
