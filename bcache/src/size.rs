use std::convert::TryFrom;

use crate::{BcError, BcResult, SizeProblem, BDEV_DATA_START_DEFAULT, SECTOR_SIZE};

/// Largest block size, in sectors.
pub const MAX_BLOCK_SECTORS: u64 = u16::MAX as u64;

/// Largest bucket size, in sectors.
pub const MAX_BUCKET_SECTORS: u64 = u32::MAX as u64;

/// Parses a byte count with an optional binary `k`, `m`, `g` or `t` suffix.
pub fn parse_size(s: &str, what: &'static str) -> BcResult<u64> {
    let bad = |problem| BcError::InvalidSize { what, problem };
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let shift = match c.to_ascii_lowercase() {
                'k' => 10,
                'm' => 20,
                'g' => 30,
                't' => 40,
                _ => return Err(bad(SizeProblem::Unparsable)),
            };
            (&s[..i], shift)
        }
        _ => (s, 0),
    };
    let value: u64 = digits.parse().map_err(|_| bad(SizeProblem::Unparsable))?;
    value
        .checked_mul(1 << shift)
        .ok_or_else(|| bad(SizeProblem::TooLarge))
}

/// Parses a size in bytes and converts it to sectors.
///
/// The byte count must be a power of two, the sector count non-zero and at most `max`.
pub fn parse_sectors(s: &str, what: &'static str, max: u64) -> BcResult<u64> {
    let bytes = parse_size(s, what)?;
    assert_or_err!(
        bytes & bytes.wrapping_sub(1) == 0,
        BcError::InvalidSize {
            what,
            problem: SizeProblem::NotPowerOfTwo,
        }
    );
    let sectors = bytes / SECTOR_SIZE;
    assert_or_err!(
        sectors <= max,
        BcError::InvalidSize {
            what,
            problem: SizeProblem::TooLarge,
        }
    );
    assert_or_err!(
        sectors > 0,
        BcError::InvalidSize {
            what,
            problem: SizeProblem::TooSmall,
        }
    );
    Ok(sectors)
}

/// Parses a block size argument into sectors.
pub fn parse_block_size(s: &str) -> BcResult<u16> {
    let sectors = parse_sectors(s, "block size", MAX_BLOCK_SECTORS)?;
    Ok(u16::try_from(sectors).unwrap_or(u16::MAX))
}

/// Parses a bucket size argument into sectors.
pub fn parse_bucket_size(s: &str) -> BcResult<u32> {
    let sectors = parse_sectors(s, "bucket size", MAX_BUCKET_SECTORS)?;
    Ok(u32::try_from(sectors).unwrap_or(u32::MAX))
}

/// Parses a data offset, a plain sector count of at least 16.
pub fn parse_data_offset(s: &str) -> BcResult<u64> {
    let offset: u64 = s.trim().parse().map_err(|_| BcError::InvalidSize {
        what:    "data offset",
        problem: SizeProblem::Unparsable,
    })?;
    check_data_offset(offset)?;
    Ok(offset)
}

/// Refuses data offsets that would overlap the superblock.
pub fn check_data_offset(offset: u64) -> BcResult<()> {
    assert_or_err!(offset >= BDEV_DATA_START_DEFAULT, BcError::BadDataOffset(offset));
    Ok(())
}

/// A bucket must hold at least one block.
pub fn check_relationship(block: u16, bucket: u32) -> BcResult<()> {
    assert_or_err!(
        u32::from(block) <= bucket,
        BcError::InvalidSizeRelationship {
            block:  u64::from(block),
            bucket: u64::from(bucket),
        }
    );
    Ok(())
}

/// Block size for devices whose logical block sizes (in sectors) are given.
///
/// The largest one wins so that every device can address a block.
pub fn derive_block_size<I: IntoIterator<Item = u32>>(logical_block_sizes: I) -> u16 {
    let max = logical_block_sizes.into_iter().max().unwrap_or(1).max(1);
    u16::try_from(max).unwrap_or(u16::MAX)
}

/// Rounds a data offset up to a multiple of the zone size.
///
/// A zone size of zero leaves the offset unchanged.
pub fn round_to_zone(offset: u64, zone_sectors: u64) -> u64 {
    if zone_sectors == 0 || offset % zone_sectors == 0 {
        offset
    } else {
        (offset / zone_sectors + 1).saturating_mul(zone_sectors)
    }
}

#[test]
fn suffixes() {
    #![allow(clippy::unwrap_used)]
    assert_eq!(parse_size("512", "x").unwrap(), 512);
    assert_eq!(parse_size("4k", "x").unwrap(), 4096);
    assert_eq!(parse_size("4K", "x").unwrap(), 4096);
    assert_eq!(parse_size("2m", "x").unwrap(), 2 << 20);
    assert_eq!(parse_size("1G", "x").unwrap(), 1 << 30);
    assert_eq!(parse_size("1t", "x").unwrap(), 1 << 40);
    assert!(parse_size("4q", "x").is_err());
    assert!(parse_size("k", "x").is_err());
    assert!(parse_size("", "x").is_err());
    assert!(matches!(
        parse_size("99999999999t", "x"),
        Err(BcError::InvalidSize {
            problem: SizeProblem::TooLarge,
            ..
        })
    ));
}

#[test]
fn sector_limits() {
    #![allow(clippy::unwrap_used)]
    use itertools::Itertools;

    let problem = |r: BcResult<u64>| match r {
        Err(BcError::InvalidSize { problem, .. }) => Some(problem),
        _ => None,
    };
    for (shift, max) in (9..=40u32).cartesian_product([MAX_BLOCK_SECTORS, MAX_BUCKET_SECTORS]) {
        let text = format!("{}", 1u64 << shift);
        let sectors = (1u64 << shift) / SECTOR_SIZE;
        let res = parse_sectors(&text, "x", max);
        if sectors <= max {
            assert_eq!(res.unwrap(), sectors);
        } else {
            assert_eq!(problem(res), Some(SizeProblem::TooLarge));
        }
    }
    assert_eq!(problem(parse_sectors("256", "x", 10)), Some(SizeProblem::TooSmall));
    assert_eq!(problem(parse_sectors("3k", "x", 10)), Some(SizeProblem::NotPowerOfTwo));
    assert_eq!(parse_block_size("4k").unwrap(), 8);
    assert_eq!(parse_bucket_size("512k").unwrap(), 1024);
    assert_eq!(parse_block_size("32m").unwrap_err().to_string(), "block size is invalid: TooLarge");
}

#[test]
fn data_offsets() {
    #![allow(clippy::unwrap_used)]
    assert_eq!(parse_data_offset("16").unwrap(), 16);
    assert_eq!(parse_data_offset("4096").unwrap(), 4096);
    assert!(matches!(parse_data_offset("8"), Err(BcError::BadDataOffset(8))));
    assert!(parse_data_offset("lots").is_err());
}

#[test]
fn block_bucket_relationship() {
    assert!(check_relationship(8, 1024).is_ok());
    assert!(check_relationship(8, 8).is_ok());
    assert!(matches!(
        check_relationship(16, 8),
        Err(BcError::InvalidSizeRelationship { block: 16, bucket: 8 })
    ));
}

#[test]
fn derived_block_size_is_largest() {
    assert_eq!(derive_block_size(vec![1, 8, 1]), 8);
    assert_eq!(derive_block_size(Vec::<u32>::new()), 1);
    assert_eq!(derive_block_size(vec![0]), 1);
}

#[test]
fn zone_rounding() {
    assert_eq!(round_to_zone(16, 524288), 524288);
    assert_eq!(round_to_zone(524288, 524288), 524288);
    assert_eq!(round_to_zone(524289, 524288), 1048576);
    assert_eq!(round_to_zone(16, 0), 16);
}
