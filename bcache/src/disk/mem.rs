use std::{cell::RefCell, collections::BTreeMap, convert::TryFrom, rc::Rc};

use crate::{disk::DiskObj, BcError, BcResult, SECTOR_SIZE};

const SECTOR: usize = 512;

/// A sparse in-memory disk. Sectors never written read back as zero.
pub struct DiskMem {
    data:               BTreeMap<u64, [u8; SECTOR]>,
    sectors:            u64,
    logical_block_size: u32,
    block_device:       bool,
}

impl DiskMem {
    /// Creates a block-device-like disk of `sectors` with 512-byte logical blocks.
    pub fn open(sectors: u64) -> super::Disk {
        DiskMem::with_geometry(sectors, 512, true)
    }
    /// Creates a disk with the given logical block size (bytes) and device type.
    pub fn with_geometry(sectors: u64, logical_block_size: u32, block_device: bool) -> super::Disk {
        super::Disk(Rc::new(RefCell::new(DiskMem {
            data: BTreeMap::new(),
            sectors,
            logical_block_size,
            block_device,
        })))
    }
    fn check_range(&self, offset: u64, len: usize) -> BcResult<()> {
        let end = offset.checked_add(u64::try_from(len).unwrap_or(u64::MAX));
        match end {
            Some(end) if end <= self.sectors * SECTOR_SIZE => Ok(()),
            _ => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
        }
    }
}

// Splits a byte range into (sector, offset in sector, offset in buffer, length) pieces.
fn pieces(offset: u64, len: usize) -> impl Iterator<Item = (u64, usize, usize, usize)> {
    let mut done = 0usize;
    std::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let pos = offset + done as u64;
        let sector = pos / SECTOR_SIZE;
        let within = usize::try_from(pos % SECTOR_SIZE).unwrap_or(0);
        let n = (SECTOR - within).min(len - done);
        let piece = (sector, within, done, n);
        done += n;
        Some(piece)
    })
}

impl DiskObj for DiskMem {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> BcResult<()> {
        self.check_range(offset, buffer.len())?;
        for (sector, within, at, n) in pieces(offset, buffer.len()) {
            match self.data.get(&sector) {
                Some(s) => buffer[at..at + n].copy_from_slice(&s[within..within + n]),
                None => buffer[at..at + n].iter_mut().for_each(|b| *b = 0),
            }
        }
        Ok(())
    }
    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> BcResult<()> {
        self.check_range(offset, buffer.len())?;
        for (sector, within, at, n) in pieces(offset, buffer.len()) {
            let s = self.data.entry(sector).or_insert([0; SECTOR]);
            s[within..within + n].copy_from_slice(&buffer[at..at + n]);
        }
        Ok(())
    }
    fn sectors(&self) -> BcResult<u64> {
        Ok(self.sectors)
    }
    fn logical_block_size(&self) -> BcResult<u32> {
        Ok(self.logical_block_size)
    }
    fn is_block_device(&self) -> bool {
        self.block_device
    }
    fn discard_all(&mut self) -> BcResult<()> {
        assert_or_err!(self.block_device, BcError::DiscardUnsupported("not a block device"));
        self.data.clear();
        Ok(())
    }
    fn sync(&mut self) -> BcResult<()> {
        Ok(())
    }
}

#[test]
fn unaligned_access() {
    #![allow(clippy::unwrap_used)]
    let mut d = DiskMem::open(16);
    let data: Vec<u8> = (0..1000u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
    d.write_at(300, &data).unwrap();
    let mut back = vec![0u8; 1000];
    d.read_at(300, &mut back).unwrap();
    assert_eq!(back, data);

    let mut head = [0xffu8; 300];
    d.read_at(0, &mut head).unwrap();
    assert!(head.iter().all(|b| *b == 0));
}

#[test]
fn out_of_range_fails() {
    let mut d = DiskMem::open(8);
    assert!(d.write_at(8 * SECTOR_SIZE - 1, &[0, 0]).is_err());
    assert!(d.read_at(8 * SECTOR_SIZE, &mut [0]).is_err());
}

#[test]
fn discard_clears_block_device_only() {
    #![allow(clippy::unwrap_used)]
    let mut d = DiskMem::open(8);
    d.write_at(0, &[1; 16]).unwrap();
    d.discard_all().unwrap();
    let mut back = [1u8; 16];
    d.read_at(0, &mut back).unwrap();
    assert_eq!(back, [0; 16]);

    let mut f = DiskMem::with_geometry(8, 4096, false);
    assert!(matches!(f.discard_all(), Err(BcError::DiscardUnsupported(_))));
}
