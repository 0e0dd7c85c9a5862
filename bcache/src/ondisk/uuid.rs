use std::{fmt, str::FromStr};

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};

use crate::{BcError, BcResult};

/// A 16-byte identifier, printed in the usual hyphenated form.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Uuid(pub [u8; 16]);

impl Uuid {
    /// Generates a random (version 4) UUID.
    pub fn generate() -> Uuid {
        let mut bytes: [u8; 16] = rand::random();
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Uuid(bytes)
    }
    /// Parses `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, either case.
    pub fn parse(s: &str) -> BcResult<Uuid> {
        let bad = || BcError::InvalidUuid(s.to_string());
        let groups: Vec<&str> = s.split('-').collect();
        let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_or_err!(lens == [8, 4, 4, 4, 12], bad());

        let hex = groups.concat();
        let bytes = HEXLOWER_PERMISSIVE
            .decode(hex.as_bytes())
            .map_err(|_| bad())?;
        let mut res = [0u8; 16];
        res.copy_from_slice(&bytes);
        Ok(Uuid(res))
    }
    /// True for the all-zero UUID.
    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl FromStr for Uuid {
    type Err = BcError;
    fn from_str(s: &str) -> BcResult<Uuid> {
        Uuid::parse(s)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{}-{}-{}-{}-{}",
            HEXLOWER.encode(&b[0..4]),
            HEXLOWER.encode(&b[4..6]),
            HEXLOWER.encode(&b[6..8]),
            HEXLOWER.encode(&b[8..10]),
            HEXLOWER.encode(&b[10..16])
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uuid({})", self)
    }
}

#[test]
fn uuid_text_form() {
    #![allow(clippy::unwrap_used)]
    let text = "0f8b3c2e-5a1d-4e6f-9b7a-112233445566";
    let uuid = Uuid::parse(text).unwrap();
    assert_eq!(uuid.0[0], 0x0f);
    assert_eq!(uuid.0[15], 0x66);
    assert_eq!(uuid.to_string(), text);
    assert_eq!(
        Uuid::parse("0F8B3C2E-5A1D-4E6F-9B7A-112233445566").unwrap(),
        uuid
    );
}

#[test]
fn uuid_rejects_garbage() {
    for s in ["", "not-a-uuid", "0f8b3c2e5a1d4e6f9b7a112233445566", "0f8b3c2e-5a1d-4e6f-9b7a-11223344556g"] {
        assert!(matches!(Uuid::parse(s), Err(BcError::InvalidUuid(_))), "{}", s);
    }
}

#[test]
fn uuid_generate_is_v4() {
    let a = Uuid::generate();
    let b = Uuid::generate();
    assert_ne!(a, b);
    assert_eq!(a.0[6] >> 4, 4);
    assert_eq!(a.0[8] & 0xc0, 0x80);
    assert!(!a.is_nil());
}
