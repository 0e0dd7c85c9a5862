pub use self::{
    flags::{BdevState, CacheMode, ReplacementPolicy, SbFlags},
    superblock::*,
    uuid::Uuid,
};

mod flags;
mod superblock;
mod uuid;
