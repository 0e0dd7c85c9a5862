//!
//! Documentation on the design of the formatter
//! 
//! A bcache device carries a single superblock that tells the kernel which role
//! the device plays and which cache set it belongs to.
//! 

pub mod superblock;
pub mod registration;
