#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]

pub mod host;

pub use self::host::MockHost;

#[cfg(feature = "log4rs")]
pub mod logging;

#[cfg(not(feature = "log4rs"))]
pub mod logging {
    pub fn init_log() {}
}
