//!
//! A superblock can reach the kernel in two ways.
//! 
//! The usual way writes it to the device. The kernel reads it back when the device is registered,
//! typically by udev on device arrival.
//! 
//! The second way hands the superblock to `/dev/bcache_ctrl` with the `BCH_IOCTL_REGISTER_DEVICE` ioctl,
//! and the kernel registers the device at once. Only backing devices use it, and their data offset is
//! always 0 there (see [register_sb_ioctl](crate::operations::register_sb_ioctl)).
//! 
//! A device that is already held by a running instance cannot be opened exclusively.
//! With `--force` the instance is stopped through sysfs and the device is reopened,
//! at most three times, three seconds apart (see [Teardown](crate::operations::Teardown)).
