use std::{path::Path, time::Duration};

use crate::{
    probe::{dev_name, existing_instance_kind},
    BcError, BcResult, Disk, Host, InstanceKind,
};

/// Exclusive opens tried after stopping an instance.
pub const RELEASE_ATTEMPTS: u32 = 3;

/// Pause before each of those attempts.
pub const RELEASE_DELAY: Duration = Duration::from_secs(3);

/// Progress of releasing a busy device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    /// The device is held by someone.
    Busy,
    /// The instance was asked to stop; waiting for it to let go.
    Stopping,
    /// The device is ours.
    Released,
    /// The instance did not let go in time.
    FailedRelease,
}

/// Stops the bcache instance holding a device and reacquires it exclusively.
pub struct Teardown<'a> {
    host:     &'a dyn Host,
    path:     &'a Path,
    state:    TeardownState,
    attempts: u32,
}

impl<'a> Teardown<'a> {
    /// Starts from a device whose exclusive open just failed as busy.
    pub fn new(host: &'a dyn Host, path: &'a Path) -> Teardown<'a> {
        Teardown {
            host,
            path,
            state: TeardownState::Busy,
            attempts: 0,
        }
    }
    /// Current state.
    pub fn state(&self) -> TeardownState {
        self.state
    }
    /// Reacquisition attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs to a terminal state, returning the exclusively opened device.
    pub fn run(&mut self) -> BcResult<Disk> {
        debug_assert_eq!(self.state, TeardownState::Busy);
        match existing_instance_kind(self.host, self.path)? {
            InstanceKind::None => return Err(BcError::NotABcacheDevice(self.path.to_path_buf())),
            InstanceKind::Backing => self.host.sysfs().stop_backing(&dev_name(self.path))?,
            InstanceKind::Cache { set_uuid } => self.host.sysfs().unregister_set(&set_uuid)?,
        }
        self.state = TeardownState::Stopping;

        while self.attempts < RELEASE_ATTEMPTS {
            self.host.pause(RELEASE_DELAY);
            self.attempts += 1;
            match self.host.open_exclusive(self.path) {
                Ok(disk) => {
                    info!("{}: released after {} attempts", self.path.display(), self.attempts);
                    self.state = TeardownState::Released;
                    return Ok(disk);
                }
                Err(BcError::DeviceBusy(_)) => {
                    info!("{}: waiting for bcache device to be closed", self.path.display())
                }
                Err(e) => return Err(e),
            }
        }
        self.state = TeardownState::FailedRelease;
        Err(BcError::FailedRelease {
            path:     self.path.to_path_buf(),
            attempts: self.attempts,
        })
    }
}

#[test]
fn backing_instance_is_stopped() {
    #![allow(clippy::unwrap_used)]
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/sdb");
    host.add_mem_disk(path, 1 << 16);
    host.set_backing_instance("sdb");
    host.set_busy(path, 3);
    // The busy open that led here.
    assert!(host.open_exclusive(path).is_err());

    let mut teardown = Teardown::new(&host, path);
    teardown.run().unwrap();
    assert_eq!(teardown.state(), TeardownState::Released);
    assert_eq!(teardown.attempts(), 3);
    assert_eq!(host.pauses(), 3);
    assert_eq!(host.sysfs_attr("class/block/sdb/bcache/stop").as_deref(), Some("1"));
}

#[test]
fn release_gives_up_after_three_attempts() {
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/sdb");
    host.add_mem_disk(path, 1 << 16);
    host.set_backing_instance("sdb");
    host.set_busy(path, 100);

    let mut teardown = Teardown::new(&host, path);
    assert!(matches!(
        teardown.run(),
        Err(BcError::FailedRelease { attempts: 3, .. })
    ));
    assert_eq!(teardown.state(), TeardownState::FailedRelease);
    assert_eq!(host.pauses(), RELEASE_ATTEMPTS);
}

#[test]
fn busy_without_instance() {
    let host = crate::test::MockHost::new();
    let path = Path::new("/dev/bcache-test/sdc");
    host.add_mem_disk(path, 1 << 16);
    host.set_busy(path, 1);
    assert!(matches!(
        Teardown::new(&host, path).run(),
        Err(BcError::NotABcacheDevice(_))
    ));
    assert_eq!(host.pauses(), 0);
}
