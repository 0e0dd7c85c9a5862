use std::sync::Mutex;

lazy_static! {
    static ref MUTEX: Mutex<bool> = Mutex::new(false);
}

pub fn init_log() {
    let mut done = MUTEX.lock().unwrap();
    if !*done {
        // A logger may already be installed.
        let _ = crate::logging::init(log::LevelFilter::Debug);
        *done = true;
    }
}
