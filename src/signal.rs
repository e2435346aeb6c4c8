//! SIGINT/SIGTERM turn into run cancellation
//!
//! The handler only flips an atomic flag; a watcher thread polls it and
//! cancels the token. A second signal exits immediately.

use provision::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

static RECEIVED: AtomicBool = AtomicBool::new(false);

/// Exit status for a second interrupt (128 + SIGINT)
#[cfg(unix)]
const FORCED_EXIT: libc::c_int = 130;

#[cfg(unix)]
extern "C" fn on_signal(_signum: libc::c_int) {
    if RECEIVED.swap(true, Ordering::SeqCst) {
        // SAFETY: _exit is async-signal-safe
        unsafe { libc::_exit(FORCED_EXIT) };
    }
}

/// Route SIGINT and SIGTERM to `cancel`
#[cfg(unix)]
pub fn install(cancel: &CancelToken) {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches an atomic and calls _exit
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
    spawn_watcher(cancel.clone());
}

#[cfg(not(unix))]
pub fn install(cancel: &CancelToken) {
    spawn_watcher(cancel.clone());
}

fn spawn_watcher(cancel: CancelToken) {
    let spawned = thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || {
            while !RECEIVED.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            eprintln!("\nInterrupted, finishing in-flight steps (press again to abort)");
            cancel.cancel();
        });

    if let Err(e) = spawned {
        log::warn!("Could not watch for interrupts: {e}");
    }
}
