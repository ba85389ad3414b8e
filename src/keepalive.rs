//! Keepalive Driver (C7).
//!
//! A single background thread that pings each mounted unit in round-robin
//! order every 30 seconds, holding the same global mutex the dispatcher
//! uses. An `AtomicBool` exit flag plus a `Condvar`-based interruptible
//! sleep, instead of a bare `thread::sleep` that can't be woken early on
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex as StateMutex;

use crate::driver::DriverState;

const TICK_PERIOD: Duration = Duration::from_secs(30);

struct Cancel {
    flag: AtomicBool,
    cond: Condvar,
    lock: Mutex<()>,
}

/// Handle to the running Keepalive thread; dropping this does not stop the
/// thread, `stop()` must be called explicitly rather than joining from
/// `Drop`, since joining from `Drop` could deadlock the thread that owns
/// the global mutex.
pub struct Keepalive {
    cancel: Arc<Cancel>,
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    /// Spawns the background thread. `unit_count` is fixed at spawn time
    /// (the resident installer decides it once at load, per spec §4.8).
    pub fn spawn(state: Arc<StateMutex<DriverState>>, unit_count: u8) -> Keepalive {
        let cancel = Arc::new(Cancel {
            flag: AtomicBool::new(false),
            cond: Condvar::new(),
            lock: Mutex::new(()),
        });
        let thread_cancel = cancel.clone();

        let handle = std::thread::spawn(move || {
            let mut round_robin: u8 = 0;
            loop {
                if wait_or_cancelled(&thread_cancel, TICK_PERIOD) {
                    break;
                }
                {
                    let mut state = state.lock();
                    if unit_count > 0 {
                        if let Some(unit) = state.mounts.get_mut(round_robin) {
                            let _ = unit.session_mut().echo();
                            log::debug!("keepalive ping on unit {round_robin}");
                        }
                        round_robin = (round_robin + 1) % unit_count;
                    }
                }
            }
            log::info!("keepalive thread stopped");
        });

        log::info!("keepalive thread started");
        Keepalive { cancel, handle: Some(handle) }
    }

    /// Signals cancellation and joins the thread (spec §4.7, §4.8 remove
    /// step 3). Any in-flight ping is allowed to finish; no retry occurs.
    pub fn stop(mut self) {
        self.cancel.flag.store(true, Ordering::SeqCst);
        self.cancel.cond.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sleeps for `period` unless cancelled first; returns `true` if cancelled.
fn wait_or_cancelled(cancel: &Cancel, period: Duration) -> bool {
    if cancel.flag.load(Ordering::SeqCst) {
        return true;
    }
    let guard = cancel.lock.lock().unwrap();
    let (_guard, _timeout) = cancel
        .cond
        .wait_timeout_while(guard, period, |_| !cancel.flag.load(Ordering::SeqCst))
        .unwrap();
    cancel.flag.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverState;

    #[test]
    fn stop_joins_promptly_without_waiting_a_full_tick() {
        let state = Arc::new(StateMutex::new(DriverState::new(1)));
        let keepalive = Keepalive::spawn(state, 1);
        let start = std::time::Instant::now();
        keepalive.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
