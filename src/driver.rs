//! Process-wide driver state and the single entry point that serializes
//! access to it.
//!
//! One owned state object, reached only through a `parking_lot::Mutex`,
//! with the dispatcher itself staying plain synchronous Rust (spec §5's
//! "one process-wide mutex" model; no `tokio`/async runtime, since the
//! host invokes the dispatcher as an ordinary synchronous call rather
//! than a kernel message queue).

use crate::enumeration::DirTable;
use crate::handles::HandleTable;
use crate::mount::MountTable;

/// All mutable state the dispatcher and Keepalive thread share.
pub struct DriverState {
    pub mounts: MountTable,
    pub handles: HandleTable,
    pub dirs: DirTable,
    pub unit_count: u8,
}

impl DriverState {
    pub fn new(unit_count: u8) -> DriverState {
        DriverState {
            mounts: MountTable::new(),
            handles: HandleTable::new(),
            dirs: DirTable::new(),
            unit_count,
        }
    }
}
