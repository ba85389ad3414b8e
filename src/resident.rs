//! Resident Installer / Remover (C8).
//!
//! Wraps install/remove around the driver's global state and the Keepalive
//! thread. The host-OS glue this component needs on real hardware (probing
//! a TCP networking stack, splicing a driver header into Human68k's driver
//! chain, walking the drive-exchange and current-directory tables at fixed
//! low-memory addresses) has no meaning on the platform this crate actually
//! builds and tests on, so it is abstracted behind `HostHooks`, a platform
//! trait selected at install time the way a mount syscall is selected
//! behind a platform trait. A real Human68k deployment supplies its own
//! `HostHooks` impl that reads and writes the actual low-memory tables;
//! that impl is out of scope here (infeasible without the real
//! hardware/emulator); see DESIGN.md.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::DriverState;
use crate::dispatch;
use crate::keepalive::Keepalive;
use crate::wire::RequestBlock;

/// Minimum heap size accepted by `-m`, in KiB (spec §4.8 step 1).
pub const MIN_HEAP_KIB: u32 = 96;
/// Driver name probed for an existing resident (spec §4.8 install step 4).
pub const DRIVER_NAME: &[u8; 8] = b"SMBFSDRV";
/// Current-directory-table entry type byte for a "remote" drive.
pub const CURDIR_TYPE_REMOTE: u8 = 0x40;

/// Failure modes the installer/remover report (spec §4.8, §7's
/// "resident-load failures print to the console and exit without
/// installing").
#[derive(Debug)]
pub enum ResidentError {
    NetworkingUnavailable,
    AlreadyInstalled,
    NoFreeDriveLetter,
    NotInstalled,
    Busy,
    Io(io::Error),
}

impl From<io::Error> for ResidentError {
    fn from(e: io::Error) -> Self {
        ResidentError::Io(e)
    }
}

impl std::fmt::Display for ResidentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for ResidentError {}

/// Host-OS glue the installer/remover need, abstracted so this crate can be
/// built and tested off real Human68k hardware (spec §4.8, §6 "Collaborator,
/// Host OS"). A production build supplies an impl that reads and writes
/// the real low-memory tables (drive-exchange table, last-drive byte,
/// current-directory table, active-drive count, first memory block) at
/// their documented fixed addresses; see module doc comment.
pub trait HostHooks {
    /// Opens and immediately closes a probe socket to confirm the TCP stack
    /// is loaded (spec §4.8 install step 2).
    fn probe_networking(&mut self) -> io::Result<()>;
    /// True if a resident named `DRIVER_NAME` is already installed.
    fn resident_already_installed(&self) -> bool;
    /// Returns the last drive letter the host OS will address (`'A'..='Z'`).
    fn last_drive(&self) -> u8;
    /// Returns the set of drive letters currently occupied in the
    /// current-directory table.
    fn occupied_drives(&self) -> Vec<u8>;
    /// Populates the current-directory-table slot for `drive` as a remote
    /// drive rooted at the separator byte (spec §4.8 install step 6).
    fn install_curdir_entry(&mut self, drive: u8) -> io::Result<()>;
    /// Clears the current-directory-table slot for `drive` (spec §4.8
    /// remove step 5).
    fn remove_curdir_entry(&mut self, drive: u8) -> io::Result<()>;
    /// Splices this driver's header into the OS driver chain (install
    /// step 8) / unsplices it (remove step 4).
    fn splice_driver_chain(&mut self) -> io::Result<()>;
    fn unsplice_driver_chain(&mut self) -> io::Result<()>;
    /// Frees the resident's memory block (remove step 6).
    fn free_memory_block(&mut self) -> io::Result<()>;
}

/// An in-memory `HostHooks` stand-in used by tests, simulating a host OS
/// with drive letters `A` through `last_drive` and an empty current-
/// directory table at start.
pub struct SimulatedHost {
    pub networking_up: bool,
    pub already_installed: bool,
    pub last_drive: u8,
    pub occupied: Vec<u8>,
    pub chain_spliced: bool,
    pub memory_freed: bool,
}

impl SimulatedHost {
    pub fn new(last_drive: u8) -> Self {
        SimulatedHost {
            networking_up: true,
            already_installed: false,
            last_drive,
            occupied: Vec::new(),
            chain_spliced: false,
            memory_freed: false,
        }
    }
}

impl HostHooks for SimulatedHost {
    fn probe_networking(&mut self) -> io::Result<()> {
        if self.networking_up {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, "TCP stack not loaded"))
        }
    }

    fn resident_already_installed(&self) -> bool {
        self.already_installed
    }

    fn last_drive(&self) -> u8 {
        self.last_drive
    }

    fn occupied_drives(&self) -> Vec<u8> {
        self.occupied.clone()
    }

    fn install_curdir_entry(&mut self, drive: u8) -> io::Result<()> {
        self.occupied.push(drive);
        Ok(())
    }

    fn remove_curdir_entry(&mut self, drive: u8) -> io::Result<()> {
        self.occupied.retain(|&d| d != drive);
        Ok(())
    }

    fn splice_driver_chain(&mut self) -> io::Result<()> {
        self.chain_spliced = true;
        Ok(())
    }

    fn unsplice_driver_chain(&mut self) -> io::Result<()> {
        self.chain_spliced = false;
        Ok(())
    }

    fn free_memory_block(&mut self) -> io::Result<()> {
        self.memory_freed = true;
        Ok(())
    }
}

/// Parsed install-time configuration (spec §4.8 step 1).
#[derive(Debug, Clone)]
pub struct ResidentConfig {
    pub unit_count: u8,
    pub heap_kib: u32,
    pub remove: bool,
    pub debug_level: u8,
}

impl ResidentConfig {
    /// Validates the unit-count/heap-size ranges spec §4.8 step 1 requires.
    pub fn validate(&self) -> Result<(), ResidentError> {
        if !(1..=8).contains(&self.unit_count) {
            return Err(ResidentError::Io(io::Error::new(io::ErrorKind::InvalidInput, "unit count out of range")));
        }
        if self.heap_kib < MIN_HEAP_KIB {
            return Err(ResidentError::Io(io::Error::new(io::ErrorKind::InvalidInput, "heap too small")));
        }
        Ok(())
    }
}

/// The live installed resident: driver state, the drive letters it claimed,
/// and the running Keepalive thread.
pub struct Resident {
    pub state: Arc<Mutex<DriverState>>,
    drives: Vec<u8>,
    keepalive: Option<Keepalive>,
}

impl Resident {
    /// Install flow: spec §4.8 steps 1-9 (step 9, "return to the OS
    /// retaining memory," has no meaning for a long-lived process and is
    /// not modeled).
    pub fn install(config: &ResidentConfig, host: &mut dyn HostHooks) -> Result<Resident, ResidentError> {
        config.validate()?;
        host.probe_networking().map_err(|_| ResidentError::NetworkingUnavailable)?;
        if host.resident_already_installed() {
            return Err(ResidentError::AlreadyInstalled);
        }

        let occupied = host.occupied_drives();
        let mut drives = Vec::with_capacity(config.unit_count as usize);
        for _ in 0..config.unit_count {
            let taken: Vec<u8> = occupied.iter().copied().chain(drives.iter().copied()).collect();
            let drive = (b'A'..=host.last_drive())
                .find(|d| !taken.contains(d))
                .ok_or(ResidentError::NoFreeDriveLetter)?;
            host.install_curdir_entry(drive)?;
            drives.push(drive);
        }

        let state = Arc::new(Mutex::new(DriverState::new(config.unit_count)));
        let keepalive = Keepalive::spawn(state.clone(), config.unit_count);
        host.splice_driver_chain()?;

        log::info!(
            "smbfsd resident installed: {} unit(s), drives {:?}, heap {} KiB",
            config.unit_count,
            drives.iter().map(|&d| d as char).collect::<Vec<_>>(),
            config.heap_kib
        );

        Ok(Resident { state, drives, keepalive: Some(keepalive) })
    }

    /// Remove flow: spec §4.8 remove steps 1-6 (step 1, "locate the
    /// resident via the current-directory table," is satisfied by `self`
    /// already identifying it).
    pub fn remove(mut self, host: &mut dyn HostHooks) -> Result<(), ResidentError> {
        {
            let mut state = self.state.lock();
            let DriverState { mounts, handles, dirs, .. } = &mut *state;
            mounts.unmount_all(handles, dirs).map_err(|_| ResidentError::Busy)?;
        }

        if let Some(keepalive) = self.keepalive.take() {
            keepalive.stop();
        }

        host.unsplice_driver_chain()?;
        for &drive in &self.drives {
            host.remove_curdir_entry(drive)?;
        }
        host.free_memory_block()?;

        log::info!("smbfsd resident removed");
        Ok(())
    }

    /// The request entry point: acquires the global mutex for the duration
    /// of one request, then calls the plain synchronous dispatcher (spec
    /// §5's "dispatcher takes it on entry, releases it on exit").
    pub fn handle_request(&self, req: &mut RequestBlock, buf: &mut [u8], fcb: &mut [u8]) -> crate::errno::HostError {
        let mut state = self.state.lock();
        dispatch::dispatch(&mut state, req, buf, fcb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(unit_count: u8) -> ResidentConfig {
        ResidentConfig { unit_count, heap_kib: MIN_HEAP_KIB, remove: false, debug_level: 0 }
    }

    #[test]
    fn rejects_unit_count_out_of_range() {
        assert!(config(0).validate().is_err());
        assert!(config(9).validate().is_err());
        assert!(config(8).validate().is_ok());
    }

    #[test]
    fn rejects_heap_below_minimum() {
        let mut c = config(1);
        c.heap_kib = MIN_HEAP_KIB - 1;
        assert!(matches!(c.validate(), Err(ResidentError::Io(_))));
    }

    #[test]
    fn install_claims_consecutive_free_drive_letters() {
        let mut host = SimulatedHost::new(b'Z');
        host.occupied = vec![b'A', b'B'];
        let resident = Resident::install(&config(2), &mut host).unwrap();
        assert_eq!(resident.drives, vec![b'C', b'D']);
        assert!(host.chain_spliced);
        assert_eq!(host.occupied, vec![b'A', b'B', b'C', b'D']);
    }

    #[test]
    fn install_fails_when_already_installed() {
        let mut host = SimulatedHost::new(b'Z');
        host.already_installed = true;
        assert!(matches!(Resident::install(&config(1), &mut host), Err(ResidentError::AlreadyInstalled)));
    }

    #[test]
    fn install_fails_without_networking() {
        let mut host = SimulatedHost::new(b'Z');
        host.networking_up = false;
        assert!(matches!(Resident::install(&config(1), &mut host), Err(ResidentError::NetworkingUnavailable)));
    }

    #[test]
    fn install_fails_with_no_free_drive_letters() {
        let mut host = SimulatedHost::new(b'B');
        host.occupied = vec![b'A', b'B'];
        assert!(matches!(Resident::install(&config(1), &mut host), Err(ResidentError::NoFreeDriveLetter)));
    }

    #[test]
    fn remove_unsplices_chain_and_frees_drives() {
        let mut host = SimulatedHost::new(b'Z');
        let resident = Resident::install(&config(2), &mut host).unwrap();
        resident.remove(&mut host).unwrap();
        assert!(!host.chain_spliced);
        assert!(host.memory_freed);
        assert!(host.occupied.is_empty());
    }

    #[test]
    fn remove_refuses_while_a_unit_is_busy() {
        use crate::mount::MountRequest;
        use crate::remote::fake::FakeSession;
        use crate::wire::FCB_MIN_LEN;

        let mut host = SimulatedHost::new(b'Z');
        let resident = Resident::install(&config(1), &mut host).unwrap();
        {
            let mut state = resident.state.lock();
            state
                .mounts
                .mount(0, &MountRequest { url: "smb://server/share".into(), username: None, password: Some("x".into()) })
                .unwrap();
            let mut session = FakeSession::new();
            session.put_file("a.txt", b"x");
            let mut raw = vec![0u8; FCB_MIN_LEN];
            let mut fcb = crate::wire::FcbView::new(&mut raw).unwrap();
            state.handles.create(99, 0, "a.txt", false, &mut session, &mut fcb).unwrap();
        }
        assert!(matches!(resident.remove(&mut host), Err(ResidentError::Busy)));
    }
}
