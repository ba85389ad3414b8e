//! File-Handle Table (C4).
//!
//! Maps host file-control-block addresses to open remote handles and an
//! authoritative position cursor. An open-file map adapted to a
//! host-supplied key instead of a driver-allocated one, since the host
//! FCB address already serves as a stable identity.

use std::collections::HashMap;
use std::io;

use crate::remote::{OpenOptions, RemoteFile, RemoteSession};
use crate::wire::FcbView;

/// An open remote file, keyed by the host's file-control-block address.
struct OpenFile {
    unit: u8,
    remote_fh: Box<dyn RemoteFile>,
    pos: u64,
}

/// Failure modes C4 reports, before mapping to a `HostError` by the caller.
#[derive(Debug)]
pub enum HandleError {
    BadFileNumber,
    IllegalArgument,
    CannotSeek,
    Io(io::Error),
}

impl From<io::Error> for HandleError {
    fn from(e: io::Error) -> Self {
        HandleError::Io(e)
    }
}

/// How a seek offset is interpreted, matching the host's seek-whence byte
/// (spec §6's `attr` field when the command is seek).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    pub fn from_byte(b: u8) -> Option<Whence> {
        match b {
            0 => Some(Whence::Set),
            1 => Some(Whence::Cur),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct HandleTable {
    files: HashMap<u32, OpenFile>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable::default()
    }

    /// Closes and drops every handle owned by `unit` (called on unmount).
    pub fn close_unit(&mut self, unit: u8) {
        self.files.retain(|_, f| f.unit != unit);
    }

    /// True if `unit` has any open handle (the mount manager's busy check).
    pub fn unit_is_busy(&self, unit: u8) -> bool {
        self.files.values().any(|f| f.unit == unit)
    }

    /// `create(unit, path, excl, host-fcb)`: spec §4.4.
    pub fn create(
        &mut self,
        key: u32,
        unit: u8,
        path: &str,
        exclusive: bool,
        session: &mut dyn RemoteSession,
        fcb: &mut FcbView<'_>,
    ) -> Result<(), HandleError> {
        // Close the old remote handle first on reuse (spec §4.4), before
        // the new one is opened.
        self.files.remove(&key);
        let remote_fh = session.open(path, OpenOptions::create_truncate(exclusive))?;
        self.files.insert(key, OpenFile { unit, remote_fh, pos: 0 });
        fcb.set_position(0);
        fcb.set_size(0);
        Ok(())
    }

    /// `open(unit, path, mode, host-fcb)`: spec §4.4. Mode 0 = read,
    /// 1 = write, 2 = read-write.
    pub fn open(
        &mut self,
        key: u32,
        unit: u8,
        path: &str,
        mode: u8,
        session: &mut dyn RemoteSession,
        fcb: &mut FcbView<'_>,
    ) -> Result<(), HandleError> {
        let opts = match mode {
            0 => OpenOptions::read_only(),
            1 => OpenOptions::write_only(),
            2 => OpenOptions::read_write(),
            _ => return Err(HandleError::IllegalArgument),
        };
        let mut remote_fh = session.open(path, opts)?;
        let length = remote_fh.stat()?.size;
        self.files.insert(key, OpenFile { unit, remote_fh, pos: 0 });
        fcb.set_position(0);
        fcb.set_size(length.min(u32::MAX as u64) as u32);
        Ok(())
    }

    /// `close(host-fcb)`: spec §4.4.
    pub fn close(&mut self, key: u32) -> Result<(), HandleError> {
        self.files.remove(&key).map(|_| ()).ok_or(HandleError::BadFileNumber)
    }

    /// `read(host-fcb, buf, len)`: spec §4.4.
    pub fn read(&mut self, key: u32, buf: &mut [u8], fcb: &mut FcbView<'_>) -> Result<usize, HandleError> {
        let entry = self.files.get_mut(&key).ok_or(HandleError::BadFileNumber)?;
        reconcile_position(entry, fcb);
        let n = entry.remote_fh.read_at(entry.pos, buf)?;
        entry.pos += n as u64;
        fcb.set_position(entry.pos.min(u32::MAX as u64) as u32);
        Ok(n)
    }

    /// `write(host-fcb, buf, len)`: spec §4.4. An empty `buf` truncates
    /// the remote file at the host's current position instead of writing.
    pub fn write(&mut self, key: u32, buf: &[u8], fcb: &mut FcbView<'_>) -> Result<usize, HandleError> {
        let entry = self.files.get_mut(&key).ok_or(HandleError::BadFileNumber)?;

        if buf.is_empty() {
            let trunc_at = fcb.position() as u64;
            entry.remote_fh.set_len(trunc_at)?;
            fcb.set_size(trunc_at.min(u32::MAX as u64) as u32);
            return Ok(0);
        }

        reconcile_position(entry, fcb);
        let n = entry.remote_fh.write_at(entry.pos, buf)?;
        entry.pos += n as u64;
        let new_pos = entry.pos.min(u32::MAX as u64) as u32;
        fcb.set_position(new_pos);
        if new_pos > fcb.size() {
            fcb.set_size(new_pos);
        }
        Ok(n)
    }

    /// `filedate(host-fcb, value)`: spec §4.4. `value == 0` reads the
    /// remote mtime and returns it packed as `(date << 16) | time`;
    /// otherwise the packed value sets the remote mtime.
    pub fn filedate(&mut self, key: u32, value: u32) -> Result<u32, HandleError> {
        let entry = self.files.get_mut(&key).ok_or(HandleError::BadFileNumber)?;
        if value == 0 {
            let stat = entry.remote_fh.stat()?;
            let (date, time) = crate::time::pack_mtime_fields(stat.mtime);
            Ok(((date as u32) << 16) | time as u32)
        } else {
            let date = (value >> 16) as u16;
            let time = (value & 0xffff) as u16;
            entry.remote_fh.set_mtime(crate::time::system_time_from_packed(date, time))?;
            Ok(value)
        }
    }
}

fn reconcile_position(entry: &mut OpenFile, fcb: &FcbView<'_>) {
    let host_pos = fcb.position() as u64;
    if host_pos != entry.pos {
        entry.pos = host_pos;
    }
}

/// `seek(host-fcb, offset, whence)`: spec §4.4. Purely in-driver, using
/// only the host's own position/size fields; out-of-range leaves the
/// host's position field unchanged (spec's Open Question #2 resolution).
pub fn seek(fcb: &mut FcbView<'_>, offset: i32, whence: Whence) -> Result<u32, HandleError> {
    let size = fcb.size() as i64;
    let cur = fcb.position() as i64;
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => cur,
        Whence::End => size,
    };
    let new_pos = base + offset as i64;
    if new_pos < 0 || new_pos > size {
        return Err(HandleError::CannotSeek);
    }
    fcb.set_position(new_pos as u32);
    Ok(new_pos as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeSession;
    use crate::wire::FCB_MIN_LEN;

    fn fcb_bytes() -> Vec<u8> {
        vec![0u8; FCB_MIN_LEN]
    }

    #[test]
    fn create_then_write_then_read_round_trips() {
        let mut session = FakeSession::new();
        let mut table = HandleTable::new();
        let mut raw = fcb_bytes();
        let mut fcb = FcbView::new(&mut raw).unwrap();

        table.create(1, 0, "a.txt", false, &mut session, &mut fcb).unwrap();
        assert_eq!(fcb.position(), 0);
        assert_eq!(fcb.size(), 0);

        let n = table.write(1, b"hello", &mut fcb).unwrap();
        assert_eq!(n, 5);
        assert_eq!(fcb.position(), 5);
        assert_eq!(fcb.size(), 5);

        fcb.set_position(0);
        let mut buf = [0u8; 5];
        let n = table.read(1, &mut buf, &mut fcb).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fcb.position(), 5);
    }

    #[test]
    fn write_with_empty_buffer_truncates_at_current_position() {
        let mut session = FakeSession::new();
        session.put_file("a.txt", b"0123456789");
        let mut table = HandleTable::new();
        let mut raw = fcb_bytes();
        let mut fcb = FcbView::new(&mut raw).unwrap();

        table.open(1, 0, "a.txt", 2, &mut session, &mut fcb).unwrap();
        assert_eq!(fcb.size(), 10);
        fcb.set_position(4);

        let n = table.write(1, &[], &mut fcb).unwrap();
        assert_eq!(n, 0);
        assert_eq!(fcb.size(), 4);
    }

    #[test]
    fn close_missing_key_is_bad_file_number() {
        let mut table = HandleTable::new();
        assert!(matches!(table.close(42), Err(HandleError::BadFileNumber)));
    }

    #[test]
    fn seek_past_end_leaves_position_unchanged() {
        let mut raw = fcb_bytes();
        let mut fcb = FcbView::new(&mut raw).unwrap();
        fcb.set_size(100);
        fcb.set_position(0);

        let err = seek(&mut fcb, 200, Whence::Set).unwrap_err();
        assert!(matches!(err, HandleError::CannotSeek));
        assert_eq!(fcb.position(), 0);

        let pos = seek(&mut fcb, 0, Whence::End).unwrap();
        assert_eq!(pos, 100);
        assert_eq!(fcb.position(), 100);
    }

    #[test]
    fn unit_is_busy_reflects_open_handles() {
        let mut session = FakeSession::new();
        let mut table = HandleTable::new();
        let mut raw = fcb_bytes();
        let mut fcb = FcbView::new(&mut raw).unwrap();

        assert!(!table.unit_is_busy(0));
        table.create(1, 0, "a.txt", false, &mut session, &mut fcb).unwrap();
        assert!(table.unit_is_busy(0));
        table.close(1).unwrap();
        assert!(!table.unit_is_busy(0));
    }
}
