//! Directory-Enumeration Engine (C3).
//!
//! Per-cursor state machine producing one filtered host-format entry per
//! `find-first`/`find-next` call, including the synthetic volume-label
//! entry and the legacy-encoding-aware wildcard filter from C1. An
//! incremental fill pattern adapted to a pull-based cursor, since the
//! host here asks for one entry per call rather than filling a
//! kernel-sized buffer.

use std::collections::HashMap;
use std::io;

use crate::encoding::iconv_u2s;
use crate::errno::HostError;
use crate::path::{self, TranslationFailed};
use crate::remote::{RemoteDirEntry, RemoteSession};
use crate::wire::{FilesInfo, NameBuf};

/// Attribute bit for a directory entry, matching Human68k's `_DOS_ATTR_DIRECTORY`.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Attribute bit for a read-only entry.
pub const ATTR_READONLY: u8 = 0x01;
/// Attribute bit for the synthetic volume-label entry (spec §4.3).
pub const ATTR_VOLUME: u8 = 0x08;

/// Per-enumeration-handle state (spec §3 `DirCursor`).
pub struct DirCursor {
    unit: u8,
    is_root: bool,
    first_call: bool,
    attr_mask: u8,
    pattern: [u8; 21],
    remote_dir: Box<dyn Iterator<Item = io::Result<RemoteDirEntry>> + Send>,
    host_path: String,
}

/// Owns the live set of `DirCursor`s, keyed by the host-supplied address.
#[derive(Default)]
pub struct DirTable {
    cursors: HashMap<u32, DirCursor>,
}

/// Errors `find-first`/`find-next` may report, before mapping to a
/// `HostError` by the dispatcher.
#[derive(Debug)]
pub enum EnumError {
    NoSuchDirectory,
    IllegalArgument,
    NoMoreEntries,
}

impl From<TranslationFailed> for EnumError {
    fn from(_: TranslationFailed) -> Self {
        EnumError::NoSuchDirectory
    }
}

impl DirTable {
    pub fn new() -> Self {
        DirTable::default()
    }

    /// Closes and drops every cursor owned by `unit` (called on unmount).
    pub fn close_unit(&mut self, unit: u8) {
        self.cursors.retain(|_, c| c.unit != unit);
    }

    /// `find-first`: spec §4.3.
    pub fn find_first(
        &mut self,
        key: u32,
        unit: u8,
        root_path: &str,
        name: &NameBuf,
        attr_mask: u8,
        session: &mut dyn RemoteSession,
    ) -> Result<FilesInfo, EnumError> {
        let host_path = path::host_to_remote(root_path, name, false)?;
        let is_root = path::is_virtual_root(name);

        let remote_dir = session
            .opendir(&host_path)
            .map_err(|_| EnumError::NoSuchDirectory)?;

        let pattern = compose_pattern(name);

        let cursor = DirCursor {
            unit,
            is_root,
            first_call: true,
            attr_mask,
            pattern,
            remote_dir,
            host_path,
        };
        // Re-creation under the same key first drops the old entry
        // (and with it, closes its remote iterator).
        self.cursors.insert(key, cursor);
        let cursor = self.cursors.get_mut(&key).expect("just inserted");
        let result = emit_next(cursor);
        if matches!(result, Err(EnumError::NoMoreEntries)) {
            self.cursors.remove(&key);
        }
        result
    }

    /// `find-next`: spec §4.3.
    pub fn find_next(&mut self, key: u32) -> Result<FilesInfo, EnumError> {
        let cursor = self.cursors.get_mut(&key).ok_or(EnumError::IllegalArgument)?;
        let result = emit_next(cursor);
        if matches!(result, Err(EnumError::NoMoreEntries)) {
            self.cursors.remove(&key);
        }
        result
    }
}

/// Composes the 21-byte wildcard pattern from name1/name2/ext, applying
/// the trailing-`?` expansion rule and lower-casing (spec §4.3).
fn compose_pattern(name: &NameBuf) -> [u8; 21] {
    let mut pattern = [0u8; 21];
    pattern[0..8].copy_from_slice(&name.name1);
    pattern[8..18].copy_from_slice(&name.name2);
    pattern[18..21].copy_from_slice(&name.ext);

    if name.name1[7] == b'?' && name.name2[0] == 0 {
        for b in &mut pattern[8..18] {
            *b = b'?';
        }
    }

    path::lower_legacy_inplace(&mut pattern);
    pattern
}

/// Pads `stem` (already known to be <= 18 bytes) and `ext` (<= 3 bytes)
/// into a 21-byte candidate comparable against the pattern.
fn pad_candidate(stem: &[u8], ext: &[u8]) -> [u8; 21] {
    let mut candidate = [b' '; 21];
    candidate[..stem.len()].copy_from_slice(stem);
    candidate[18..18 + ext.len()].copy_from_slice(ext);
    candidate
}

fn split_stem_ext(legacy: &[u8]) -> (&[u8], &[u8]) {
    match legacy.iter().rposition(|&b| b == b'.') {
        Some(dot) => (&legacy[..dot], &legacy[dot + 1..]),
        None => (legacy, &[]),
    }
}

/// Produces the next result for a cursor: the synthetic volume label on
/// the very first root call, otherwise the next filtered remote entry.
fn emit_next(cursor: &mut DirCursor) -> Result<FilesInfo, EnumError> {
    let pattern_is_all_wildcards = cursor.pattern.iter().all(|&b| b == b'?');
    if cursor.first_call && cursor.is_root && (cursor.attr_mask & ATTR_VOLUME) != 0 && pattern_is_all_wildcards {
        cursor.first_call = false;
        let legacy = iconv_u2s(&cursor.host_path).unwrap_or_default();
        let mut name = [0u8; 23];
        let n = legacy.len().min(22);
        name[..n].copy_from_slice(&legacy[..n]);
        return Ok(FilesInfo {
            attribute: ATTR_VOLUME,
            name,
            ..FilesInfo::zeroed()
        });
    }

    loop {
        cursor.first_call = false;
        match cursor.remote_dir.next() {
            None => return Err(EnumError::NoMoreEntries),
            Some(Err(_)) => continue,
            Some(Ok(entry)) => {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                let Ok(legacy) = path::remote_to_host(&entry.name) else { continue };
                let (stem, ext) = split_stem_ext(&legacy);
                let candidate = pad_candidate(stem, ext);
                if !path::wildcard_match(&cursor.pattern, &candidate) {
                    continue;
                }
                if entry.stat.size > u32::MAX as u64 {
                    continue;
                }

                let attr = if entry.stat.is_dir { ATTR_DIRECTORY } else { 0 }
                    | if entry.stat.read_only { ATTR_READONLY } else { 0 };
                if attr & !cursor.attr_mask != 0 {
                    continue;
                }

                let (date, time) = crate::time::pack_mtime_fields(entry.stat.mtime);
                let mut name = [0u8; 23];
                let mut out = stem.to_vec();
                if !ext.is_empty() {
                    out.push(b'.');
                    out.extend_from_slice(ext);
                }
                let n = out.len().min(22);
                name[..n].copy_from_slice(&out[..n]);

                return Ok(FilesInfo {
                    attribute: attr,
                    date: zerocopy::byteorder::big_endian::U16::new(date),
                    time: zerocopy::byteorder::big_endian::U16::new(time),
                    length: zerocopy::byteorder::big_endian::U32::new(entry.stat.size as u32),
                    name,
                    ..FilesInfo::zeroed()
                });
            }
        }
    }
}

pub fn map_enum_error(e: EnumError) -> HostError {
    match e {
        EnumError::NoSuchDirectory => HostError::NoSuchDirectory,
        EnumError::IllegalArgument => HostError::IllegalArgument,
        EnumError::NoMoreEntries => HostError::NoMoreEntries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeSession;

    fn namebuf_all_wildcards() -> NameBuf {
        let mut nb = NameBuf {
            drive: 0,
            path: [0; 65],
            name1: [b'?'; 8],
            name2: [0; 10],
            ext: [b'?'; 3],
        };
        nb.path[0] = crate::wire::PATH_SEPARATOR;
        nb
    }

    #[test]
    fn empty_directory_yields_no_more_entries_immediately() {
        let mut session = FakeSession::new();
        let mut table = DirTable::new();
        let name = namebuf_all_wildcards();
        let err = table
            .find_first(0x1000, 0, "", &name, 0x20, &mut session)
            .unwrap_err();
        assert!(matches!(err, EnumError::NoMoreEntries));
    }

    #[test]
    fn volume_label_precedes_real_entries_exactly_once() {
        let mut session = FakeSession::new();
        session.put_file("readme.txt", b"hi");
        let mut table = DirTable::new();
        let name = namebuf_all_wildcards();

        let first = table.find_first(0x2000, 0, "", &name, 0x28, &mut session).unwrap();
        assert_eq!(first.attribute, ATTR_VOLUME);
        assert_eq!({ first.length.get() }, 0);

        let second = table.find_next(0x2000).unwrap();
        assert_ne!(second.attribute, ATTR_VOLUME);

        let third = table.find_next(0x2000).unwrap_err();
        assert!(matches!(third, EnumError::NoMoreEntries));
    }

    #[test]
    fn find_next_on_unknown_key_is_illegal_argument() {
        let mut table = DirTable::new();
        let err = table.find_next(0xdead).unwrap_err();
        assert!(matches!(err, EnumError::IllegalArgument));
    }

    #[test]
    fn recreating_a_cursor_under_the_same_key_replaces_it() {
        let mut session = FakeSession::new();
        session.put_file("a.txt", b"1");
        session.put_file("b.txt", b"2");
        let mut table = DirTable::new();
        let name = namebuf_all_wildcards();

        table.find_first(0x3000, 0, "", &name, 0x20, &mut session).unwrap();
        // Re-create under the same key before exhausting it; must not panic
        // or leak, and must start a fresh enumeration.
        let restarted = table.find_first(0x3000, 0, "", &name, 0x20, &mut session).unwrap();
        assert_ne!(restarted.attribute, ATTR_VOLUME);
    }
}
