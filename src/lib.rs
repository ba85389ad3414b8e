//! `smbfsd`: a Human68k-to-SMB2/3 filesystem driver resident.
//!
//! Bridges Human68k's block-device-oriented filesystem request interface to
//! SMB2/3 shares: it translates each incoming host request into remote
//! filesystem operations, maintains per-handle and per-cursor state, maps
//! encodings and path grammars between the two worlds, and keeps sessions
//! alive across mount/unmount lifecycle. See `SPEC_FULL.md`/`DESIGN.md` for
//! the full component breakdown.

#![warn(rust_2018_idioms, unreachable_pub)]

pub mod cli;
pub mod dispatch;
pub mod driver;
pub mod encoding;
pub mod enumeration;
pub mod errno;
pub mod handles;
pub mod keepalive;
pub mod mount;
pub mod path;
pub mod remote;
pub mod resident;
pub mod time;
pub mod wire;
