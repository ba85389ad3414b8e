//! Error Code Mapper (C2).
//!
//! Maps POSIX-style errno values the remote collaborator reports into the
//! host OS's error numerics, with a handful of command-context overrides.
//! A table plus call-site overrides, no exceptions crossing the boundary.

use std::fmt;

/// A POSIX-style error as reported by the remote collaborator or produced
/// internally by translation/lookup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    ENOENT,
    ENOTDIR,
    EMFILE,
    EISDIR,
    EBADF,
    ENOMEM,
    EFAULT,
    ENOEXEC,
    ENAMETOOLONG,
    EINVAL,
    EXDEV,
    EACCES,
    EPERM,
    EROFS,
    ENOTEMPTY,
    ENOSPC,
    EOVERFLOW,
    EEXIST,
}

impl Errno {
    /// Extracts the closest matching [`Errno`] from a remote I/O error's raw
    /// OS error number, defaulting to `EINVAL` for anything not in the
    /// table above (matching the `default:` arm of `conv_errno` in the
    /// original source).
    pub fn from_io_error(err: &std::io::Error) -> Errno {
        match err.raw_os_error() {
            Some(libc::ENOENT) => Errno::ENOENT,
            Some(libc::ENOTDIR) => Errno::ENOTDIR,
            Some(libc::EMFILE) => Errno::EMFILE,
            Some(libc::EISDIR) => Errno::EISDIR,
            Some(libc::EBADF) => Errno::EBADF,
            Some(libc::ENOMEM) => Errno::ENOMEM,
            Some(libc::EFAULT) => Errno::EFAULT,
            Some(libc::ENOEXEC) => Errno::ENOEXEC,
            Some(libc::ENAMETOOLONG) => Errno::ENAMETOOLONG,
            Some(libc::EXDEV) => Errno::EXDEV,
            Some(libc::EACCES) => Errno::EACCES,
            Some(libc::EPERM) => Errno::EPERM,
            Some(libc::EROFS) => Errno::EROFS,
            Some(libc::ENOTEMPTY) => Errno::ENOTEMPTY,
            Some(libc::ENOSPC) => Errno::ENOSPC,
            Some(libc::EOVERFLOW) => Errno::EOVERFLOW,
            Some(libc::EEXIST) => Errno::EEXIST,
            _ => Errno::EINVAL,
        }
    }
}

/// The host OS error codes the driver may return in a request's status
/// field, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum HostError {
    Success = 0,
    NoSuchEntry,
    NoSuchDirectory,
    TooManyOpenFiles,
    IsADirectory,
    BadFileNumber,
    OutOfMemory,
    IllegalMemoryPointer,
    IllegalFormat,
    IllegalFilename,
    IllegalParameter,
    IllegalDrive,
    ReadOnly,
    DirectoryExists,
    NotEmpty,
    DiskFull,
    DirectoryFull,
    CannotSeek,
    FileExists,
    IsCurrentDirectory,
    CannotRename,
    NoMoreEntries,
    IllegalArgument,
    /// Mount manager: unit already mounted.
    AlreadyExists,
    /// Mount/unmount manager: unit has open handles.
    Busy,
    /// Dispatcher-level "no response" (hardware error 0x1002), distinct
    /// from `UnknownCommand`: it fires when the remote collaborator times
    /// out rather than when the command byte is unrecognized.
    CommandTimeout = 0x1002,
    /// Dispatcher-level "unknown command" (hardware error 0x1003).
    UnknownCommand = 0x1003,
}

impl HostError {
    /// The numeric code written into a request's status field on return
    /// (spec §6 "status (in parameter, out return)"; §7's handler-failure
    /// channel). The original writes this same value for every command,
    /// success or failure, so `dispatch` does too rather than leaving
    /// `status` holding its input value on failure.
    pub fn code(self) -> u32 {
        self as u16 as u32
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for HostError {}

/// Command-specific override context, used where the same POSIX errno maps
/// to a different host code depending on which handler is calling (spec
/// §4.2, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Mkdir,
    Rmdir,
    Rename,
    Create,
    Open,
}

/// Maps an I/O error from the remote collaborator to a host error code,
/// distinguishing a transport timeout (supplemented feature: the original
/// `com_timeout`'s hardware error 0x1002, kept distinct from the
/// dispatcher's unknown-command 0x1003) from an ordinary POSIX errno.
pub fn map_io_error(err: &std::io::Error, ctx: Option<Context>) -> HostError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        return HostError::CommandTimeout;
    }
    map_errno(Errno::from_io_error(err), ctx)
}

/// Maps a POSIX errno to the host error code, applying the command-context
/// override table from spec §4.2 before falling back to the fixed table.
pub fn map_errno(err: Errno, ctx: Option<Context>) -> HostError {
    use Context::*;
    use Errno::*;
    use HostError::*;

    match (ctx, err) {
        (Some(Mkdir), EEXIST) => return DirectoryExists,
        (Some(Rmdir), EINVAL) => return IsCurrentDirectory,
        (Some(Rename), ENOTEMPTY) => return CannotRename,
        (Some(Create), ENOSPC) => return DirectoryFull,
        _ => {}
    }

    match err {
        ENOENT => NoSuchEntry,
        ENOTDIR => NoSuchDirectory,
        EMFILE => TooManyOpenFiles,
        EISDIR => IsADirectory,
        EBADF => BadFileNumber,
        ENOMEM => OutOfMemory,
        EFAULT => IllegalMemoryPointer,
        ENOEXEC => IllegalFormat,
        ENAMETOOLONG => IllegalFilename,
        EINVAL => IllegalParameter,
        EXDEV => IllegalDrive,
        EACCES | EPERM | EROFS => ReadOnly,
        ENOTEMPTY => NotEmpty,
        ENOSPC => DiskFull,
        EOVERFLOW => CannotSeek,
        EEXIST => FileExists,
    }
}
