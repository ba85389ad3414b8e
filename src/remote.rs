//! Remote protocol collaborator seam (spec §6 "Protocol Library").
//!
//! The rest of the driver talks only to a
//! `RemoteSession`/`RemoteFile`/`RemoteDirIter` trio, a trait-at-the-seam
//! against the remote protocol, never to a wire-level client type
//! directly. Production wiring is `SmbSession`; see its own doc comment
//! for why it is a placeholder rather than a real SMB2/3 client. Tests
//! use an in-memory fake (`tests/` and the unit tests in this module).

use std::io;
use std::time::SystemTime;

/// Attributes and size/mtime of a remote file or directory, as needed to
/// fill in a host `FilesInfo` record or answer `fstat`/`getattr`.
#[derive(Debug, Clone)]
pub struct RemoteStat {
    pub is_dir: bool,
    pub size: u64,
    pub mtime: SystemTime,
    /// True if the remote marks this entry read-only (folded into the
    /// host attribute byte by the caller).
    pub read_only: bool,
}

/// One entry produced while walking a remote directory.
#[derive(Debug, Clone)]
pub struct RemoteDirEntry {
    pub name: String,
    pub stat: RemoteStat,
}

/// How a remote file is opened, mirroring the create/open handlers of
/// spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        OpenOptions { read: true, write: false, create: false, truncate: false, exclusive: false }
    }

    pub fn read_write() -> Self {
        OpenOptions { read: true, write: true, create: false, truncate: false, exclusive: false }
    }

    pub fn write_only() -> Self {
        OpenOptions { read: false, write: true, create: false, truncate: false, exclusive: false }
    }

    pub fn create_truncate(exclusive: bool) -> Self {
        OpenOptions {
            read: true,
            write: true,
            create: true,
            truncate: true,
            exclusive,
        }
    }
}

/// An open remote file handle.
pub trait RemoteFile: Send {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<usize>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    fn stat(&mut self) -> io::Result<RemoteStat>;
    fn set_mtime(&mut self, mtime: SystemTime) -> io::Result<()>;
}

/// A connected share session, the unit of ownership stored in `Unit`
/// (spec §3).
pub trait RemoteSession: Send {
    fn stat(&mut self, path: &str) -> io::Result<RemoteStat>;
    fn open(&mut self, path: &str, opts: OpenOptions) -> io::Result<Box<dyn RemoteFile>>;
    fn mkdir(&mut self, path: &str) -> io::Result<()>;
    fn rmdir(&mut self, path: &str) -> io::Result<()>;
    fn unlink(&mut self, path: &str) -> io::Result<()>;
    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;
    fn opendir(&mut self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<RemoteDirEntry>> + Send>>;
    /// A no-op liveness ping (spec §4.7's keepalive, spec §6's `echo`).
    fn echo(&mut self) -> io::Result<()>;
    /// Disconnects the session. Called once, from `unmount`.
    fn disconnect(&mut self) -> io::Result<()>;
}

/// Credentials and connection parameters resolved from a mount URL
/// (spec §4.6 step 4).
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub server: String,
    pub share: String,
    pub root_subpath: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Connects a new session, honoring `security mode = signing-enabled`
/// (spec §4.6 step 6). Production entry point; see `smb_backend` below.
pub fn connect(params: &ConnectParams) -> io::Result<Box<dyn RemoteSession>> {
    smb_backend::connect(params)
}

/// Production backend binding point for the "Protocol Library" collaborator
/// (spec §1 explicitly places its implementation out of scope; spec §6
/// assumes it is "available with the contract in §6": synchronous
/// connect/open/read/write/seek/fstat/futimes/ftruncate/unlink/mkdir/
/// rmdir/rename/stat/statvfs/opendir/readdir/closedir/echo wrappers).
///
/// The driver only ever reaches this module through the `RemoteSession`
/// trait above; no other module names anything SMB2/3-specific. This
/// module does not itself depend on any SMB2/3 client crate: the example
/// pack's `smb`/`smb-msg`/`smb-dtyp`/`smb-fscc` family only supplies
/// wire-format packet/struct definitions (MS-FSCC information classes,
/// `SMB2 CREATE`/`IOCTL` messages), not a connection/session API to call
/// against, so wiring this module to it would mean inventing a client
/// surface with no grounding in the pack. See DESIGN.md.
mod smb_backend {
    use super::*;

    pub fn connect(params: &ConnectParams) -> io::Result<Box<dyn RemoteSession>> {
        Ok(Box::new(SmbSession::connect(params)?))
    }

    struct SmbSession {
        params: ConnectParams,
    }

    impl SmbSession {
        fn connect(params: &ConnectParams) -> io::Result<SmbSession> {
            Ok(SmbSession { params: params.clone() })
        }
    }

    impl RemoteSession for SmbSession {
        fn stat(&mut self, _path: &str) -> io::Result<RemoteStat> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend stat not wired in this build"))
        }

        fn open(&mut self, _path: &str, _opts: OpenOptions) -> io::Result<Box<dyn RemoteFile>> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend open not wired in this build"))
        }

        fn mkdir(&mut self, _path: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend mkdir not wired in this build"))
        }

        fn rmdir(&mut self, _path: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend rmdir not wired in this build"))
        }

        fn unlink(&mut self, _path: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend unlink not wired in this build"))
        }

        fn rename(&mut self, _from: &str, _to: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend rename not wired in this build"))
        }

        fn opendir(
            &mut self,
            _path: &str,
        ) -> io::Result<Box<dyn Iterator<Item = io::Result<RemoteDirEntry>> + Send>> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend opendir not wired in this build"))
        }

        fn echo(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "smb backend echo not wired in this build"))
        }

        fn disconnect(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! An in-memory `RemoteSession` used across the crate's unit and
    //! integration tests, in place of a live SMB2/3 server. Mirrors the
    //! teacher's practice of testing filesystem logic against an
    //! in-memory fake rather than a real kernel mount
    //! (`tests/integration_tests.rs`).
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    enum Node {
        Dir,
        File(Vec<u8>, SystemTime),
    }

    #[derive(Default)]
    struct Tree {
        nodes: BTreeMap<String, Node>,
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    pub struct FakeSession {
        tree: Arc<Mutex<Tree>>,
        pub echo_count: u32,
    }

    impl FakeSession {
        pub fn new() -> Self {
            let mut tree = Tree::default();
            tree.nodes.insert(String::new(), Node::Dir);
            FakeSession { tree: Arc::new(Mutex::new(tree)), echo_count: 0 }
        }

        pub fn put_file(&self, path: &str, contents: &[u8]) {
            let mut tree = self.tree.lock().unwrap();
            tree.nodes.insert(normalize(path), Node::File(contents.to_vec(), SystemTime::UNIX_EPOCH));
        }

        pub fn put_dir(&self, path: &str) {
            let mut tree = self.tree.lock().unwrap();
            tree.nodes.insert(normalize(path), Node::Dir);
        }
    }

    struct FakeFile {
        tree: Arc<Mutex<Tree>>,
        path: String,
    }

    impl RemoteFile for FakeFile {
        fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
            let tree = self.tree.lock().unwrap();
            match tree.nodes.get(&self.path) {
                Some(Node::File(data, _)) => {
                    let pos = pos as usize;
                    if pos >= data.len() {
                        return Ok(0);
                    }
                    let n = buf.len().min(data.len() - pos);
                    buf[..n].copy_from_slice(&data[pos..pos + n]);
                    Ok(n)
                }
                _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<usize> {
            let mut tree = self.tree.lock().unwrap();
            match tree.nodes.get_mut(&self.path) {
                Some(Node::File(data, _)) => {
                    let pos = pos as usize;
                    if data.len() < pos + buf.len() {
                        data.resize(pos + buf.len(), 0);
                    }
                    data[pos..pos + buf.len()].copy_from_slice(buf);
                    Ok(buf.len())
                }
                _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn set_len(&mut self, len: u64) -> io::Result<()> {
            let mut tree = self.tree.lock().unwrap();
            match tree.nodes.get_mut(&self.path) {
                Some(Node::File(data, _)) => {
                    data.resize(len as usize, 0);
                    Ok(())
                }
                _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn stat(&mut self) -> io::Result<RemoteStat> {
            let tree = self.tree.lock().unwrap();
            match tree.nodes.get(&self.path) {
                Some(Node::File(data, mtime)) => Ok(RemoteStat {
                    is_dir: false,
                    size: data.len() as u64,
                    mtime: *mtime,
                    read_only: false,
                }),
                _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn set_mtime(&mut self, mtime: SystemTime) -> io::Result<()> {
            let mut tree = self.tree.lock().unwrap();
            match tree.nodes.get_mut(&self.path) {
                Some(Node::File(_, m)) => {
                    *m = mtime;
                    Ok(())
                }
                _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }
    }

    impl RemoteSession for FakeSession {
        fn stat(&mut self, path: &str) -> io::Result<RemoteStat> {
            let tree = self.tree.lock().unwrap();
            match tree.nodes.get(&normalize(path)) {
                Some(Node::Dir) => Ok(RemoteStat {
                    is_dir: true,
                    size: 0,
                    mtime: SystemTime::UNIX_EPOCH,
                    read_only: false,
                }),
                Some(Node::File(data, mtime)) => Ok(RemoteStat {
                    is_dir: false,
                    size: data.len() as u64,
                    mtime: *mtime,
                    read_only: false,
                }),
                None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn open(&mut self, path: &str, opts: OpenOptions) -> io::Result<Box<dyn RemoteFile>> {
            let key = normalize(path);
            {
                let mut tree = self.tree.lock().unwrap();
                let exists = tree.nodes.contains_key(&key);
                if opts.create {
                    if exists && opts.exclusive {
                        return Err(io::Error::from_raw_os_error(libc::EEXIST));
                    }
                    if !exists || opts.truncate {
                        tree.nodes.insert(key.clone(), Node::File(Vec::new(), SystemTime::UNIX_EPOCH));
                    }
                } else if !exists {
                    return Err(io::Error::from_raw_os_error(libc::ENOENT));
                }
            }
            Ok(Box::new(FakeFile { tree: self.tree.clone(), path: key }))
        }

        fn mkdir(&mut self, path: &str) -> io::Result<()> {
            let key = normalize(path);
            let mut tree = self.tree.lock().unwrap();
            if tree.nodes.contains_key(&key) {
                return Err(io::Error::from_raw_os_error(libc::EEXIST));
            }
            tree.nodes.insert(key, Node::Dir);
            Ok(())
        }

        fn rmdir(&mut self, path: &str) -> io::Result<()> {
            let key = normalize(path);
            let mut tree = self.tree.lock().unwrap();
            match tree.nodes.get(&key) {
                Some(Node::Dir) => {}
                Some(Node::File(..)) => return Err(io::Error::from_raw_os_error(libc::ENOTDIR)),
                None => return Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
            let has_children = tree.nodes.keys().any(|k| k != &key && k.starts_with(&format!("{key}/")));
            if has_children {
                return Err(io::Error::from_raw_os_error(libc::ENOTEMPTY));
            }
            tree.nodes.remove(&key);
            Ok(())
        }

        fn unlink(&mut self, path: &str) -> io::Result<()> {
            let key = normalize(path);
            let mut tree = self.tree.lock().unwrap();
            match tree.nodes.remove(&key) {
                Some(Node::File(..)) => Ok(()),
                Some(Node::Dir) => {
                    tree.nodes.insert(key, Node::Dir);
                    Err(io::Error::from_raw_os_error(libc::EISDIR))
                }
                None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
            }
        }

        fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
            let from = normalize(from);
            let to = normalize(to);
            let mut tree = self.tree.lock().unwrap();
            let node = tree.nodes.remove(&from).ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
            tree.nodes.insert(to, node);
            Ok(())
        }

        fn opendir(
            &mut self,
            path: &str,
        ) -> io::Result<Box<dyn Iterator<Item = io::Result<RemoteDirEntry>> + Send>> {
            let prefix = normalize(path);
            let tree = self.tree.lock().unwrap();
            if !matches!(tree.nodes.get(&prefix), Some(Node::Dir)) {
                return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
            }
            let child_prefix = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
            let mut entries = Vec::new();
            for (key, node) in tree.nodes.iter() {
                if key == &prefix {
                    continue;
                }
                let Some(rest) = key.strip_prefix(&child_prefix) else { continue };
                if rest.is_empty() || rest.contains('/') {
                    continue;
                }
                let stat = match node {
                    Node::Dir => RemoteStat { is_dir: true, size: 0, mtime: SystemTime::UNIX_EPOCH, read_only: false },
                    Node::File(data, mtime) => RemoteStat {
                        is_dir: false,
                        size: data.len() as u64,
                        mtime: *mtime,
                        read_only: false,
                    },
                };
                entries.push(Ok(RemoteDirEntry { name: rest.to_string(), stat }));
            }
            Ok(Box::new(entries.into_iter()))
        }

        fn echo(&mut self) -> io::Result<()> {
            self.echo_count += 1;
            Ok(())
        }

        fn disconnect(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fake_session_round_trips_a_file() {
        let mut session = FakeSession::new();
        let mut fh = session.open("a.txt", OpenOptions::create_truncate(false)).unwrap();
        fh.write_at(0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = fh.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn fake_session_rmdir_rejects_nonempty() {
        let mut session = FakeSession::new();
        session.mkdir("dir").unwrap();
        session.put_file("dir/child.txt", b"x");
        assert!(session.rmdir("dir").is_err());
    }
}
