use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Unix domain socket standing in for a radio pair on the bench.
///
/// One side binds and accepts, the other connects; both ends then speak the
/// same framed byte stream a modem would carry. The socket file is removed on
/// drop, unless something else has replaced it in the meantime.
pub struct LoopbackSocket {
    listener: UnixListener,
    path: PathBuf,
    identity: (u64, u64),
}

impl LoopbackSocket {
    /// Permission mode applied to the socket file.
    pub const SOCKET_MODE: u32 = 0o600;

    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(target_os = "macos"))]
    const MAX_PATH_LEN: usize = 108;

    /// Bind and listen at `path`. A stale socket file at `path` is replaced;
    /// any other kind of file is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path, source| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if !meta.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "replacing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(|e| bind_err(&path, e))?;
        let meta = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "loopback link listening");
        Ok(Self {
            listener,
            path,
            identity: (meta.dev(), meta.ino()),
        })
    }

    /// Wait for the far end to connect.
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "loopback peer connected");
        Ok(LinkStream::from_unix(stream))
    }

    /// Connect to a listening loopback socket.
    pub fn connect(path: impl AsRef<Path>) -> Result<LinkStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to loopback link");
        Ok(LinkStream::from_unix(stream))
    }

    /// An already-connected pair of link ends, for in-process use.
    pub fn pair() -> Result<(LinkStream, LinkStream)> {
        let (a, b) = UnixStream::pair()?;
        Ok((LinkStream::from_unix(a), LinkStream::from_unix(b)))
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        let Ok(meta) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if meta.file_type().is_socket() && (meta.dev(), meta.ino()) == self.identity {
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; leaving it in place");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rfdlink-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_connect() {
        let dir = scratch_dir("basic");
        let sock_path = dir.join("link.sock");
        let listener = LoopbackSocket::bind(&sock_path).unwrap();

        let path = sock_path.clone();
        let client = std::thread::spawn(move || {
            let mut link = LoopbackSocket::connect(&path).unwrap();
            link.write_all(b"rover").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"rover");
        client.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn socket_file_is_owner_only() {
        let dir = scratch_dir("mode");
        let sock_path = dir.join("link.sock");
        let _listener = LoopbackSocket::bind(&sock_path).unwrap();

        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long_rejected() {
        let long = format!("/tmp/{}.sock", "r".repeat(200));
        assert!(matches!(
            LoopbackSocket::bind(&long),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[test]
    fn refuses_to_replace_regular_file() {
        let dir = scratch_dir("file");
        let sock_path = dir.join("capture.bin");
        std::fs::write(&sock_path, b"not a socket").unwrap();

        assert!(matches!(
            LoopbackSocket::bind(&sock_path),
            Err(TransportError::Bind { .. })
        ));
        assert!(sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_without_listener_fails() {
        let dir = scratch_dir("noconn");
        let err = LoopbackSocket::connect(dir.join("absent.sock")).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
