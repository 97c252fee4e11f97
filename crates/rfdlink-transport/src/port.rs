//! Port selection and serial device diagnostics.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Prefix selecting the Unix socket loopback instead of a serial device.
pub const UNIX_PREFIX: &str = "unix:";

/// Where a link lives: a serial device path or a loopback socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Serial(PathBuf),
    Unix(PathBuf),
}

impl FromStr for PortSpec {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(TransportError::InvalidPortSpec(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if s.is_empty() {
            return Err(TransportError::InvalidPortSpec(s.to_string()));
        }
        Ok(Self::Serial(PathBuf::from(s)))
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(path) => write!(f, "{}", path.display()),
            Self::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

/// Open the link described by `spec`. Serial settings are ignored for sockets.
#[cfg(unix)]
pub fn open_port(
    spec: &PortSpec,
    serial: &crate::serial::SerialConfig,
) -> Result<crate::LinkStream> {
    match spec {
        PortSpec::Serial(path) => crate::serial::SerialPort::open(path, serial),
        PortSpec::Unix(path) => {
            let link = crate::uds::LoopbackSocket::connect(path)?;
            link.set_read_timeout(serial.read_timeout)?;
            link.set_write_timeout(serial.write_timeout)?;
            Ok(link)
        }
    }
}

const DEVICE_PREFIXES: &[&str] = &["ttyUSB", "ttyACM", "cu.usbserial", "cu.usbmodem"];

/// Serial devices under `/dev` that look like a USB modem.
pub fn candidate_ports() -> Vec<PathBuf> {
    candidate_ports_in(Path::new("/dev"))
}

fn candidate_ports_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ports: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            DEVICE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
        })
        .map(|entry| entry.path())
        .collect();
    ports.sort();
    ports
}

/// Access facts about a device node, for permission troubleshooting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: PathBuf,
    pub exists: bool,
    /// Permission bits (`0o777` mask).
    pub mode: Option<u32>,
    /// Owning group id of the node.
    pub gid: Option<u32>,
    /// Whether the current process may open the node read/write.
    pub accessible: bool,
    /// Whether the current process belongs to the node's group.
    pub in_group: bool,
}

impl PortInfo {
    /// True when anyone may read and write the node.
    pub fn world_writable(&self) -> bool {
        self.mode.is_some_and(|mode| mode & 0o006 == 0o006)
    }
}

/// Inspect `path` without opening it.
#[cfg(unix)]
pub fn inspect_port(path: impl AsRef<Path>) -> PortInfo {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;

    let path = path.as_ref().to_path_buf();
    let Ok(meta) = std::fs::metadata(&path) else {
        return PortInfo {
            path,
            exists: false,
            mode: None,
            gid: None,
            accessible: false,
            in_group: false,
        };
    };

    let accessible = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map(|c_path| {
            // SAFETY: `c_path` is a valid NUL-terminated string.
            unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
        })
        .unwrap_or(false);

    PortInfo {
        path,
        exists: true,
        mode: Some(meta.mode() & 0o777),
        gid: Some(meta.gid()),
        accessible,
        in_group: process_in_group(meta.gid()),
    }
}

#[cfg(unix)]
fn process_in_group(gid: u32) -> bool {
    // SAFETY: getegid has no preconditions.
    if unsafe { libc::getegid() } == gid {
        return true;
    }
    // SAFETY: a zero-length query only returns the group count.
    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    if count <= 0 {
        return false;
    }
    let mut groups = vec![0 as libc::gid_t; count as usize];
    // SAFETY: `groups` has room for `count` entries.
    let filled = unsafe { libc::getgroups(count, groups.as_mut_ptr()) };
    if filled < 0 {
        return false;
    }
    groups.truncate(filled as usize);
    groups.contains(&gid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serial_and_unix_specs() {
        assert_eq!(
            "/dev/ttyUSB0".parse::<PortSpec>().unwrap(),
            PortSpec::Serial(PathBuf::from("/dev/ttyUSB0"))
        );
        assert_eq!(
            "unix:/tmp/rover.sock".parse::<PortSpec>().unwrap(),
            PortSpec::Unix(PathBuf::from("/tmp/rover.sock"))
        );
    }

    #[test]
    fn rejects_empty_specs() {
        assert!("".parse::<PortSpec>().is_err());
        assert!("unix:".parse::<PortSpec>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let spec = PortSpec::Unix(PathBuf::from("/tmp/a.sock"));
        assert_eq!(spec.to_string(), "unix:/tmp/a.sock");
        assert_eq!(spec.to_string().parse::<PortSpec>().unwrap(), spec);
    }

    #[test]
    fn candidate_scan_filters_by_prefix() {
        let dir = std::env::temp_dir().join(format!("rfdlink-devscan-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["ttyUSB1", "ttyUSB0", "ttyACM0", "ttyS0", "null"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let found = candidate_ports_in(&dir);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ttyACM0", "ttyUSB0", "ttyUSB1"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    #[cfg(unix)]
    fn inspect_missing_port() {
        let info = inspect_port("/dev/rfdlink-does-not-exist");
        assert!(!info.exists);
        assert!(!info.accessible);
        assert!(!info.world_writable());
    }

    #[test]
    #[cfg(unix)]
    fn inspect_owned_file() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("rfdlink-inspect-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).unwrap();

        let info = inspect_port(&path);
        assert!(info.exists);
        assert!(info.accessible);
        assert!(info.world_writable());
        let _ = std::fs::remove_file(&path);
    }
}
