use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Air/serial rate the RFD-900x modems ship with.
pub const DEFAULT_BAUD: u32 = 57_600;

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line rate in bits per second.
    pub baud: u32,
    /// Read timeout applied right after opening. `None` blocks.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied right after opening. `None` blocks.
    pub write_timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Opens serial devices as [`LinkStream`]s.
pub struct SerialPort;

impl SerialPort {
    /// Open `path` in raw 8N1 mode at `config.baud`.
    ///
    /// The device is opened with `O_NOCTTY` so a modem on a spare TTY never
    /// becomes the controlling terminal. Pending input is flushed so a stale
    /// half-frame from before the open is not fed to the decoder.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<LinkStream> {
        let path = path.as_ref();
        let speed = baud_to_speed(config.baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        configure_raw(&file, speed).map_err(|source| TransportError::Configure {
            path: path.to_path_buf(),
            source,
        })?;

        info!(?path, baud = config.baud, "opened serial link");

        let port = SerialStream {
            file,
            path: path.to_path_buf(),
            read_timeout: Cell::new(config.read_timeout),
            write_timeout: Cell::new(config.write_timeout),
        };
        Ok(LinkStream::from_serial(port))
    }
}

/// An open, raw-mode serial device.
pub(crate) struct SerialStream {
    file: File,
    path: PathBuf,
    read_timeout: Cell<Option<Duration>>,
    write_timeout: Cell<Option<Duration>>,
}

impl SerialStream {
    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeout.set(timeout);
    }

    pub(crate) fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.write_timeout.set(timeout);
    }

    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            read_timeout: Cell::new(self.read_timeout.get()),
            write_timeout: Cell::new(self.write_timeout.get()),
        })
    }

    /// Split into reader and writer halves driven by the tokio reactor.
    ///
    /// The descriptor is switched to non-blocking mode, so pending reads can
    /// be cancelled and never tie up a blocking-pool thread.
    #[cfg(feature = "async")]
    pub(crate) fn into_async_halves(self) -> io::Result<(AsyncSerial, AsyncSerial)> {
        let reader = self.file.try_clone()?;
        set_nonblocking(&self.file)?;
        Ok((AsyncSerial::new(reader)?, AsyncSerial::new(self.file)?))
    }

    fn wait_ready(&self, events: libc::c_short, timeout: Option<Duration>) -> io::Result<()> {
        let Some(timeout) = timeout else {
            return Ok(());
        };

        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a single valid pollfd and the count passed is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        match rc {
            -1 => Err(io::Error::last_os_error()),
            0 => {
                debug!(path = ?self.path, ?timeout, "serial poll timed out");
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "serial operation timed out",
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait_ready(libc::POLLIN, self.read_timeout.get())?;
        self.file.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wait_ready(libc::POLLOUT, self.write_timeout.get())?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// One half of a serial device registered with the tokio reactor.
#[cfg(feature = "async")]
pub(crate) struct AsyncSerial {
    inner: tokio::io::unix::AsyncFd<File>,
}

#[cfg(feature = "async")]
impl AsyncSerial {
    fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            inner: tokio::io::unix::AsyncFd::new(file)?,
        })
    }
}

#[cfg(feature = "async")]
impl tokio::io::AsyncRead for AsyncSerial {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        loop {
            let mut guard = std::task::ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| {
                let mut file = fd.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return std::task::Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return std::task::Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(feature = "async")]
impl tokio::io::AsyncWrite for AsyncSerial {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        loop {
            let mut guard = std::task::ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|fd| {
                let mut file = fd.get_ref();
                file.write(buf)
            }) {
                Ok(result) => return std::task::Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

#[cfg(feature = "async")]
fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fcntl on a descriptor owned by `file`; only the status flags change.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        1_200 => libc::B1200,
        2_400 => libc::B2400,
        4_800 => libc::B4800,
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaud(other)),
    };
    Ok(speed)
}

fn configure_raw(file: &File, speed: libc::speed_t) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is plain data; tcgetattr fully initialises it on success.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor owned by `file`, `tio` is writable.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialised by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !(libc::CSTOPB | libc::PARENB | libc::CRTSCTS);
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is a valid termios; speed comes from the libc B* table.
    unsafe {
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcflush(fd, libc::TCIOFLUSH) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
