use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected link: serial device or loopback socket.
///
/// Implements `Read + Write`; the framing layer never needs to know which
/// physical transport is underneath.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    #[cfg(unix)]
    Serial(crate::serial::SerialStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl LinkStream {
    #[cfg(unix)]
    pub(crate) fn from_serial(port: crate::serial::SerialStream) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Short transport name for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(_) => "serial",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
        }
    }

    /// Set the read timeout. `None` blocks until data arrives.
    ///
    /// An expired timeout surfaces as `ErrorKind::TimedOut` or
    /// `ErrorKind::WouldBlock` from `read`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => {
                port.set_read_timeout(timeout);
                Ok(())
            }
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set the write timeout. `None` blocks until the bytes are accepted.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => {
                port.set_write_timeout(timeout);
                Ok(())
            }
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Duplicate the underlying descriptor so reads and writes can live on
    /// different threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Read half of a link converted for use on a tokio runtime.
#[cfg(feature = "async")]
pub type AsyncLinkReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Write half of a link converted for use on a tokio runtime.
#[cfg(feature = "async")]
pub type AsyncLinkWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

#[cfg(feature = "async")]
impl LinkStream {
    /// Split the link into independently owned async halves.
    ///
    /// Must be called from within a tokio runtime. Both serial devices and
    /// sockets are made non-blocking and registered with the reactor.
    pub fn into_async_split(self) -> Result<(AsyncLinkReader, AsyncLinkWriter)> {
        match self.inner {
            #[cfg(unix)]
            LinkStreamInner::Serial(port) => {
                let (reader, writer) = port.into_async_halves()?;
                Ok((Box::new(reader), Box::new(writer)))
            }
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => {
                stream.set_nonblocking(true)?;
                let stream = tokio::net::UnixStream::from_std(stream)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }
}
