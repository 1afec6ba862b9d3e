use std::io::{self, BufReader};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::Result;
use crate::session::RtspTarget;

/// An open connection to a camera, split into independent halves.
///
/// The read half is buffered for the demultiplexer. A third handle,
/// [`control`](Self::control), lets another thread interrupt a blocked read.
pub struct Connection {
    pub reader: BufReader<TcpStream>,
    pub writer: TcpStream,
    control: TcpStream,
}

impl Connection {
    /// Resolve the target and connect, trying each address in turn.
    pub fn open(
        target: &RtspTarget,
        connect_timeout: Duration,
        io_timeout: Option<Duration>,
    ) -> Result<Self> {
        let addrs = (target.host.as_str(), target.port).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    tracing::debug!(%addr, "TCP connected");
                    return Self::from_stream(stream, io_timeout);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "TCP connect failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            })
            .into())
    }

    pub fn from_stream(stream: TcpStream, io_timeout: Option<Duration>) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;

        let reader = BufReader::new(stream.try_clone()?);
        let control = stream.try_clone()?;
        Ok(Self {
            reader,
            writer: stream,
            control,
        })
    }

    /// A handle that can interrupt this connection from another thread.
    pub fn interrupter(&self) -> Result<Interrupter> {
        Ok(Interrupter(self.control.try_clone()?))
    }
}

/// Cross-thread handle that unblocks a pending read on a [`Connection`].
///
/// Shutting down only the read direction makes the blocked read observe
/// end-of-stream while leaving the write half usable for a final TEARDOWN.
#[derive(Debug)]
pub struct Interrupter(TcpStream);

impl Interrupter {
    pub fn interrupt(&self) {
        if let Err(e) = self.0.shutdown(Shutdown::Read) {
            tracing::trace!(error = %e, "read shutdown on closed socket");
        }
    }

    pub fn close(&self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
