use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::*;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use super::{Transport, TransportError};


/// How many connections the OS holds on to before one of the workers gets
/// round to accepting them.
const LISTEN_BACKLOG: i32 = 128;


/// The **TCP transport**, which accepts one connection from the shared
/// listening socket and then owns it until the peer goes away.
///
/// Every message on the connection is preceded by its length as a two-byte
/// number, so the reader knows where one ends and the next begins.
///
/// # Reference
///
/// - [RFC 1035 §4.2.2](https://tools.ietf.org/html/rfc1035) — Domain Names, Implementation and Specification (November 1987)
/// - [RFC 7766](https://tools.ietf.org/html/rfc7766) — DNS Transport over TCP, Implementation Requirements (March 2016)
#[derive(Debug)]
pub struct TcpTransport {
    listener: Arc<TcpListener>,
    accept_lock: Arc<Mutex<()>>,
    idle_timeout: Option<Duration>,
    connection: Option<(TcpStream, SocketAddr)>,
}

impl TcpTransport {

    /// Binds and listens on the socket that all the TCP transports will
    /// share, on the given port on every interface. The address is marked
    /// as reusable so the server can be restarted straight away.
    pub fn listen(port: u16) -> Result<Arc<TcpListener>, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let listener: TcpListener = socket.into();
        info!("Listening for TCP connections on {}", listener.local_addr()?);
        Ok(Arc::new(listener))
    }

    /// Creates a new TCP transport that accepts from the given shared
    /// listener, holding the given lock while it does so. An idle timeout of
    /// zero means connections are never timed out.
    pub fn new(listener: Arc<TcpListener>, accept_lock: Arc<Mutex<()>>, idle_timeout: Duration) -> Self {
        let idle_timeout = if idle_timeout.is_zero() { None } else { Some(idle_timeout) };
        Self { listener, accept_lock, idle_timeout, connection: None }
    }

    /// Whether this transport currently owns a connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn accept(&mut self) -> Result<(), TransportError> {
        let (stream, peer) = {
            let _guard = self.accept_lock.lock();
            debug!("Waiting to accept a connection");
            self.listener.accept()?
        };

        info!("Accepted connection from {}", peer);
        stream.set_read_timeout(self.idle_timeout)?;
        self.connection = Some((stream, peer));
        Ok(())
    }

    /// Drops the current connection, turning the error that ended it into
    /// the one to report.
    fn disconnect(&mut self, ioe: io::Error) -> TransportError {
        let peer = self.connection.take().map(|(_, peer)| peer);

        let error = match ioe.kind() {
            io::ErrorKind::UnexpectedEof  => TransportError::ConnectionClosed,
            io::ErrorKind::WouldBlock |
            io::ErrorKind::TimedOut       => TransportError::IdleTimeout,
            _                             => TransportError::NetworkError(ioe),
        };

        if let Some(peer) = peer {
            debug!("Dropping connection from {} ({})", peer, error);
        }

        error
    }
}


impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "TCP"
    }

    fn buffer_size(&self) -> usize {
        usize::from(u16::MAX)
    }

    fn setup(&mut self) -> Result<(), TransportError> {
        if self.connection.is_none() {
            self.accept()?;
        }

        Ok(())
    }

    fn read_query(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.setup()?;
        let result = match &mut self.connection {
            Some((stream, _)) => read_frame(stream, buf),
            None              => return Err(TransportError::NoPeer),
        };

        match result {
            Ok(len) => {
                info!("Received {} bytes of data", len);
                Ok(len)
            }
            Err(FrameError::TooLong(len)) => {
                // The rest of the message is still sitting in the stream,
                // so there’s no way to find where the next one starts.
                self.connection = None;
                Err(TransportError::MessageTooLong(len))
            }
            Err(FrameError::IO(ioe)) => {
                Err(self.disconnect(ioe))
            }
        }
    }

    fn send_response(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| TransportError::MessageTooLong(bytes.len()))?;

        // The message is prepended with the length when sent over TCP,
        // so the client knows how long it is (RFC 1035 §4.2.2)
        let mut framed = Vec::with_capacity(bytes.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(bytes);

        let result = match &mut self.connection {
            Some((stream, peer)) => stream.write_all(&framed).map(|()| *peer),
            None                 => return Err(TransportError::NoPeer),
        };

        match result {
            Ok(peer) => {
                debug!("Wrote {} bytes to {}", framed.len(), peer);
                Ok(bytes.len())
            }
            Err(ioe) => {
                Err(self.disconnect(ioe))
            }
        }
    }
}


enum FrameError {
    IO(io::Error),
    TooLong(usize),
}

/// Reads one length-prefixed message from the stream into the buffer.
fn read_frame(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, FrameError> {
    let mut len_bytes = [0; 2];
    stream.read_exact(&mut len_bytes).map_err(FrameError::IO)?;

    let len = usize::from(u16::from_be_bytes(len_bytes));
    if len > buf.len() {
        return Err(FrameError::TooLong(len));
    }

    stream.read_exact(&mut buf[.. len]).map_err(FrameError::IO)?;
    Ok(len)
}
