use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use log::*;

use super::{Transport, TransportError};


/// The largest datagram that gets read in one go. Anything longer than this
/// gets cut off by the OS.
pub const MAX_DATAGRAM_SIZE: usize = 4096;


/// The **UDP transport**, which reads datagrams off of a socket that is
/// shared with every other UDP worker.
///
/// Each datagram is received whole, so workers never see each other’s
/// queries; all each one needs is its own buffer and a note of who sent the
/// last query, so the response goes back to them.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: Option<SocketAddr>,
}

impl UdpTransport {

    /// Binds the socket that all the UDP transports will share to the given
    /// port on every interface.
    pub fn bind(port: u16) -> Result<Arc<UdpSocket>, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        info!("Bound UDP socket to {}", socket.local_addr()?);
        Ok(Arc::new(socket))
    }

    /// Creates a new UDP transport that uses the given shared socket.
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket, peer: None }
    }
}


impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "UDP"
    }

    fn buffer_size(&self) -> usize {
        MAX_DATAGRAM_SIZE
    }

    fn setup(&mut self) -> Result<(), TransportError> {
        debug!("UDP needs no setup");
        Ok(())
    }

    fn read_query(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let (len, peer) = self.socket.recv_from(buf)?;
        info!("Received {} bytes of data from {}", len, peer);

        self.peer = Some(peer);
        Ok(len)
    }

    fn send_response(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let peer = self.peer.ok_or(TransportError::NoPeer)?;

        let len = self.socket.send_to(bytes, peer)?;
        debug!("Sent {} bytes to {}", len, peer);
        Ok(len)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn echo() {
        let socket = UdpTransport::bind(0).unwrap();
        let port = socket.local_addr().unwrap().port();
        let mut transport = UdpTransport::new(socket);

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        client.send_to(b"query", (Ipv4Addr::LOCALHOST, port)).unwrap();

        let mut buf = vec![0; transport.buffer_size()];
        let len = transport.read_query(&mut buf).unwrap();
        assert_eq!(&buf[.. len], b"query");

        transport.send_response(b"response").unwrap();

        let mut reply = [0; 16];
        let (len, _) = client.recv_from(&mut reply).unwrap();
        assert_eq!(&reply[.. len], b"response");
    }

    #[test]
    fn respond_before_reading() {
        let socket = UdpTransport::bind(0).unwrap();
        let mut transport = UdpTransport::new(socket);

        assert!(matches!(transport.send_response(b"response"), Err(TransportError::NoPeer)));
    }
}
