use std::fmt;
use std::io;


/// Something that can go wrong reading a query or sending a response.
#[derive(Debug)]  // can't be PartialEq due to io::Error
pub enum TransportError {

    /// There was a problem with the network, with the underlying OS error.
    NetworkError(io::Error),

    /// A read returned no bytes at all.
    EmptyRead,

    /// The peer closed its connection.
    ConnectionClosed,

    /// The peer went quiet for longer than the idle timeout, so its
    /// connection was dropped.
    IdleTimeout,

    /// A message of this many bytes would not fit in the buffer or in the
    /// length prefix.
    MessageTooLong(usize),

    /// There is nobody to send a response to, because nothing has been read
    /// yet.
    NoPeer,
}


// From impls

impl From<io::Error> for TransportError {
    fn from(inner: io::Error) -> Self {
        Self::NetworkError(inner)
    }
}


impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError(ioe)     => write!(f, "Network error: {}", ioe),
            Self::EmptyRead             => write!(f, "Read 0 bytes"),
            Self::ConnectionClosed      => write!(f, "Connection closed by peer"),
            Self::IdleTimeout           => write!(f, "Connection timed out"),
            Self::MessageTooLong(len)   => write!(f, "Message of {} bytes is too long", len),
            Self::NoPeer                => write!(f, "No peer to respond to"),
        }
    }
}
