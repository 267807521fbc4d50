//! The server side of the DNS transports: reading queries off of a socket,
//! and writing responses back down it.

#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::wildcard_imports)]

#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(unsafe_code)]


mod udp;
pub use self::udp::UdpTransport;

mod tcp;
pub use self::tcp::TcpTransport;

mod error;
pub use self::error::TransportError;


/// The trait implemented by both transport types. A transport is owned by
/// exactly one worker, although the socket underneath it may be shared.
pub trait Transport {

    /// A short name for this transport, used in log messages.
    fn name(&self) -> &'static str;

    /// How large a buffer this transport needs to read a query into.
    fn buffer_size(&self) -> usize;

    /// Gets the transport ready to read its first query. For connection
    /// transports, this is where a connection gets accepted.
    fn setup(&mut self) -> Result<(), TransportError>;

    /// Blocks until one whole query has arrived, copies it into the buffer,
    /// and returns its length.
    fn read_query(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Sends a response back to wherever the last query came from, returning
    /// the number of bytes written.
    fn send_response(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;
}
