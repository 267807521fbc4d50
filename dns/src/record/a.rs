use std::net::Ipv4Addr;

use log::*;

use crate::wire::*;


/// An **A** record type, which contains an `Ipv4Address`.
///
/// # References
///
/// - [RFC 1035 §3.4.1](https://tools.ietf.org/html/rfc1035) — Domain Names,
///   Implementation and Specification (November 1987)
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct A {

    /// The IPv4 address contained in the packet.
    pub address: Ipv4Addr,
}

impl Wire for A {
    const NAME: &'static str = "A";
    const RR_TYPE: u16 = 1;

    fn read(stated_length: u16, c: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        if stated_length != 4 {
            warn!("Length is incorrect (record length {:?}, but should be four)", stated_length);
            return Err(DecodeError::WrongRecordLength { stated_length, mandated_length: 4 });
        }

        let mut buf = [0_u8; 4];
        c.read_exact(&mut buf)?;

        let address = Ipv4Addr::from(buf);
        trace!("Parsed IPv4 address -> {:?}", address);

        Ok(Self { address })
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.address.octets().to_vec()
    }
}
