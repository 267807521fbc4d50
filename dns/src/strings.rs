//! Reading and writing domain names in the DNS wire protocol.

use std::io::Write;

use log::*;
use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::wire::*;


/// The longest a domain name may be once encoded, counting every length
/// byte and the terminating zero-length label.
pub const MAX_NAME_LENGTH: usize = 255;

/// The longest a single label may be. The two bits above this are
/// reserved for compression pointers, which are not supported.
pub const MAX_LABEL_LENGTH: usize = 63;


/// An extension for `Cursor` that enables reading domain names from DNS
/// messages.
pub(crate) trait ReadLabels {

    /// Read an uncompressed domain name, returning it in dotted notation.
    fn read_labels(&mut self) -> Result<String, DecodeError>;
}

impl ReadLabels for Cursor<&[u8]> {
    fn read_labels(&mut self) -> Result<String, DecodeError> {
        let mut name = String::new();
        let mut encoded_length = 0_usize;

        loop {
            let byte = self.read_u8()?;
            encoded_length += 1;

            if byte == 0 {
                break;
            }

            if byte & 0b_1100_0000 != 0 {
                warn!("Refusing label length byte {:#04x}", byte);
                return Err(DecodeError::CompressedLabel(byte));
            }

            let remaining = remaining_bytes(self);
            if usize::from(byte) > remaining {
                return Err(DecodeError::LabelOverrun { stated_length: byte, remaining });
            }

            // The terminating zero byte still has to follow this label, so a
            // name that has reached the limit already is too long.
            encoded_length += usize::from(byte);
            if encoded_length >= MAX_NAME_LENGTH {
                return Err(DecodeError::NameTooLong);
            }

            let mut label = vec![0; usize::from(byte)];
            self.read_exact(&mut label)?;

            // A dot would be read back as a label boundary.
            if label.contains(&b'.') {
                warn!("Refusing label with a dot in it -> {:?}", label);
                return Err(DecodeError::DotInLabel);
            }

            let label = std::str::from_utf8(&label).map_err(|_| DecodeError::NonUtf8Label)?;
            if ! name.is_empty() {
                name.push('.');
            }
            name.push_str(label);
        }

        trace!("Read name -> {:?} ({} bytes encoded)", name, encoded_length);
        Ok(name)
    }
}

fn remaining_bytes(c: &Cursor<&[u8]>) -> usize {
    let position = usize::try_from(c.position()).unwrap_or(usize::MAX);
    c.get_ref().len().saturating_sub(position)
}


/// An extension for `Write` that enables writing domain names.
pub(crate) trait WriteLabels {

    /// Write a domain name.
    ///
    /// The names are written with one byte slice per domain segment,
    /// preceded by each segment’s length, with the whole thing ending with
    /// a segment of zero length.
    ///
    /// So “dns.lookup.dog” would be encoded as:
    /// “3, dns, 6, lookup, 3, dog, 0”.
    fn write_labels(&mut self, input: &str) -> Result<(), SerializationError>;
}

impl<W: Write> WriteLabels for W {
    fn write_labels(&mut self, input: &str) -> Result<(), SerializationError> {
        let input = input.strip_suffix('.').unwrap_or(input);
        check_name(input)?;

        if ! input.is_empty() {
            for label in input.split('.') {
                self.write_u8(label.len() as u8)?;
                self.write_all(label.as_bytes())?;
            }
        }

        self.write_u8(0)?;  // terminate the string
        Ok(())
    }
}

/// Checks that every label of the name fits in its length byte, and that
/// the whole name fits within the encoded length limit.
fn check_name(input: &str) -> Result<(), SerializationError> {
    if input.is_empty() {
        return Ok(());
    }

    let mut encoded_length = 1;  // the terminator
    for label in input.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
            return Err(SerializationError::InvalidLabel(label.into()));
        }

        encoded_length += 1 + label.len();
    }

    if encoded_length > MAX_NAME_LENGTH {
        return Err(SerializationError::NameTooLong(input.into()));
    }

    Ok(())
}
