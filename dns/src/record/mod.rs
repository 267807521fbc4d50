//! The DNS record types this server understands, and how to read and
//! write each of them.


mod a;
pub use self::a::A;


/// The data held by a resource record.
#[derive(PartialEq, Debug, Clone)]
pub enum Record {

    /// An **A** record.
    A(A),

    /// A record with a type that we don’t serve. These only turn up when
    /// reading responses back in, and are kept as the raw bytes.
    Other {

        /// The number that’s meant to represent the record type.
        type_number: u16,

        /// The undecodable bytes that were in this record.
        bytes: Vec<u8>,
    },
}

impl Record {

    /// The type of this record.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_)                       => RecordType::A,
            Self::Other { type_number, .. }  => RecordType::from(*type_number),
        }
    }
}


/// The type of a record, or the type being asked for in a question.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum RecordType {

    /// An **A** record type.
    A,

    /// Any other record type, by number.
    Other(u16),
}

impl RecordType {

    /// The number that represents this type on the wire.
    pub fn type_number(self) -> u16 {
        match self {
            Self::A          => <A as crate::Wire>::RR_TYPE,
            Self::Other(n)   => n,
        }
    }
}

impl From<u16> for RecordType {
    fn from(type_number: u16) -> Self {
        if type_number == <A as crate::Wire>::RR_TYPE {
            Self::A
        }
        else {
            Self::Other(type_number)
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_numbers() {
        assert_eq!(RecordType::from(1), RecordType::A);
        assert_eq!(RecordType::from(28), RecordType::Other(28));
        assert_eq!(RecordType::Other(28).type_number(), 28);
    }

    #[test]
    fn other_record_keeps_its_type() {
        let record = Record::Other { type_number: 16, bytes: vec![ 0x00 ] };
        assert_eq!(record.record_type(), RecordType::Other(16));
    }
}
