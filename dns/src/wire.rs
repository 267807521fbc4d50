//! Parsing and building the DNS wire protocol.

pub(crate) use std::io::{Cursor, Read};
pub(crate) use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::fmt;
use std::io;
use log::*;

use crate::record::{Record, RecordType, A};
use crate::strings::{ReadLabels, WriteLabels};
use crate::types::*;


/// The length of the fixed header at the start of every message.
pub const HEADER_LENGTH: usize = 12;


impl Message {

    /// Reads a query sent by a client off of the given slice.
    ///
    /// Only simple forward queries from stub resolvers are accepted: a
    /// message that is a response, has an opcode other than `QUERY`, or has
    /// the authoritative, truncated, or recursion-available bits set is
    /// rejected. Any sections after the questions are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        info!("Parsing query");
        trace!("Bytes -> {:?}", bytes);
        let mut c = Cursor::new(bytes);

        let (transaction_id, mut flags, counts) = read_header(&mut c)?;

        if flags.response {
            return Err(DecodeError::ResponseFlag);
        }

        if let Opcode::Other(opcode) = flags.opcode {
            return Err(DecodeError::UnsupportedOpcode(opcode));
        }

        if flags.authoritative {
            return Err(DecodeError::AuthoritativeFlag);
        }

        if flags.truncated {
            return Err(DecodeError::TruncatedFlag);
        }

        if flags.recursion_available {
            return Err(DecodeError::RecursionAvailableFlag);
        }

        if let Some(error_code) = flags.error_code.take() {
            debug!("Ignoring error code {:?} in query", error_code);
        }

        let questions = read_questions(&mut c, counts.questions)?;

        if counts.answers > 0 || counts.authorities > 0 || counts.additionals > 0 {
            debug!("Ignoring {} answer, {} authority, and {} additional records in query",
                   counts.answers, counts.authorities, counts.additionals);
        }

        Ok(Self { transaction_id, flags, questions, answers: Vec::new() })
    }

    /// Reads a response off of the given slice, including its answers.
    ///
    /// This performs none of the checks that `from_bytes` does on the flags,
    /// so it can read back what `to_bytes` writes. Authority and additional
    /// records are stepped over without being kept.
    pub fn from_response_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        info!("Parsing response");
        trace!("Bytes -> {:?}", bytes);
        let mut c = Cursor::new(bytes);

        let (transaction_id, flags, counts) = read_header(&mut c)?;
        let questions = read_questions(&mut c, counts.questions)?;

        // The count fields come from the other end of the connection, so
        // cap the pre-allocation in case one of them is absurdly large.
        let mut answers = Vec::with_capacity(usize::from(counts.answers.min(9)));
        debug!("Reading {}x answer from response", counts.answers);
        for _ in 0 .. counts.answers {
            let name = c.read_labels()?;
            answers.push(ResourceRecord::from_bytes(name, &mut c)?);
        }

        let skipped = u32::from(counts.authorities) + u32::from(counts.additionals);
        debug!("Skipping {}x authority and additional records", skipped);
        for _ in 0 .. skipped {
            skip_record(&mut c)?;
        }

        Ok(Self { transaction_id, flags, questions, answers })
    }

    /// Converts this message to a vector of bytes.
    ///
    /// Names are never compressed, and the authority and additional counts
    /// are always zero.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        let mut bytes = Vec::with_capacity(HEADER_LENGTH + 32);

        bytes.write_u16::<BigEndian>(self.transaction_id)?;
        bytes.write_u16::<BigEndian>(self.flags.to_u16())?;

        bytes.write_u16::<BigEndian>(section_count(self.questions.len())?)?;
        bytes.write_u16::<BigEndian>(section_count(self.answers.len())?)?;
        bytes.write_u16::<BigEndian>(0)?;  // authority RR count
        bytes.write_u16::<BigEndian>(0)?;  // additional RR count

        for question in &self.questions {
            bytes.write_labels(&question.qname)?;
            bytes.write_u16::<BigEndian>(question.qtype.type_number())?;
            bytes.write_u16::<BigEndian>(question.qclass.to_u16())?;
        }

        for answer in &self.answers {
            answer.write_to(&mut bytes)?;
        }

        trace!("Built {} bytes -> {:?}", bytes.len(), bytes);
        Ok(bytes)
    }
}


/// Returns the transaction ID at the start of the given bytes, if there are
/// enough of them to hold one. This is used to address an error response to
/// a message that could not be read.
pub fn peek_transaction_id(bytes: &[u8]) -> Option<u16> {
    Cursor::new(bytes).read_u16::<BigEndian>().ok()
}


/// The four count fields of a message header.
struct Counts {
    questions: u16,
    answers: u16,
    authorities: u16,
    additionals: u16,
}

fn read_header(c: &mut Cursor<&[u8]>) -> Result<(u16, Flags, Counts), DecodeError> {
    let length = c.get_ref().len();
    if length < HEADER_LENGTH {
        return Err(DecodeError::HeaderTooShort(length));
    }

    let transaction_id = c.read_u16::<BigEndian>()?;
    trace!("Read txid -> {:?}", transaction_id);

    let flags = Flags::from_u16(c.read_u16::<BigEndian>()?);
    trace!("Read flags -> {:#?}", flags);

    let counts = Counts {
        questions:    c.read_u16::<BigEndian>()?,
        answers:      c.read_u16::<BigEndian>()?,
        authorities:  c.read_u16::<BigEndian>()?,
        additionals:  c.read_u16::<BigEndian>()?,
    };

    Ok((transaction_id, flags, counts))
}

/// Reads the given number of questions, each one starting where the last
/// one finished.
fn read_questions(c: &mut Cursor<&[u8]>, count: u16) -> Result<Vec<Question>, DecodeError> {
    let mut questions = Vec::with_capacity(usize::from(count.min(9)));
    debug!("Reading {}x question", count);

    for _ in 0 .. count {
        let qname = c.read_labels()?;
        questions.push(Question::from_bytes(qname, c)?);
    }

    Ok(questions)
}

/// Moves the cursor past one resource record without keeping it.
fn skip_record(c: &mut Cursor<&[u8]>) -> Result<(), DecodeError> {
    let _name = c.read_labels()?;
    let _type_number = c.read_u16::<BigEndian>()?;
    let _class = c.read_u16::<BigEndian>()?;
    let _ttl = c.read_u32::<BigEndian>()?;
    let record_length = c.read_u16::<BigEndian>()?;

    let mut skipped = vec![0; usize::from(record_length)];
    c.read_exact(&mut skipped)?;
    Ok(())
}

fn section_count(length: usize) -> Result<u16, SerializationError> {
    u16::try_from(length).map_err(|_| SerializationError::TooManyRecords(length))
}


impl Question {

    /// Reads bytes from the given cursor, and parses them into a question
    /// with the given domain name.
    fn from_bytes(qname: String, c: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let qtype_number = c.read_u16::<BigEndian>()?;
        trace!("Read qtype number -> {:?}", qtype_number);

        let qtype = RecordType::from(qtype_number);
        trace!("Found qtype -> {:?}", qtype);

        let qclass = QClass::from_u16(c.read_u16::<BigEndian>()?);
        trace!("Read qclass -> {:?}", qclass);

        Ok(Self { qname, qtype, qclass })
    }
}


impl ResourceRecord {

    /// Reads bytes from the given cursor, and parses them into a record with
    /// the given domain name.
    fn from_bytes(name: String, c: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let record_type = RecordType::from(c.read_u16::<BigEndian>()?);
        trace!("Found record type -> {:?}", record_type);

        let qclass = QClass::from_u16(c.read_u16::<BigEndian>()?);
        trace!("Read qclass -> {:?}", qclass);

        let ttl = c.read_u32::<BigEndian>()?;
        trace!("Read TTL -> {:?}", ttl);

        let record_length = c.read_u16::<BigEndian>()?;
        trace!("Read record length -> {:?}", record_length);

        let record = Record::from_bytes(record_type, record_length, c)?;
        Ok(Self { name, qclass, ttl, record })
    }

    /// Writes this record to the end of the given buffer.
    fn write_to(&self, bytes: &mut Vec<u8>) -> Result<(), SerializationError> {
        let data = self.record.to_bytes();
        let record_length = u16::try_from(data.len())
            .map_err(|_| SerializationError::RecordTooLong(data.len()))?;

        bytes.write_labels(&self.name)?;
        bytes.write_u16::<BigEndian>(self.record.record_type().type_number())?;
        bytes.write_u16::<BigEndian>(self.qclass.to_u16())?;
        bytes.write_u32::<BigEndian>(self.ttl)?;
        bytes.write_u16::<BigEndian>(record_length)?;
        bytes.extend(data);
        Ok(())
    }
}


impl Record {

    /// Reads at most `len` bytes from the given cursor, and parses them into
    /// a record structure depending on the type number, which has already
    /// been read.
    fn from_bytes(record_type: RecordType, len: u16, c: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        match record_type {
            RecordType::A => {
                info!("Parsing {} record (type {}, len {})", A::NAME, A::RR_TYPE, len);
                A::read(len, c).map(Self::A)
            }

            RecordType::Other(type_number) => {
                let mut bytes = vec![0; usize::from(len)];
                c.read_exact(&mut bytes)?;
                Ok(Self::Other { type_number, bytes })
            }
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::A(a)                 => a.to_bytes(),
            Self::Other { bytes, .. }  => bytes.clone(),
        }
    }
}


impl QClass {
    fn from_u16(uu: u16) -> Self {
        match uu {
            0x0001 => Self::IN,
            0x0003 => Self::CH,
            0x0004 => Self::HS,
                 _ => Self::Other(uu),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::IN        => 0x0001,
            Self::CH        => 0x0003,
            Self::HS        => 0x0004,
            Self::Other(uu) => uu,
        }
    }
}


impl Flags {

    /// The set of flags that represents a query packet.
    pub fn query() -> Self {
        Self::from_u16(0b_0000_0001_0000_0000)
    }

    /// The set of flags that represents a successful response. This server
    /// never recurses, so recursion is not marked as available.
    pub fn standard_response() -> Self {
        Self::from_u16(0b_1000_0000_0000_0000)
    }

    /// Converts the flags into a two-byte number.
    pub fn to_u16(self) -> u16 {                 // 0123 4567 89AB CDEF
        let mut                          bits  = 0b_0000_0000_0000_0000;
        if self.response               { bits |= 0b_1000_0000_0000_0000; }
        match self.opcode {
            Opcode::Query     =>       { bits |= 0b_0000_0000_0000_0000; }
            Opcode::Other(n)  =>       { bits |= u16::from(n & 0b_1111) << 11; }
        }
        if self.authoritative          { bits |= 0b_0000_0100_0000_0000; }
        if self.truncated              { bits |= 0b_0000_0010_0000_0000; }
        if self.recursion_desired      { bits |= 0b_0000_0001_0000_0000; }
        if self.recursion_available    { bits |= 0b_0000_0000_1000_0000; }
        bits |= u16::from(self.reserved & 0b_0111) << 4;
        if let Some(error_code) = self.error_code {
            bits |= u16::from(error_code.to_bits());
        }

        bits
    }

    /// Extracts the flags from the given two-byte number.
    pub fn from_u16(bits: u16) -> Self {
        let has_bit = |bit| { bits & bit == bit };
        let [high, low] = bits.to_be_bytes();

        Self {
            response:               has_bit(0b_1000_0000_0000_0000),
            opcode:                 Opcode::from_bits((high & 0b_0111_1000) >> 3),
            authoritative:          has_bit(0b_0000_0100_0000_0000),
            truncated:              has_bit(0b_0000_0010_0000_0000),
            recursion_desired:      has_bit(0b_0000_0001_0000_0000),
            recursion_available:    has_bit(0b_0000_0000_1000_0000),
            reserved:               (low & 0b_0111_0000) >> 4,
            error_code:             ErrorCode::from_bits(low & 0b_1111),
        }
    }
}


impl Opcode {

    /// Extracts the opcode from this four-bit number, which should have been
    /// extracted from the packet and shifted to be in the range 0–15.
    fn from_bits(bits: u8) -> Self {
        if bits == 0 {
            Self::Query
        }
        else {
            Self::Other(bits)
        }
    }
}


impl ErrorCode {

    /// Extracts the rcode from the last four bits of the flags field.
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => None,
            1 => Some(Self::FormatError),
            2 => Some(Self::ServerFailure),
            3 => Some(Self::NameError),
            4 => Some(Self::NotImplemented),
            5 => Some(Self::QueryRefused),
            n => Some(Self::Other(n)),
        }
    }

    /// Converts the error code to the four bits that hold it.
    pub fn to_bits(self) -> u8 {
        match self {
            Self::FormatError     => 1,
            Self::ServerFailure   => 2,
            Self::NameError       => 3,
            Self::NotImplemented  => 4,
            Self::QueryRefused    => 5,
            Self::Other(n)        => n & 0b_1111,
        }
    }
}


/// Trait for DNS record structures that are sent and received over the wire.
pub trait Wire: Sized {

    /// This record’s type as a string, such as `"A"`.
    const NAME: &'static str;

    /// The number signifying that a record is of this type.
    /// See <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4>
    const RR_TYPE: u16;

    /// Read exactly `len` bytes from the given `Cursor`, which holds the
    /// whole message.
    fn read(len: u16, c: &mut Cursor<&[u8]>) -> Result<Self, DecodeError>;

    /// The bytes of this record’s data section, without the length.
    fn to_bytes(&self) -> Vec<u8>;
}


/// Something that can go wrong reading a message.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum DecodeError {

    /// There was an IO error reading from the cursor.
    /// Almost all the time, this means that the buffer was too short.
    IO,
    // (io::Error is not PartialEq so we don’t propagate it)

    /// The buffer was too short to even hold the header, and was this long.
    HeaderTooShort(usize),

    /// A client sent a message with the response bit set.
    ResponseFlag,

    /// The message asked for an operation other than a standard query.
    UnsupportedOpcode(u8),

    /// A client sent a message with the authoritative bit set.
    AuthoritativeFlag,

    /// A client sent a message with the truncated bit set.
    TruncatedFlag,

    /// A client sent a message with the recursion-available bit set.
    RecursionAvailableFlag,

    /// A label length byte had one of its top two bits set. These are
    /// compression pointers or extended label types, neither of which are
    /// supported. Contains the offending byte.
    CompressedLabel(u8),

    /// A domain name was longer than 255 bytes once encoded.
    NameTooLong,

    /// A label claimed to be longer than the rest of the buffer.
    LabelOverrun {

        /// The length of the label, as specified in the packet.
        stated_length: u8,

        /// The number of bytes that were actually left.
        remaining: usize,
    },

    /// A label contained a `.` byte, which would read back as two labels.
    DotInLabel,

    /// A label was not valid UTF-8.
    NonUtf8Label,

    /// When the DNS standard requires records of this type to have a certain
    /// fixed length, but the message specified a different length.
    WrongRecordLength {

        /// The length of the record’s data, as specified in the packet.
        stated_length: u16,

        /// The length of the record that the DNS specification mandates.
        mandated_length: u16,
    },
}

impl DecodeError {

    /// The error code to send back to a client whose message could not be
    /// read for this reason.
    pub fn error_code(self) -> ErrorCode {
        match self {
            Self::UnsupportedOpcode(_)  => ErrorCode::NotImplemented,
            _                           => ErrorCode::FormatError,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(ioe: io::Error) -> Self {
        debug!("IO error -> {:?}", ioe);
        Self::IO
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO                      => write!(f, "Message ended unexpectedly"),
            Self::HeaderTooShort(len)     => write!(f, "Message of {} bytes is too short to hold a header", len),
            Self::ResponseFlag            => write!(f, "Client sent a response"),
            Self::UnsupportedOpcode(op)   => write!(f, "Opcode {} is not supported", op),
            Self::AuthoritativeFlag       => write!(f, "Client set the authoritative flag"),
            Self::TruncatedFlag           => write!(f, "Client sent a truncated message"),
            Self::RecursionAvailableFlag  => write!(f, "Client set the recursion-available flag"),
            Self::CompressedLabel(byte)   => write!(f, "Unsupported label type {:#04x}", byte),
            Self::NameTooLong             => write!(f, "Domain name too long"),
            Self::LabelOverrun { stated_length, remaining } => {
                write!(f, "Label of {} bytes with only {} bytes left", stated_length, remaining)
            }
            Self::DotInLabel              => write!(f, "Label contains a dot"),
            Self::NonUtf8Label            => write!(f, "Label is not valid UTF-8"),
            Self::WrongRecordLength { stated_length, mandated_length } => {
                write!(f, "Record length {} should be {}", stated_length, mandated_length)
            }
        }
    }
}


/// Something that can go wrong building a message.
#[derive(PartialEq, Debug, Clone)]
pub enum SerializationError {

    /// Writing to the buffer failed.
    IO,

    /// This name would be longer than 255 bytes once encoded.
    NameTooLong(String),

    /// This label is either empty or longer than 63 bytes.
    InvalidLabel(String),

    /// A record’s data was this many bytes, more than its length field holds.
    RecordTooLong(usize),

    /// A section had this many entries, more than its count field holds.
    TooManyRecords(usize),
}

impl From<io::Error> for SerializationError {
    fn from(ioe: io::Error) -> Self {
        error!("IO error -> {:?}", ioe);
        Self::IO
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO                   => write!(f, "Could not write to buffer"),
            Self::NameTooLong(name)    => write!(f, "Domain name {:?} is too long", name),
            Self::InvalidLabel(label)  => write!(f, "Invalid label {:?}", label),
            Self::RecordTooLong(len)   => write!(f, "Record data of {} bytes is too long", len),
            Self::TooManyRecords(len)  => write!(f, "Section of {} records is too long", len),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flags_round_trip() {
        for bits in &[ 0x0100_u16, 0x8000, 0x8183, 0x8584, 0x7870, 0x0005 ] {
            assert_eq!(Flags::from_u16(*bits).to_u16(), *bits);
        }
    }

    #[test]
    fn reserved_bits() {
        let flags = Flags::from_u16(0b_0000_0000_0101_0000);
        assert_eq!(flags.reserved, 0b_101);
        assert_eq!(flags.error_code, None);
    }

    #[test]
    fn opcode_bits() {
        let flags = Flags::from_u16(0b_0001_0000_0000_0000);
        assert_eq!(flags.opcode, Opcode::Other(2));
    }

    #[test]
    fn error_codes() {
        assert_eq!(ErrorCode::from_bits(3), Some(ErrorCode::NameError));
        assert_eq!(ErrorCode::NotImplemented.to_bits(), 4);
        assert_eq!(ErrorCode::from_bits(0), None);
    }

    #[test]
    fn decode_error_codes() {
        assert_eq!(DecodeError::UnsupportedOpcode(2).error_code(), ErrorCode::NotImplemented);
        assert_eq!(DecodeError::ResponseFlag.error_code(), ErrorCode::FormatError);
        assert_eq!(DecodeError::HeaderTooShort(3).error_code(), ErrorCode::FormatError);
    }

    #[test]
    fn peeks_transaction_id() {
        assert_eq!(peek_transaction_id(&[ 0xab, 0xcd, 0x01 ]), Some(0xabcd));
        assert_eq!(peek_transaction_id(&[ 0xab ]), None);
    }

    #[test]
    fn record_too_long() {
        let message = Message {
            transaction_id: 1,
            flags: Flags::standard_response(),
            questions: vec![],
            answers: vec![
                ResourceRecord {
                    name: "big.example".into(),
                    qclass: QClass::IN,
                    ttl: 0,
                    record: Record::Other { type_number: 99, bytes: vec![ 0; 70_000 ] },
                },
            ],
        };

        assert_eq!(message.to_bytes(), Err(SerializationError::RecordTooLong(70_000)));
    }
}
