//! A DNS message has the same layout whether it is a query or a response,
//! so both are modelled by the one `Message` type. A query has questions
//! and no answers; a response repeats the questions and carries the answers
//! (or an error code) that were found for them.

use crate::record::{Record, RecordType};


/// A DNS message, either received from a client or about to be sent to one.
///
/// Only the question and answer sections are modelled. The authority and
/// additional sections of incoming messages are skipped, and outgoing
/// messages never have any.
#[derive(PartialEq, Debug, Clone)]
pub struct Message {

    /// The transaction ID of this message. A response carries the ID of the
    /// query it answers, so clients can match the two up.
    pub transaction_id: u16,

    /// The flags that accompany every DNS message.
    pub flags: Flags,

    /// The questions section.
    pub questions: Vec<Question>,

    /// The answers section.
    pub answers: Vec<ResourceRecord>,
}


/// A DNS question section.
#[derive(PartialEq, Debug, Clone)]
pub struct Question {

    /// The domain name being queried, in dotted notation without the
    /// trailing dot.
    pub qname: String,

    /// The type number.
    pub qtype: RecordType,

    /// The class number.
    pub qclass: QClass,
}


/// A resource record in the answers section.
#[derive(PartialEq, Debug, Clone)]
pub struct ResourceRecord {

    /// The domain name being answered for.
    pub name: String,

    /// This record’s class.
    pub qclass: QClass,

    /// The time-to-live duration, in seconds.
    pub ttl: u32,

    /// The data contained in this record.
    pub record: Record,
}


/// A DNS record class. Of these, the only one that’s in regular use anymore
/// is the Internet class.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum QClass {

    /// The **Internet** class.
    IN,

    /// The **Chaosnet** class.
    CH,

    /// The **Hesiod** class.
    HS,

    /// A class number that does not map to any known class.
    Other(u16),
}


/// The flags that accompany every DNS message, stored in the two bytes
/// after the transaction ID.
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Flags {

    /// Whether this message is a response.
    pub response: bool,

    /// The operation being performed.
    pub opcode: Opcode,

    /// In a response, whether the server is providing authoritative DNS responses.
    pub authoritative: bool,

    /// In a response, whether this message has been truncated by the transport.
    pub truncated: bool,

    /// In a query, whether the server may query other nameservers recursively.
    pub recursion_desired: bool,

    /// In a response, whether the server allows recursive query support.
    pub recursion_available: bool,

    /// The three reserved bits between the recursion-available bit and the
    /// error code, right-aligned.
    pub reserved: u8,

    /// In a response, a code indicating an error if one occurred.
    pub error_code: Option<ErrorCode>,
}


/// A number representing the operation being performed.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Opcode {

    /// This request is a standard query, or this response is answering a
    /// standard query.
    Query,

    /// Any other opcode. This can be from 1 to 15, as the opcode field is
    /// four bits wide, and 0 is taken.
    Other(u8),
}


/// A code indicating an error.
///
/// # References
///
/// - [RFC 1035 §4.1.1](https://tools.ietf.org/html/rfc1035) — Domain Names,
///   Implementation and Specification (November 1987)
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum ErrorCode {

    /// `FormErr` — The server was unable to interpret the query.
    FormatError,

    /// `ServFail` — There was a problem with the server.
    ServerFailure,

    /// `NXDomain` — The domain name referenced in the query does not exist.
    NameError,

    /// `NotImp` — The server does not support one of the requested features.
    NotImplemented,

    /// `Refused` — The server was able to interpret the query, but refused to
    /// fulfil it.
    QueryRefused,

    /// An error code with no meaning to this server. Only the bottom four
    /// bits are ever used.
    Other(u8),
}


impl Message {

    /// Builds the response to the given query: the same transaction ID and
    /// questions, along with the answers that were found for them.
    pub fn response(query: &Self, answers: Vec<ResourceRecord>) -> Self {
        let mut flags = Flags::standard_response();
        flags.recursion_desired = query.flags.recursion_desired;

        Self {
            transaction_id: query.transaction_id,
            flags,
            questions: query.questions.clone(),
            answers,
        }
    }

    /// Builds a response that carries nothing but an error code.
    pub fn error_response(transaction_id: u16, error_code: ErrorCode) -> Self {
        let mut flags = Flags::standard_response();
        flags.error_code = Some(error_code);

        Self {
            transaction_id,
            flags,
            questions: Vec::new(),
            answers: Vec::new(),
        }
    }
}


impl ResourceRecord {

    /// Creates an Internet-class address record for the given name.
    pub fn address(name: impl Into<String>, address: std::net::Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.into(),
            qclass: QClass::IN,
            ttl,
            record: Record::A(crate::record::A { address }),
        }
    }
}
