use std::net::Ipv4Addr;

use dns::{Message, Question, ResourceRecord, Flags, QClass, ErrorCode};
use dns::record::{Record, RecordType};

use pretty_assertions::assert_eq;


fn query() -> Message {
    Message {
        transaction_id: 0xceac,
        flags: Flags::query(),
        questions: vec![
            Question {
                qname: "rfcs.io".into(),
                qtype: RecordType::A,
                qclass: QClass::IN,
            },
        ],
        answers: vec![],
    }
}


#[test]
fn build_response() {
    let answers = vec![
        ResourceRecord::address("rfcs.io", Ipv4Addr::new(10, 0, 0, 1), 0),
    ];

    let result = vec![
        0xce, 0xac,  // transaction ID
        0x81, 0x00,  // flags (response, recursion desired)
        0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,  // counts (1, 1, 0, 0)

        // question:
        0x04, 0x72, 0x66, 0x63, 0x73, 0x02, 0x69, 0x6f, 0x00,  // qname
        0x00, 0x01,  // type A
        0x00, 0x01,  // class IN

        // answer:
        0x04, 0x72, 0x66, 0x63, 0x73, 0x02, 0x69, 0x6f, 0x00,  // name
        0x00, 0x01,  // type A
        0x00, 0x01,  // class IN
        0x00, 0x00, 0x00, 0x00,  // TTL
        0x00, 0x04,  // record data length 4
        0x0a, 0x00, 0x00, 0x01,  // record data (10.0.0.1)
    ];

    assert_eq!(Message::response(&query(), answers).to_bytes().unwrap(), result);
}


#[test]
fn build_error_response() {
    let result = vec![
        0xce, 0xac,  // transaction ID
        0x80, 0x03,  // flags (response, name error)
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,  // counts (0, 0, 0, 0)
    ];

    let response = Message::error_response(0xceac, ErrorCode::NameError);
    assert_eq!(response.to_bytes().unwrap(), result);
}


#[test]
fn query_round_trip() {
    let query = query();
    let bytes = query.to_bytes().unwrap();
    assert_eq!(Message::from_bytes(&bytes), Ok(query));
}


#[test]
fn response_round_trip() {
    let mut query = query();
    query.questions.push(Question {
        qname: "lookup.dog".into(),
        qtype: RecordType::A,
        qclass: QClass::IN,
    });

    let answers = vec![
        ResourceRecord::address("rfcs.io",    Ipv4Addr::new(10, 0, 0, 1), 0),
        ResourceRecord::address("rfcs.io",    Ipv4Addr::new(10, 0, 0, 2), 0),
        ResourceRecord::address("lookup.dog", Ipv4Addr::new(192, 168, 1, 1), 3600),
        ResourceRecord {
            name: "lookup.dog".into(),
            qclass: QClass::CH,
            ttl: 60,
            record: Record::Other { type_number: 16, bytes: vec![ 0x03, b'd', b'o', b'g' ] },
        },
    ];

    let response = Message::response(&query, answers);
    let bytes = response.to_bytes().unwrap();
    assert_eq!(Message::from_response_bytes(&bytes), Ok(response));
}


#[test]
fn error_response_round_trip() {
    for code in &[ ErrorCode::FormatError, ErrorCode::ServerFailure, ErrorCode::NameError, ErrorCode::NotImplemented ] {
        let response = Message::error_response(0x0102, *code);
        let bytes = response.to_bytes().unwrap();
        assert_eq!(Message::from_response_bytes(&bytes), Ok(response));
    }
}
