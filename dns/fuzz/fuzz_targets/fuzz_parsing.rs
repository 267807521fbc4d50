#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate dns;
use dns::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(query) = Message::from_bytes(data) {
        let _ = query.to_bytes();
    }

    let _ = Message::from_response_bytes(data);
});
