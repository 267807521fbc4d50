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
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::wildcard_imports)]

#![deny(unsafe_code)]


//! The DNS crate is the ‘library’ part of hostsd. It implements the DNS
//! protocol: decoding the queries that clients send, and building the
//! responses that get sent back.


mod types;
pub use self::types::*;

mod strings;
pub use self::strings::{MAX_NAME_LENGTH, MAX_LABEL_LENGTH};

mod wire;
pub use self::wire::{Wire, DecodeError, SerializationError, HEADER_LENGTH, peek_transaction_id};

pub mod record;
