#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

// Needed for Vec
extern crate alloc;

pub mod byteio;
pub mod decoder;
pub mod dictionary;
pub mod encoder;
pub mod error;
pub mod frame;

pub use decoder::decode;
pub use dictionary::{Dictionary, Entry, FormatCode};
pub use encoder::encode;
pub use error::BejError;
pub use frame::{FILE_MAGIC, FRAME_SIZE};
