pub mod log_codec;

pub use log_codec::{DecodeError, decode, decode_logs, encode, encode_logs, try_decode};
