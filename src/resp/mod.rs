pub mod parser;
pub mod types;
pub mod writer;

pub use parser::{parse, parse_slice, resp_frame_len};
pub use types::RespValue;
pub use writer::{encode_command, encode_value};
