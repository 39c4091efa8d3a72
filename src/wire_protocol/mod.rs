pub mod command;
pub mod framing;
pub mod raw;

pub use command::{CommandMessage, CommandProtocol};
pub use framing::{Payload, WireProtocol};
pub use raw::Raw;
