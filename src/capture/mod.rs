mod decoder;
mod source;

pub use decoder::{decode, DecodeError, ParsedPacket};
pub use source::{list_interfaces, CaptureEvent, NetworkInterface, PacketSource};
