pub mod capture;
pub mod output;
pub mod processor;
pub mod types;

pub use capture::{CaptureEvent, PacketSource, ParsedPacket};
pub use processor::{processing_loop, Flow, FlowKey, FlowManager, Protocol};
