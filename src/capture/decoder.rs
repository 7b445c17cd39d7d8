use std::net::IpAddr;

use etherparse::{NetHeaders, PacketHeaders, TransportHeader};
use thiserror::Error;

use crate::processor::dns::DNS_PORT;
use crate::processor::flow::{FlowKey, Protocol};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Everything the flow core needs from one captured frame.
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    pub timestamp_ms: u64,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub wire_len: u32,
    /// Transport payload, retained only for port-53 packets.
    pub payload: Vec<u8>,
}

impl ParsedPacket {
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.src_ip, self.dst_ip, self.src_port, self.dst_port, self.protocol)
    }
}

/// Extract IP endpoints, transport ports, and (for DNS) the payload from an
/// Ethernet frame.
///
/// `Err` means the frame was malformed; `Ok(None)` means it decoded cleanly
/// but is not something this tool flowifies (non-IP, non-TCP/UDP).
pub fn decode(timestamp_ms: u64, wire_len: u32, data: &[u8]) -> Result<Option<ParsedPacket>, DecodeError> {
    let parsed = PacketHeaders::from_ethernet_slice(data)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let (src_ip, dst_ip) = match &parsed.net {
        Some(NetHeaders::Ipv4(ipv4, _)) => (IpAddr::from(ipv4.source), IpAddr::from(ipv4.destination)),
        Some(NetHeaders::Ipv6(ipv6, _)) => (IpAddr::from(ipv6.source), IpAddr::from(ipv6.destination)),
        _ => return Ok(None),
    };

    let (src_port, dst_port, protocol) = match &parsed.transport {
        Some(TransportHeader::Tcp(tcp)) => (tcp.source_port, tcp.destination_port, Protocol::Tcp),
        Some(TransportHeader::Udp(udp)) => (udp.source_port, udp.destination_port, Protocol::Udp),
        _ => return Ok(None),
    };

    let payload = if src_port == DNS_PORT || dst_port == DNS_PORT {
        parsed.payload.slice().to_vec()
    } else {
        Vec::new()
    };

    Ok(Some(ParsedPacket {
        timestamp_ms,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        wire_len,
        payload,
    }))
}
